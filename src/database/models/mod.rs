pub mod audit_log;
pub mod dsr_request;

pub use audit_log::{AuditAction, DsrAuditLog};
pub use dsr_request::{DsrPriority, DsrRequest, DsrRequestType, DsrStatus, NewDsrRequest};
