use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use uuid::Uuid;

/// Audit actions recorded against a DSR request. One row per state
/// transition or significant sub-step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    RequestCreated,
    RequestVerified,
    DiscoveryCompleted,
    TableDeleted,
    ProcessingCompleted,
    ProcessingFailed,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::RequestCreated => "request_created",
            AuditAction::RequestVerified => "request_verified",
            AuditAction::DiscoveryCompleted => "discovery_completed",
            AuditAction::TableDeleted => "table_deleted",
            AuditAction::ProcessingCompleted => "processing_completed",
            AuditAction::ProcessingFailed => "processing_failed",
        }
    }
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Append-only audit record. Never mutated or deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DsrAuditLog {
    pub id: Uuid,
    pub request_id: Uuid,
    pub action: String,
    pub old_values: Option<Value>,
    pub new_values: Option<Value>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub created_at: DateTime<Utc>,
}
