use std::sync::Arc;
use uuid::Uuid;

use crate::database::models::{AuditAction, DsrRequest, DsrStatus};
use crate::database::repository::RequestStore;
use crate::error::ApiError;
use crate::security::VerificationTokenService;
use crate::services::audit::{status_change, RequestContext};

/// Consumes the emailed verification link and moves the request from
/// pending to in_progress.
pub struct VerificationService {
    store: Arc<dyn RequestStore>,
    tokens: VerificationTokenService,
    /// Re-verifying an already verified request: no-op success when true.
    idempotent: bool,
}

impl VerificationService {
    pub fn new(
        store: Arc<dyn RequestStore>,
        tokens: VerificationTokenService,
        idempotent: bool,
    ) -> Self {
        Self {
            store,
            tokens,
            idempotent,
        }
    }

    pub async fn verify(
        &self,
        token: &str,
        request_id: Uuid,
        ctx: &RequestContext,
    ) -> Result<DsrRequest, ApiError> {
        let request = self
            .store
            .find_request(request_id)
            .await?
            .ok_or_else(|| ApiError::not_found(format!("DSR request {request_id} not found")))?;

        let claims = self.tokens.verify(token, request_id)?;
        if !claims.email.eq_ignore_ascii_case(&request.email) {
            return Err(ApiError::bad_request(
                "Verification token does not match this request",
            ));
        }

        match request.status {
            DsrStatus::Pending => {
                let updated = self
                    .store
                    .transition(request_id, DsrStatus::InProgress)
                    .await?;

                let (old, new) =
                    status_change(&updated, DsrStatus::Pending, DsrStatus::InProgress);
                self.store
                    .append_audit(
                        request_id,
                        AuditAction::RequestVerified,
                        Some(old),
                        Some(new),
                        ctx.ip(),
                        ctx.ua(),
                    )
                    .await?;

                Ok(updated)
            }
            DsrStatus::InProgress | DsrStatus::Completed => {
                if self.idempotent {
                    Ok(request)
                } else {
                    Err(ApiError::conflict("Verification link already used"))
                }
            }
            DsrStatus::Rejected | DsrStatus::Cancelled => Err(ApiError::conflict(format!(
                "Request is {} and can no longer be verified",
                request.status
            ))),
        }
    }
}
