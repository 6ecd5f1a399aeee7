use uuid::Uuid;

use crate::database::models::{DsrAuditLog, DsrRequest};
use crate::database::repository::DsrRepository;
use crate::error::ApiError;

/// Read-only status lookup for the requester. No state change.
pub struct TrackingService {
    repo: DsrRepository,
}

impl TrackingService {
    pub fn new(repo: DsrRepository) -> Self {
        Self { repo }
    }

    /// Returns the request and its timeline when the email matches; the
    /// same NOT_FOUND answer covers unknown ids and wrong emails.
    pub async fn track(
        &self,
        request_id: Uuid,
        email: &str,
    ) -> Result<(DsrRequest, Vec<DsrAuditLog>), ApiError> {
        let request = self
            .repo
            .find_by_id_and_email(request_id, email)
            .await?
            .ok_or_else(|| {
                ApiError::not_found("No request found for that id and email combination")
            })?;

        let timeline = self.repo.audit_trail(request_id).await?;
        Ok((request, timeline))
    }
}
