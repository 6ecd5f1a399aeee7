use tracing::info;
use uuid::Uuid;

use crate::database::models::DsrRequest;

/// Outbound email stub. The platform's mail delivery lives elsewhere; this
/// service only logs what would be sent.
pub struct Mailer {
    base_url: String,
}

impl Mailer {
    pub fn new() -> Self {
        Self {
            base_url: std::env::var("PUBLIC_BASE_URL")
                .unwrap_or_else(|_| "http://localhost:3000".to_string()),
        }
    }

    /// Verification email carrying the signed link back to the request.
    pub async fn send_verification(&self, email: &str, request_id: Uuid, token: &str) {
        let link = format!(
            "{}/dsr/verify?request_id={}&token={}",
            self.base_url, request_id, token
        );
        info!(
            recipient = email,
            request_id = %request_id,
            "verification email queued: {}",
            link
        );
    }

    /// Completion notice once processing finished.
    pub async fn send_completion(&self, request: &DsrRequest) {
        info!(
            recipient = request.email.as_str(),
            request_id = %request.id,
            request_type = request.request_type.as_str(),
            status = request.status.as_str(),
            "completion email queued"
        );
    }
}

impl Default for Mailer {
    fn default() -> Self {
        Self::new()
    }
}
