use std::sync::Arc;

use crate::config;
use crate::middleware::rate_limit::{InMemoryRateLimitStore, RateLimitStore};
use crate::security::{CsrfService, VerificationTokenService};
use crate::services::mailer::Mailer;

/// Shared handler state. Injected rather than held in module singletons so
/// the stores can be swapped (e.g. an external rate-limit store for
/// multi-node deployments).
#[derive(Clone)]
pub struct AppState {
    pub csrf: CsrfService,
    pub verification_tokens: VerificationTokenService,
    pub rate_limiter: Arc<dyn RateLimitStore>,
    pub mailer: Arc<Mailer>,
}

impl AppState {
    pub fn from_config() -> Self {
        let cfg = config::config();
        Self {
            csrf: CsrfService::new(cfg.security.csrf_key()),
            verification_tokens: VerificationTokenService::new(
                cfg.security.app_secret.clone(),
                cfg.security.verification_token_ttl_hours,
            ),
            rate_limiter: Arc::new(InMemoryRateLimitStore::new()),
            mailer: Arc::new(Mailer::new()),
        }
    }

    pub fn with_rate_limiter(mut self, store: Arc<dyn RateLimitStore>) -> Self {
        self.rate_limiter = store;
        self
    }
}
