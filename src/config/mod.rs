use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::env;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub environment: Environment,
    pub database: DatabaseConfig,
    pub api: ApiConfig,
    pub security: SecurityConfig,
    pub dsr: DsrConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Environment {
    Development,
    Staging,
    Production,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub max_connections: u32,
    pub connection_timeout: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    pub enable_rate_limiting: bool,
    /// Default tier: requests per window per IP+user-agent key.
    pub rate_limit_requests: u32,
    pub rate_limit_window_secs: u64,
    /// Strict tier applied to intake/verify: requests per window per IP+path key.
    pub strict_rate_limit_requests: u32,
    pub strict_rate_limit_window_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    /// Signs verification tokens (JWT) and, unless overridden, CSRF tokens.
    pub app_secret: String,
    /// Separate CSRF signing key; falls back to `app_secret` when empty.
    pub csrf_secret: String,
    pub csrf_cookie_secure: bool,
    pub csrf_cookie_max_age_secs: u64,
    pub verification_token_ttl_hours: u64,
    /// Re-verifying an already verified request: no-op success when true,
    /// TOKEN_CONSUMED conflict when false.
    pub idempotent_reverify: bool,
    /// Bearer token required on /internal routes; empty disables the check.
    pub internal_api_token: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DsrConfig {
    pub max_upload_bytes: usize,
    pub allowed_upload_mime: Vec<String>,
    pub export_link_ttl_days: i64,
    /// Rough per-record byte constant for the discovery size estimate.
    pub export_record_size_estimate: u64,
}

impl SecurityConfig {
    /// Key used for CSRF token signing.
    pub fn csrf_key(&self) -> &str {
        if self.csrf_secret.is_empty() {
            &self.app_secret
        } else {
            &self.csrf_secret
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        let environment = match env::var("APP_ENV").as_deref() {
            Ok("production") | Ok("prod") => Environment::Production,
            Ok("staging") | Ok("stage") => Environment::Staging,
            _ => Environment::Development,
        };

        // Environment presets first, specific env vars override.
        match environment {
            Environment::Production => Self::production(),
            Environment::Staging => Self::staging(),
            Environment::Development => Self::development(),
        }
        .with_env_overrides()
    }

    fn with_env_overrides(mut self) -> Self {
        // Database overrides
        if let Ok(v) = env::var("DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections = v.parse().unwrap_or(self.database.max_connections);
        }
        if let Ok(v) = env::var("DATABASE_CONNECTION_TIMEOUT") {
            self.database.connection_timeout = v.parse().unwrap_or(self.database.connection_timeout);
        }

        // API overrides
        if let Ok(v) = env::var("API_ENABLE_RATE_LIMITING") {
            self.api.enable_rate_limiting = v.parse().unwrap_or(self.api.enable_rate_limiting);
        }
        if let Ok(v) = env::var("API_RATE_LIMIT_REQUESTS") {
            self.api.rate_limit_requests = v.parse().unwrap_or(self.api.rate_limit_requests);
        }
        if let Ok(v) = env::var("API_RATE_LIMIT_WINDOW_SECS") {
            self.api.rate_limit_window_secs = v.parse().unwrap_or(self.api.rate_limit_window_secs);
        }
        if let Ok(v) = env::var("API_STRICT_RATE_LIMIT_REQUESTS") {
            self.api.strict_rate_limit_requests =
                v.parse().unwrap_or(self.api.strict_rate_limit_requests);
        }
        if let Ok(v) = env::var("API_STRICT_RATE_LIMIT_WINDOW_SECS") {
            self.api.strict_rate_limit_window_secs =
                v.parse().unwrap_or(self.api.strict_rate_limit_window_secs);
        }

        // Security overrides
        if let Ok(v) = env::var("APP_SECRET") {
            self.security.app_secret = v;
        }
        if let Ok(v) = env::var("CSRF_SECRET_KEY") {
            self.security.csrf_secret = v;
        }
        if let Ok(v) = env::var("SECURITY_VERIFICATION_TOKEN_TTL_HOURS") {
            self.security.verification_token_ttl_hours = v
                .parse()
                .unwrap_or(self.security.verification_token_ttl_hours);
        }
        if let Ok(v) = env::var("SECURITY_IDEMPOTENT_REVERIFY") {
            self.security.idempotent_reverify =
                v.parse().unwrap_or(self.security.idempotent_reverify);
        }
        if let Ok(v) = env::var("INTERNAL_API_TOKEN") {
            self.security.internal_api_token = v;
        }

        // DSR overrides
        if let Ok(v) = env::var("DSR_MAX_UPLOAD_BYTES") {
            self.dsr.max_upload_bytes = v.parse().unwrap_or(self.dsr.max_upload_bytes);
        }
        if let Ok(v) = env::var("DSR_EXPORT_LINK_TTL_DAYS") {
            self.dsr.export_link_ttl_days = v.parse().unwrap_or(self.dsr.export_link_ttl_days);
        }

        self
    }

    fn base_dsr() -> DsrConfig {
        DsrConfig {
            max_upload_bytes: 5 * 1024 * 1024, // 5MB
            allowed_upload_mime: vec![
                "application/pdf".to_string(),
                "image/jpeg".to_string(),
                "image/png".to_string(),
            ],
            export_link_ttl_days: 7,
            export_record_size_estimate: 512,
        }
    }

    fn development() -> Self {
        Self {
            environment: Environment::Development,
            database: DatabaseConfig {
                max_connections: 10,
                connection_timeout: 30,
            },
            api: ApiConfig {
                enable_rate_limiting: false,
                rate_limit_requests: 1000,
                rate_limit_window_secs: 60,
                strict_rate_limit_requests: 100,
                strict_rate_limit_window_secs: 60,
            },
            security: SecurityConfig {
                app_secret: "dev-secret-do-not-use-in-production".to_string(),
                csrf_secret: String::new(),
                csrf_cookie_secure: false,
                csrf_cookie_max_age_secs: 24 * 60 * 60,
                verification_token_ttl_hours: 24,
                idempotent_reverify: true,
                internal_api_token: String::new(),
            },
            dsr: Self::base_dsr(),
        }
    }

    fn staging() -> Self {
        Self {
            environment: Environment::Staging,
            database: DatabaseConfig {
                max_connections: 20,
                connection_timeout: 10,
            },
            api: ApiConfig {
                enable_rate_limiting: true,
                rate_limit_requests: 100,
                rate_limit_window_secs: 60,
                strict_rate_limit_requests: 10,
                strict_rate_limit_window_secs: 60,
            },
            security: SecurityConfig {
                app_secret: String::new(),
                csrf_secret: String::new(),
                csrf_cookie_secure: true,
                csrf_cookie_max_age_secs: 24 * 60 * 60,
                verification_token_ttl_hours: 24,
                idempotent_reverify: true,
                internal_api_token: String::new(),
            },
            dsr: Self::base_dsr(),
        }
    }

    fn production() -> Self {
        Self {
            environment: Environment::Production,
            database: DatabaseConfig {
                max_connections: 50,
                connection_timeout: 5,
            },
            api: ApiConfig {
                enable_rate_limiting: true,
                rate_limit_requests: 60,
                rate_limit_window_secs: 60,
                strict_rate_limit_requests: 5,
                strict_rate_limit_window_secs: 60,
            },
            security: SecurityConfig {
                app_secret: String::new(),
                csrf_secret: String::new(),
                csrf_cookie_secure: true,
                csrf_cookie_max_age_secs: 24 * 60 * 60,
                verification_token_ttl_hours: 24,
                idempotent_reverify: true,
                internal_api_token: String::new(),
            },
            dsr: Self::base_dsr(),
        }
    }
}

// Global singleton config - initialized once at startup
pub static CONFIG: Lazy<AppConfig> = Lazy::new(AppConfig::from_env);

// Convenience function for accessing config
pub fn config() -> &'static AppConfig {
    &CONFIG
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn development_defaults() {
        let config = AppConfig::development();
        assert!(!config.api.enable_rate_limiting);
        assert!(!config.security.csrf_cookie_secure);
        assert_eq!(config.security.verification_token_ttl_hours, 24);
        assert_eq!(config.dsr.export_link_ttl_days, 7);
    }

    #[test]
    fn production_defaults() {
        let config = AppConfig::production();
        assert!(config.api.enable_rate_limiting);
        assert!(config.security.csrf_cookie_secure);
        assert_eq!(config.api.strict_rate_limit_requests, 5);
    }

    #[test]
    fn csrf_key_falls_back_to_app_secret() {
        let mut config = AppConfig::development();
        assert_eq!(config.security.csrf_key(), config.security.app_secret);
        config.security.csrf_secret = "separate".to_string();
        assert_eq!(config.security.csrf_key(), "separate");
    }
}
