// HTTP API Error Types
use axum::{http::StatusCode, response::IntoResponse, Json};
use serde_json::{json, Value};
use std::collections::HashMap;

/// HTTP API error with appropriate status codes and client-friendly messages
#[derive(Debug)]
pub enum ApiError {
    // 400 Bad Request
    BadRequest(String),
    ValidationError {
        message: String,
        field_errors: Option<HashMap<String, String>>,
    },
    /// Verification token past its 24h validity - distinguished so the
    /// client can direct the user to resubmit instead of retrying.
    TokenExpired(String),

    // 401 Unauthorized
    Unauthorized(String),

    // 403 Forbidden (CSRF failures carry a machine-readable code)
    Forbidden(String),
    CsrfMissing,
    CsrfInvalid,
    CsrfMismatch,

    // 404 Not Found
    NotFound(String),

    // 409 Conflict
    Conflict(String),

    // 429 Too Many Requests
    TooManyRequests {
        message: String,
        retry_after_secs: u64,
    },

    // 500 Internal Server Error
    InternalServerError(String),

    // 503 Service Unavailable
    ServiceUnavailable(String),
}

impl ApiError {
    /// Get HTTP status code
    pub fn status_code(&self) -> u16 {
        match self {
            ApiError::BadRequest(_) => 400,
            ApiError::ValidationError { .. } => 400,
            ApiError::TokenExpired(_) => 400,
            ApiError::Unauthorized(_) => 401,
            ApiError::Forbidden(_) => 403,
            ApiError::CsrfMissing => 403,
            ApiError::CsrfInvalid => 403,
            ApiError::CsrfMismatch => 403,
            ApiError::NotFound(_) => 404,
            ApiError::Conflict(_) => 409,
            ApiError::TooManyRequests { .. } => 429,
            ApiError::InternalServerError(_) => 500,
            ApiError::ServiceUnavailable(_) => 503,
        }
    }

    /// Get client-safe error message
    pub fn message(&self) -> &str {
        match self {
            ApiError::BadRequest(msg) => msg,
            ApiError::ValidationError { message, .. } => message,
            ApiError::TokenExpired(msg) => msg,
            ApiError::Unauthorized(msg) => msg,
            ApiError::Forbidden(msg) => msg,
            ApiError::CsrfMissing => "CSRF token missing",
            ApiError::CsrfInvalid => "CSRF token invalid",
            ApiError::CsrfMismatch => "CSRF token mismatch",
            ApiError::NotFound(msg) => msg,
            ApiError::Conflict(msg) => msg,
            ApiError::TooManyRequests { message, .. } => message,
            ApiError::InternalServerError(msg) => msg,
            ApiError::ServiceUnavailable(msg) => msg,
        }
    }

    /// Get error code for client handling
    pub fn error_code(&self) -> &'static str {
        match self {
            ApiError::BadRequest(_) => "BAD_REQUEST",
            ApiError::ValidationError { .. } => "VALIDATION_ERROR",
            ApiError::TokenExpired(_) => "TOKEN_EXPIRED",
            ApiError::Unauthorized(_) => "UNAUTHORIZED",
            ApiError::Forbidden(_) => "FORBIDDEN",
            ApiError::CsrfMissing => "CSRF_MISSING",
            ApiError::CsrfInvalid => "CSRF_INVALID",
            ApiError::CsrfMismatch => "CSRF_MISMATCH",
            ApiError::NotFound(_) => "NOT_FOUND",
            ApiError::Conflict(_) => "CONFLICT",
            ApiError::TooManyRequests { .. } => "TOO_MANY_REQUESTS",
            ApiError::InternalServerError(_) => "INTERNAL_SERVER_ERROR",
            ApiError::ServiceUnavailable(_) => "SERVICE_UNAVAILABLE",
        }
    }

    /// Convert to JSON response body. 5xx responses carry a correlation id
    /// (logged server-side) instead of internal details.
    pub fn to_json(&self) -> Value {
        match self {
            ApiError::ValidationError {
                message,
                field_errors,
            } => {
                let mut response = json!({
                    "error": true,
                    "message": message,
                    "code": "VALIDATION_ERROR"
                });

                if let Some(field_errors) = field_errors {
                    response["field_errors"] = json!(field_errors);
                }

                response
            }
            ApiError::TooManyRequests {
                message,
                retry_after_secs,
            } => {
                json!({
                    "error": true,
                    "message": message,
                    "code": "TOO_MANY_REQUESTS",
                    "retry_after_secs": retry_after_secs
                })
            }
            _ if self.status_code() >= 500 => {
                let correlation_id = uuid::Uuid::new_v4();
                tracing::error!(
                    request_id = %correlation_id,
                    code = self.error_code(),
                    "internal error: {}",
                    self.message()
                );
                json!({
                    "error": true,
                    "message": "An error occurred while processing your request",
                    "code": self.error_code(),
                    "request_id": correlation_id
                })
            }
            _ => {
                json!({
                    "error": true,
                    "message": self.message(),
                    "code": self.error_code()
                })
            }
        }
    }
}

// Static constructor methods
impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        ApiError::BadRequest(message.into())
    }

    pub fn validation_error(
        message: impl Into<String>,
        field_errors: Option<HashMap<String, String>>,
    ) -> Self {
        ApiError::ValidationError {
            message: message.into(),
            field_errors,
        }
    }

    pub fn token_expired(message: impl Into<String>) -> Self {
        ApiError::TokenExpired(message.into())
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        ApiError::Unauthorized(message.into())
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        ApiError::Forbidden(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        ApiError::NotFound(message.into())
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        ApiError::Conflict(message.into())
    }

    pub fn too_many_requests(message: impl Into<String>, retry_after_secs: u64) -> Self {
        ApiError::TooManyRequests {
            message: message.into(),
            retry_after_secs,
        }
    }

    pub fn internal_server_error(message: impl Into<String>) -> Self {
        ApiError::InternalServerError(message.into())
    }

    pub fn service_unavailable(message: impl Into<String>) -> Self {
        ApiError::ServiceUnavailable(message.into())
    }
}

// Convert module error types to ApiError
impl From<crate::validation::ValidationError> for ApiError {
    fn from(err: crate::validation::ValidationError) -> Self {
        use crate::validation::ValidationError as VE;
        match err {
            VE::Field { field, message } => {
                let mut field_errors = HashMap::new();
                field_errors.insert(field, message.clone());
                ApiError::validation_error(message, Some(field_errors))
            }
            VE::Fields(field_errors) => {
                ApiError::validation_error("Validation failed", Some(field_errors))
            }
            VE::Invalid(message) => ApiError::validation_error(message, None),
        }
    }
}

impl From<crate::database::manager::DatabaseError> for ApiError {
    fn from(err: crate::database::manager::DatabaseError) -> Self {
        match err {
            crate::database::manager::DatabaseError::ConfigMissing(what) => {
                tracing::error!("missing configuration: {}", what);
                ApiError::service_unavailable("Service misconfigured")
            }
            crate::database::manager::DatabaseError::InvalidDatabaseUrl => {
                tracing::error!("invalid DATABASE_URL");
                ApiError::service_unavailable("Service misconfigured")
            }
            crate::database::manager::DatabaseError::Sqlx(sqlx_err) => {
                // Log the real error but return generic message
                tracing::error!("sqlx error: {}", sqlx_err);
                ApiError::internal_server_error("Database error occurred")
            }
        }
    }
}

impl From<crate::database::repository::RepositoryError> for ApiError {
    fn from(err: crate::database::repository::RepositoryError) -> Self {
        match err {
            crate::database::repository::RepositoryError::NotFound(msg) => {
                ApiError::not_found(msg)
            }
            crate::database::repository::RepositoryError::InvalidTransition { from, to } => {
                ApiError::conflict(format!("Cannot transition request from {from} to {to}"))
            }
            crate::database::repository::RepositoryError::Database(e) => {
                tracing::error!("repository database error: {}", e);
                ApiError::internal_server_error("An error occurred while processing your request")
            }
            crate::database::repository::RepositoryError::Manager(e) => e.into(),
        }
    }
}

impl From<crate::security::token::TokenError> for ApiError {
    fn from(err: crate::security::token::TokenError) -> Self {
        match err {
            crate::security::token::TokenError::Expired => ApiError::token_expired(
                "Verification link has expired; please submit a new request",
            ),
            crate::security::token::TokenError::Mismatch => {
                ApiError::bad_request("Verification token does not match this request")
            }
            crate::security::token::TokenError::Invalid(msg) => {
                ApiError::bad_request(format!("Invalid verification token: {msg}"))
            }
            crate::security::token::TokenError::NotConfigured => {
                tracing::error!("APP_SECRET not configured");
                ApiError::service_unavailable("Service misconfigured")
            }
        }
    }
}

impl From<crate::services::processing::ProcessingError> for ApiError {
    fn from(err: crate::services::processing::ProcessingError) -> Self {
        match err {
            crate::services::processing::ProcessingError::RequestNotFound(id) => {
                ApiError::not_found(format!("DSR request {id} not found"))
            }
            crate::services::processing::ProcessingError::NotVerified(id) => {
                ApiError::conflict(format!("DSR request {id} has not been verified yet"))
            }
            crate::services::processing::ProcessingError::Store(e) => {
                tracing::error!("subject store error: {}", e);
                ApiError::internal_server_error("Data discovery failed")
            }
            crate::services::processing::ProcessingError::Repository(e) => e.into(),
        }
    }
}

// Standard error trait implementations
impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message())
    }
}

impl std::error::Error for ApiError {}

// Automatic HTTP response conversion for Axum
impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status =
            StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = self.to_json();

        // 429 responses carry the standard retry hint header as well.
        if let ApiError::TooManyRequests {
            retry_after_secs, ..
        } = &self
        {
            let mut response = (status, Json(body)).into_response();
            if let Ok(value) = retry_after_secs.to_string().parse() {
                response.headers_mut().insert("retry-after", value);
            }
            return response;
        }

        (status, Json(body)).into_response()
    }
}
