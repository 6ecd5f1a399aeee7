use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, errors::ErrorKind, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

const PURPOSE: &str = "dsr-verify";

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("verification token expired")]
    Expired,

    #[error("token is not bound to this request")]
    Mismatch,

    #[error("invalid token: {0}")]
    Invalid(String),

    #[error("signing secret not configured")]
    NotConfigured,
}

/// Claims of the emailed verification link. Bound to one request and valid
/// for a fixed window (24h by default).
#[derive(Debug, Serialize, Deserialize)]
pub struct VerificationClaims {
    pub request_id: Uuid,
    pub email: String,
    pub purpose: String,
    pub iat: i64,
    pub exp: i64,
}

#[derive(Clone)]
pub struct VerificationTokenService {
    secret: String,
    ttl_hours: u64,
}

impl VerificationTokenService {
    pub fn new(secret: impl Into<String>, ttl_hours: u64) -> Self {
        Self {
            secret: secret.into(),
            ttl_hours,
        }
    }

    /// Issue a signed token bound to `request_id`.
    pub fn issue(&self, request_id: Uuid, email: &str) -> Result<String, TokenError> {
        if self.secret.is_empty() {
            return Err(TokenError::NotConfigured);
        }

        let now = Utc::now();
        let claims = VerificationClaims {
            request_id,
            email: email.to_string(),
            purpose: PURPOSE.to_string(),
            iat: now.timestamp(),
            exp: (now + Duration::hours(self.ttl_hours as i64)).timestamp(),
        };

        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.secret.as_bytes()),
        )
        .map_err(|e| TokenError::Invalid(e.to_string()))
    }

    /// Decode and validate a token, checking it is bound to `request_id`.
    /// Expiry surfaces as the distinguished `Expired` outcome.
    pub fn verify(&self, token: &str, request_id: Uuid) -> Result<VerificationClaims, TokenError> {
        if self.secret.is_empty() {
            return Err(TokenError::NotConfigured);
        }

        let validation = Validation::default();
        let data = decode::<VerificationClaims>(
            token,
            &DecodingKey::from_secret(self.secret.as_bytes()),
            &validation,
        )
        .map_err(|e| match e.kind() {
            ErrorKind::ExpiredSignature => TokenError::Expired,
            _ => TokenError::Invalid(e.to_string()),
        })?;

        let claims = data.claims;
        if claims.purpose != PURPOSE {
            return Err(TokenError::Invalid("wrong token purpose".to_string()));
        }
        if claims.request_id != request_id {
            return Err(TokenError::Mismatch);
        }

        Ok(claims)
    }
}
