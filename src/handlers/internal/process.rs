use axum::{
    extract::State,
    http::HeaderMap,
    response::Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use uuid::Uuid;

use crate::config;
use crate::database::repository::DsrRepository;
use crate::error::ApiError;
use crate::middleware::{ApiResponse, ApiResult};
use crate::services::audit::RequestContext;
use crate::services::processing::{DsrEngine, PgSubjectStore, ProcessingService};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ProcessPayload {
    #[serde(alias = "requestId")]
    pub request_id: Uuid,
    /// Redundant fields forwarded by the caller. Only `email` is
    /// cross-checked against the stored request; the rest are accepted
    /// for wire compatibility and ignored.
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default, rename = "type")]
    pub request_type: Option<String>,
    #[serde(default)]
    pub priority: Option<String>,
}

/// POST /internal/dsr/process - run discovery and the type-specific action
/// for a verified request. Callers authenticate with a bearer token.
pub async fn process(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<ProcessPayload>,
) -> ApiResult<Value> {
    authorize(&headers)?;
    let ctx = RequestContext::from_headers(&headers);

    let repo = DsrRepository::new().await?;
    let cfg = config::config();
    let store = Arc::new(PgSubjectStore::new(repo.pool().clone()));
    let engine = DsrEngine::new(
        store,
        cfg.dsr.export_record_size_estimate,
        cfg.dsr.export_link_ttl_days,
    );
    let service = ProcessingService::new(repo, engine, state.mailer.clone());

    let outcome = service.process(payload.request_id, &ctx).await?;

    if let Some(email) = &payload.email {
        if !email.eq_ignore_ascii_case(&outcome.request.email) {
            tracing::warn!(
                request_id = %payload.request_id,
                "process payload email does not match the stored request"
            );
        }
    }

    Ok(ApiResponse::success(json!({
        "result": outcome.result,
        "discovery": outcome.discovery,
        "request": outcome.request,
    })))
}

fn authorize(headers: &HeaderMap) -> Result<(), ApiError> {
    let expected = &config::config().security.internal_api_token;
    if expected.is_empty() {
        return Ok(());
    }

    let token = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or_else(|| ApiError::unauthorized("Missing Authorization header"))?;

    if token.trim() != expected {
        return Err(ApiError::unauthorized("Invalid service token"));
    }
    Ok(())
}
