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
use crate::middleware::{ApiResponse, ApiResult};
use crate::services::audit::RequestContext;
use crate::services::verification::VerificationService;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct VerifyPayload {
    pub token: String,
    pub request_id: Uuid,
}

/// POST /api/dsr/verify - consume the emailed verification link.
pub async fn verify(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<VerifyPayload>,
) -> ApiResult<Value> {
    let ctx = RequestContext::from_headers(&headers);

    let repo = DsrRepository::new().await?;
    let service = VerificationService::new(
        Arc::new(repo),
        state.verification_tokens.clone(),
        config::config().security.idempotent_reverify,
    );

    let request = service
        .verify(&payload.token, payload.request_id, &ctx)
        .await?;

    Ok(ApiResponse::success(json!({ "request": request })))
}
