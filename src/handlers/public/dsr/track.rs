use axum::{extract::State, response::Json};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::database::repository::DsrRepository;
use crate::middleware::{ApiResponse, ApiResult};
use crate::services::tracking::TrackingService;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct TrackPayload {
    pub request_id: Uuid,
    pub email: String,
}

/// POST /api/dsr/track - status lookup for the requester.
pub async fn track(
    State(_state): State<AppState>,
    Json(payload): Json<TrackPayload>,
) -> ApiResult<Value> {
    let repo = DsrRepository::new().await?;
    let service = TrackingService::new(repo);

    let (request, timeline) = service.track(payload.request_id, &payload.email).await?;

    Ok(ApiResponse::success(json!({
        "request": request,
        "timeline": timeline,
    })))
}
