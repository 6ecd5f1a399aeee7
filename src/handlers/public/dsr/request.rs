use axum::{
    extract::{Multipart, State},
    http::HeaderMap,
};
use serde_json::{json, Value};

use crate::config;
use crate::database::repository::DsrRepository;
use crate::error::ApiError;
use crate::middleware::{ApiResponse, ApiResult};
use crate::services::audit::RequestContext;
use crate::services::intake::{IntakeService, RawIntake, UploadedDocument};
use crate::state::AppState;

/// POST /api/dsr/request - multipart intake for a new DSR request.
pub async fn submit(
    State(state): State<AppState>,
    headers: HeaderMap,
    multipart: Multipart,
) -> ApiResult<Value> {
    let ctx = RequestContext::from_headers(&headers);
    let raw = parse_multipart(multipart).await?;

    let repo = DsrRepository::new().await?;
    let service = IntakeService::new(
        repo,
        state.verification_tokens.clone(),
        state.mailer.clone(),
    );

    let request = service
        .submit(&raw, &config::config().dsr, &ctx)
        .await?;

    Ok(ApiResponse::created(json!({
        "request_id": request.id,
        "status": request.status,
    })))
}

async fn parse_multipart(mut multipart: Multipart) -> Result<RawIntake, ApiError> {
    let mut raw = RawIntake::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(format!("malformed multipart body: {e}")))?
    {
        let Some(name) = field.name().map(str::to_string) else {
            continue;
        };

        if name == "verificationDocument" {
            let filename = field.file_name().unwrap_or("upload").to_string();
            let content_type = field.content_type().unwrap_or("").to_string();
            let data = field
                .bytes()
                .await
                .map_err(|e| ApiError::bad_request(format!("failed to read upload: {e}")))?;

            raw.document = Some(UploadedDocument {
                filename,
                content_type,
                size: data.len(),
            });
            continue;
        }

        let value = field
            .text()
            .await
            .map_err(|e| ApiError::bad_request(format!("failed to read field {name}: {e}")))?;

        match name.as_str() {
            "type" => raw.request_type = Some(value),
            "email" => raw.email = Some(value),
            "confirmEmail" => raw.confirm_email = Some(value),
            "fullName" => raw.full_name = Some(value),
            "description" => raw.description = Some(value),
            "dataTypes" => raw.data_types = Some(value),
            "urgency" => raw.urgency = Some(value),
            "agreeToTerms" => raw.agree_to_terms = Some(value),
            other => {
                tracing::debug!("ignoring unknown intake field: {}", other);
            }
        }
    }

    Ok(raw)
}
