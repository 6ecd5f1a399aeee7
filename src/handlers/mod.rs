pub mod internal;
pub mod public;

use axum::{
    extract::DefaultBodyLimit,
    middleware as axum_middleware,
    routing::{get, post},
    Router,
};
use serde_json::{json, Value};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::middleware::{csrf_middleware, rate_limit_middleware};
use crate::state::AppState;

/// Assemble the full application router with global middleware.
pub fn router(state: AppState) -> Router {
    Router::new()
        // Public
        .route("/", get(root))
        .route("/health", get(health))
        .route("/api/csrf", get(public::csrf::issue))
        // DSR pipeline
        .route("/api/dsr/request", post(public::dsr::request::submit))
        .route("/api/dsr/verify", post(public::dsr::verify::verify))
        .route("/api/dsr/track", post(public::dsr::track::track))
        // Service-to-service processing endpoint
        .route("/internal/dsr/process", post(internal::process::process))
        // Request-phase middleware (rate limit runs before the CSRF check)
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            csrf_middleware,
        ))
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            rate_limit_middleware,
        ))
        // Intake uploads are capped at 5MB by validation; leave headroom
        // for the multipart framing.
        .layer(DefaultBodyLimit::max(10 * 1024 * 1024))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn root() -> axum::response::Json<Value> {
    let version = env!("CARGO_PKG_VERSION");

    axum::response::Json(json!({
        "success": true,
        "data": {
            "name": "DSR API",
            "version": version,
            "description": "Data subject rights request pipeline",
            "endpoints": {
                "home": "/ (public)",
                "health": "/health (public)",
                "csrf": "/api/csrf (public - token issuance)",
                "request": "POST /api/dsr/request (multipart intake)",
                "verify": "POST /api/dsr/verify (email link confirmation)",
                "track": "POST /api/dsr/track (status lookup)",
                "process": "POST /internal/dsr/process (service-to-service)",
            }
        }
    }))
}

async fn health() -> impl axum::response::IntoResponse {
    let now = chrono::Utc::now();

    match crate::database::manager::DatabaseManager::health_check().await {
        Ok(_) => (
            axum::http::StatusCode::OK,
            axum::response::Json(json!({
                "success": true,
                "data": {
                    "status": "ok",
                    "timestamp": now,
                    "database": "ok"
                }
            })),
        ),
        Err(e) => (
            axum::http::StatusCode::SERVICE_UNAVAILABLE,
            axum::response::Json(json!({
                "success": false,
                "error": "database unavailable",
                "data": {
                    "status": "degraded",
                    "timestamp": now,
                    "database_error": e.to_string()
                }
            })),
        ),
    }
}
