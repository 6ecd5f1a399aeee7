//! Strict-tier limiter behavior through the real router. Rate limiting is
//! off in the development preset, so each test turns it on via env before
//! the config singleton is first read.

use anyhow::Result;
use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tower::ServiceExt;

use dsr_api::handlers::router;
use dsr_api::middleware::rate_limit::{RateLimitDecision, RateLimitStore};
use dsr_api::state::AppState;

fn enable_strict_limiting() {
    std::env::set_var("API_ENABLE_RATE_LIMITING", "true");
    std::env::set_var("API_STRICT_RATE_LIMIT_REQUESTS", "2");
    std::env::set_var("API_STRICT_RATE_LIMIT_WINDOW_SECS", "60");
}

fn verify_request(ip: &str) -> Result<Request<Body>> {
    Ok(Request::post("/api/dsr/verify")
        .header("content-type", "application/json")
        .header("x-forwarded-for", ip)
        .body(Body::from(
            r#"{"token":"x","request_id":"6fa459ea-ee8a-4ca4-894e-db77e160355e"}"#,
        ))?)
}

#[tokio::test]
async fn strict_tier_rejects_past_the_limit() -> Result<()> {
    enable_strict_limiting();
    let app = router(AppState::from_config());

    for _ in 0..2 {
        let response = app.clone().oneshot(verify_request("9.9.9.9")?).await?;
        assert_ne!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    }

    let response = app.oneshot(verify_request("9.9.9.9")?).await?;
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);

    // Standard draft headers plus retry-after on the rejection.
    assert!(response.headers().contains_key("retry-after"));
    assert_eq!(
        response.headers().get("ratelimit-limit").unwrap(),
        &"2".parse::<axum::http::HeaderValue>()?
    );
    assert_eq!(
        response.headers().get("ratelimit-remaining").unwrap(),
        &"0".parse::<axum::http::HeaderValue>()?
    );

    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await?;
    let body: serde_json::Value = serde_json::from_slice(&bytes)?;
    assert_eq!(body["code"], "TOO_MANY_REQUESTS");
    assert!(body["retry_after_secs"].is_u64());
    Ok(())
}

#[tokio::test]
async fn limiter_keys_are_per_client_ip() -> Result<()> {
    enable_strict_limiting();
    let app = router(AppState::from_config());

    for _ in 0..3 {
        let _ = app.clone().oneshot(verify_request("7.7.7.7")?).await?;
    }
    // A different client is unaffected by the exhausted window.
    let response = app.oneshot(verify_request("8.8.8.8")?).await?;
    assert_ne!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    Ok(())
}

/// Store that rejects every check, standing in for an external backend.
struct DenyAll;

#[async_trait]
impl RateLimitStore for DenyAll {
    async fn check_at(
        &self,
        _key: &str,
        limit: u32,
        window: Duration,
        now: DateTime<Utc>,
    ) -> RateLimitDecision {
        RateLimitDecision {
            allowed: false,
            limit,
            remaining: 0,
            reset_at: now + window,
            total_hits: limit + 1,
        }
    }
}

#[tokio::test]
async fn middleware_uses_the_injected_store() -> Result<()> {
    enable_strict_limiting();
    let state = AppState::from_config().with_rate_limiter(Arc::new(DenyAll));
    let app = router(state);

    // First request, yet already rejected: the decision comes from the
    // swapped-in store, not the default in-memory one.
    let response = app.oneshot(verify_request("4.4.4.4")?).await?;
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    Ok(())
}

#[tokio::test]
async fn allowed_responses_carry_limit_headers() -> Result<()> {
    enable_strict_limiting();
    let app = router(AppState::from_config());

    let response = app.oneshot(verify_request("6.6.6.6")?).await?;
    assert_ne!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(
        response.headers().get("ratelimit-limit").unwrap(),
        &"2".parse::<axum::http::HeaderValue>()?
    );
    assert_eq!(
        response.headers().get("ratelimit-remaining").unwrap(),
        &"1".parse::<axum::http::HeaderValue>()?
    );
    assert!(response.headers().contains_key("ratelimit-reset"));
    Ok(())
}
