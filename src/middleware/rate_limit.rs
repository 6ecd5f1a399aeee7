//! Fixed-window request limiter. Counters live in process memory only;
//! state is lost on restart and not shared across instances. Bursts exactly
//! at window boundaries are permitted.

use async_trait::async_trait;
use axum::{
    extract::{Request, State},
    http::HeaderMap,
    middleware::Next,
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Duration, Utc};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::Mutex;

use crate::config;
use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Clone)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,
    pub reset_at: DateTime<Utc>,
    pub total_hits: u32,
}

/// Injected counter store so single-node deployments use process memory and
/// multi-node setups can plug in an external store.
#[async_trait]
pub trait RateLimitStore: Send + Sync {
    async fn check_at(
        &self,
        key: &str,
        limit: u32,
        window: Duration,
        now: DateTime<Utc>,
    ) -> RateLimitDecision;

    async fn check(&self, key: &str, limit: u32, window: Duration) -> RateLimitDecision {
        self.check_at(key, limit, window, Utc::now()).await
    }
}

struct WindowEntry {
    count: u32,
    reset_at: DateTime<Utc>,
}

/// Fixed-window counters in a shared map, with an opportunistic sweep of
/// expired entries every `SWEEP_INTERVAL` checks.
#[derive(Default)]
pub struct InMemoryRateLimitStore {
    entries: Mutex<HashMap<String, WindowEntry>>,
    checks: AtomicU64,
}

const SWEEP_INTERVAL: u64 = 256;

impl InMemoryRateLimitStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RateLimitStore for InMemoryRateLimitStore {
    async fn check_at(
        &self,
        key: &str,
        limit: u32,
        window: Duration,
        now: DateTime<Utc>,
    ) -> RateLimitDecision {
        let mut entries = self.entries.lock().await;

        if self.checks.fetch_add(1, Ordering::Relaxed) % SWEEP_INTERVAL == SWEEP_INTERVAL - 1 {
            entries.retain(|_, e| e.reset_at > now);
        }

        let entry = entries.entry(key.to_string()).or_insert(WindowEntry {
            count: 0,
            reset_at: now + window,
        });

        // A hit past the window boundary opens a fresh window at 1.
        if now >= entry.reset_at {
            entry.count = 0;
            entry.reset_at = now + window;
        }
        entry.count += 1;

        RateLimitDecision {
            allowed: entry.count <= limit,
            limit,
            remaining: limit.saturating_sub(entry.count),
            reset_at: entry.reset_at,
            total_hits: entry.count,
        }
    }
}

/// Default-tier key: client IP plus a hash of the user-agent string.
pub fn default_key(ip: &str, user_agent: &str) -> String {
    let digest = Sha256::digest(user_agent.as_bytes());
    format!("{}:{}", ip, &hex::encode(digest)[..16])
}

/// Strict-tier key for intake/verify endpoints: IP plus path.
pub fn strict_key(ip: &str, path: &str) -> String {
    format!("{ip}:{path}")
}

/// Best-effort client IP: proxy headers first, "unknown" otherwise.
pub fn client_ip(headers: &HeaderMap) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|v| v.trim().to_string())
        .or_else(|| {
            headers
                .get("x-real-ip")
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        })
        .unwrap_or_else(|| "unknown".to_string())
}

const STRICT_PATHS: &[&str] = &["/api/dsr/request", "/api/dsr/verify"];

pub async fn rate_limit_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let api = &config::config().api;
    if !api.enable_rate_limiting {
        return next.run(request).await;
    }

    let path = request.uri().path().to_string();
    let ip = client_ip(request.headers());

    let (key, limit, window_secs) = if STRICT_PATHS.contains(&path.as_str()) {
        (
            strict_key(&ip, &path),
            api.strict_rate_limit_requests,
            api.strict_rate_limit_window_secs,
        )
    } else {
        let user_agent = request
            .headers()
            .get("user-agent")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");
        (
            default_key(&ip, user_agent),
            api.rate_limit_requests,
            api.rate_limit_window_secs,
        )
    };

    let decision = state
        .rate_limiter
        .check(&key, limit, Duration::seconds(window_secs as i64))
        .await;

    let mut response = if decision.allowed {
        next.run(request).await
    } else {
        let retry_after = (decision.reset_at - Utc::now()).num_seconds().max(0) as u64;
        ApiError::too_many_requests("Rate limit exceeded; retry later", retry_after)
            .into_response()
    };

    apply_headers(response.headers_mut(), &decision);
    response
}

fn apply_headers(headers: &mut HeaderMap, decision: &RateLimitDecision) {
    let reset_secs = (decision.reset_at - Utc::now()).num_seconds().max(0);
    let pairs = [
        ("ratelimit-limit", decision.limit.to_string()),
        ("ratelimit-remaining", decision.remaining.to_string()),
        ("ratelimit-reset", reset_secs.to_string()),
    ];
    for (name, value) in pairs {
        if let Ok(value) = value.parse() {
            headers.insert(name, value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn allows_up_to_limit_then_rejects() {
        let store = InMemoryRateLimitStore::new();
        let now = Utc::now();
        let window = Duration::seconds(60);

        for i in 1..=5 {
            let d = store.check_at("k", 5, window, now).await;
            assert!(d.allowed, "hit {i} should be allowed");
            assert_eq!(d.total_hits, i);
            assert_eq!(d.remaining, 5 - i);
        }

        let d = store.check_at("k", 5, window, now).await;
        assert!(!d.allowed, "6th hit in the window must be rejected");
        assert_eq!(d.total_hits, 6);
        assert_eq!(d.remaining, 0);
    }

    #[tokio::test]
    async fn window_elapse_resets_counter_to_one() {
        let store = InMemoryRateLimitStore::new();
        let now = Utc::now();
        let window = Duration::seconds(60);

        for _ in 0..7 {
            store.check_at("k", 5, window, now).await;
        }

        let later = now + Duration::seconds(61);
        let d = store.check_at("k", 5, window, later).await;
        assert!(d.allowed);
        assert_eq!(d.total_hits, 1);
        assert_eq!(d.reset_at, later + window);
    }

    #[tokio::test]
    async fn keys_are_independent() {
        let store = InMemoryRateLimitStore::new();
        let now = Utc::now();
        let window = Duration::seconds(60);

        for _ in 0..5 {
            store.check_at("a", 5, window, now).await;
        }
        assert!(!store.check_at("a", 5, window, now).await.allowed);
        assert!(store.check_at("b", 5, window, now).await.allowed);
    }

    #[test]
    fn key_derivation() {
        let k1 = default_key("1.2.3.4", "agent-a");
        let k2 = default_key("1.2.3.4", "agent-b");
        assert_ne!(k1, k2);
        assert!(k1.starts_with("1.2.3.4:"));

        assert_eq!(strict_key("1.2.3.4", "/api/dsr/request"), "1.2.3.4:/api/dsr/request");
    }

    #[test]
    fn client_ip_prefers_forwarded_header() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", "10.0.0.1, 10.0.0.2".parse().unwrap());
        assert_eq!(client_ip(&headers), "10.0.0.1");

        let empty = HeaderMap::new();
        assert_eq!(client_ip(&empty), "unknown");
    }
}
