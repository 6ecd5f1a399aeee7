//! Double-submit CSRF guard: the `csrf-token` cookie must match the
//! `x-csrf-token` header on mutating requests, and both must carry a valid
//! signature.

use axum::{
    extract::{Request, State},
    http::{HeaderMap, Method},
    middleware::Next,
    response::Response,
};

use crate::error::ApiError;
use crate::state::AppState;

pub const CSRF_COOKIE: &str = "csrf-token";
pub const CSRF_HEADER: &str = "x-csrf-token";

/// Paths that never require a CSRF token: health checks, token issuance,
/// the emailed verification landing, and service-to-service routes (which
/// authenticate with a bearer token instead).
const EXEMPT_PATHS: &[&str] = &["/", "/health", "/api/csrf", "/api/dsr/verify"];
const EXEMPT_PREFIXES: &[&str] = &["/internal/"];

fn is_exempt(path: &str) -> bool {
    EXEMPT_PATHS.contains(&path)
        || EXEMPT_PREFIXES.iter().any(|prefix| path.starts_with(prefix))
}

fn is_mutating(method: &Method) -> bool {
    matches!(
        *method,
        Method::POST | Method::PUT | Method::PATCH | Method::DELETE
    )
}

/// Pull a cookie value out of the Cookie header(s).
pub fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all("cookie")
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(k, _)| *k == name)
        .map(|(_, v)| v.to_string())
}

pub async fn csrf_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    if !is_mutating(request.method()) || is_exempt(request.uri().path()) {
        return Ok(next.run(request).await);
    }

    let headers = request.headers();
    let cookie = cookie_value(headers, CSRF_COOKIE).ok_or(ApiError::CsrfMissing)?;
    let header = headers
        .get(CSRF_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .ok_or(ApiError::CsrfMissing)?;

    if !state.csrf.verify(&cookie) || !state.csrf.verify(&header) {
        return Err(ApiError::CsrfInvalid);
    }
    if cookie != header {
        return Err(ApiError::CsrfMismatch);
    }

    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exemptions() {
        assert!(is_exempt("/"));
        assert!(is_exempt("/health"));
        assert!(is_exempt("/api/csrf"));
        assert!(is_exempt("/api/dsr/verify"));
        assert!(is_exempt("/internal/dsr/process"));
        assert!(!is_exempt("/api/dsr/request"));
        assert!(!is_exempt("/api/dsr/track"));
    }

    #[test]
    fn mutating_methods() {
        assert!(is_mutating(&Method::POST));
        assert!(is_mutating(&Method::DELETE));
        assert!(!is_mutating(&Method::GET));
        assert!(!is_mutating(&Method::HEAD));
    }

    #[test]
    fn cookie_parsing() {
        let mut headers = HeaderMap::new();
        headers.insert("cookie", "a=1; csrf-token=abc.def; b=2".parse().unwrap());
        assert_eq!(cookie_value(&headers, "csrf-token").unwrap(), "abc.def");
        assert_eq!(cookie_value(&headers, "missing"), None);
    }
}
