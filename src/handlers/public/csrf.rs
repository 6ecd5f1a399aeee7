use axum::{
    extract::State,
    response::{IntoResponse, Response},
};
use serde_json::json;

use crate::config;
use crate::middleware::csrf::CSRF_COOKIE;
use crate::middleware::ApiResponse;
use crate::state::AppState;

/// GET /api/csrf - issue a signed anti-forgery token.
///
/// The token is set as an HttpOnly cookie and returned in the body; the
/// client echoes it in `x-csrf-token` on mutating requests.
pub async fn issue(State(state): State<AppState>) -> Response {
    let token = state.csrf.generate();
    let security = &config::config().security;

    let mut cookie = format!(
        "{}={}; Path=/; HttpOnly; SameSite=Strict; Max-Age={}",
        CSRF_COOKIE, token, security.csrf_cookie_max_age_secs
    );
    if security.csrf_cookie_secure {
        cookie.push_str("; Secure");
    }

    let mut response = ApiResponse::success(json!({ "csrf_token": token })).into_response();
    match cookie.parse() {
        Ok(value) => {
            response.headers_mut().insert("set-cookie", value);
        }
        Err(e) => {
            tracing::error!("failed to build csrf cookie header: {}", e);
        }
    }
    response
}
