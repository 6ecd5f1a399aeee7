use axum::http::HeaderMap;
use serde_json::{json, Value};

use crate::database::models::{DsrRequest, DsrStatus};

/// Caller attribution recorded on every audit row.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

impl RequestContext {
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let ip = crate::middleware::rate_limit::client_ip(headers);
        Self {
            ip_address: if ip == "unknown" { None } else { Some(ip) },
            user_agent: headers
                .get("user-agent")
                .and_then(|v| v.to_str().ok())
                .map(str::to_string),
        }
    }

    pub fn ip(&self) -> Option<&str> {
        self.ip_address.as_deref()
    }

    pub fn ua(&self) -> Option<&str> {
        self.user_agent.as_deref()
    }
}

/// Old/new value payloads for a status transition audit row.
pub fn status_change(request: &DsrRequest, from: DsrStatus, to: DsrStatus) -> (Value, Value) {
    (
        json!({ "id": request.id, "status": from }),
        json!({ "id": request.id, "status": to }),
    )
}
