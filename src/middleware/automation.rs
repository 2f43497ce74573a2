// Automation detector (§4.5 item 7). Log-only by default; blocks at high
// confidence on auth endpoints only, since false positives there are
// cheaper than letting credential-stuffing traffic straight through.

use axum::{
    body::Body,
    extract::Request,
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Json, Response},
};
use serde_json::json;
use tracing::warn;

use crate::services::{detect_automation, RequestSignals};

const AUTH_PATH_PREFIXES: &[&str] = &["/api/v1/auth/login", "/api/v1/auth/register"];
const BLOCK_CONFIDENCE_THRESHOLD: u32 = 90;

pub async fn automation_guard(request: Request<Body>, next: Next) -> Response {
    let path = request.uri().path().to_string();
    let signals = RequestSignals::from_headers(request.headers(), None);
    let result = detect_automation(&signals);

    if result.is_automated {
        warn!(path = %path, confidence = result.confidence, reasons = ?result.reasons, "automated traffic detected");
    }

    let is_auth_endpoint = AUTH_PATH_PREFIXES.iter().any(|p| path.starts_with(p));
    if is_auth_endpoint && result.is_automated && result.confidence >= BLOCK_CONFIDENCE_THRESHOLD {
        warn!(path = %path, confidence = result.confidence, "blocking high-confidence automated request on auth endpoint");
        return (
            StatusCode::FORBIDDEN,
            Json(json!({"success": false, "error": "automated_traffic", "message": "request blocked"})),
        )
            .into_response();
    }

    next.run(request).await
}
