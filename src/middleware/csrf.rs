// CSRF/origin gate (§4.5 item 4). Safe methods, webhooks, and external-IdP
// callback paths are skipped entirely; everything else must present an
// `Origin` (falling back to `Referer`) that resolves to an allowed origin.
// In production, form-encoded bodies on API paths are rejected outright so
// a real mutation is forced through JSON (and thus a CORS preflight).

use axum::{
    body::Body,
    extract::Request,
    http::{header, Method, StatusCode},
    middleware::Next,
    response::{IntoResponse, Json, Response},
};
use serde_json::json;
use tracing::warn;
use url::Url;

const SKIPPED_PREFIXES: &[&str] = &["/api/v1/payments/webhook", "/api/v1/auth/oauth"];

fn is_safe_method(method: &Method) -> bool {
    matches!(method, &Method::GET | &Method::HEAD | &Method::OPTIONS)
}

fn origin_allowed(origin: &str) -> bool {
    let config = crate::app_config::config();
    config.security.cors_allowed_origins.iter().any(|o| o == origin)
}

pub async fn csrf_guard(request: Request<Body>, next: Next) -> Response {
    let path = request.uri().path().to_string();
    let method = request.method().clone();

    if is_safe_method(&method) || SKIPPED_PREFIXES.iter().any(|p| path.starts_with(p)) {
        return next.run(request).await;
    }

    let config = crate::app_config::config();

    if config.is_production() {
        if let Some(content_type) = request.headers().get(header::CONTENT_TYPE).and_then(|v| v.to_str().ok()) {
            if content_type.starts_with("application/x-www-form-urlencoded") {
                warn!(path = %path, "rejected form-encoded body on state-changing API path");
                return reject("unsupported content type");
            }
        }
    }

    let candidate = request
        .headers()
        .get(header::ORIGIN)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .or_else(|| {
            request
                .headers()
                .get(header::REFERER)
                .and_then(|v| v.to_str().ok())
                .and_then(|r| Url::parse(r).ok())
                .map(|u| u.origin().ascii_serialization())
        });

    match candidate {
        Some(origin) if origin_allowed(&origin) => next.run(request).await,
        Some(origin) => {
            warn!(origin = %origin, path = %path, "rejected state-changing request from disallowed origin");
            reject("origin not allowed")
        },
        None => {
            warn!(path = %path, "rejected state-changing request with no Origin/Referer");
            reject("missing origin")
        },
    }
}

fn reject(message: &str) -> Response {
    (
        StatusCode::FORBIDDEN,
        Json(json!({"success": false, "error": "csrf_rejected", "message": message})),
    )
        .into_response()
}
