// Prototype-pollution guard (§4.5 item 5). Recursively scans the JSON body
// and query string for deny-listed keys; blocks (400) or sanitizes (strips
// the offending key and continues) per configuration.

use axum::{
    body::{to_bytes, Body},
    extract::Request,
    http::{header, StatusCode},
    middleware::Next,
    response::{IntoResponse, Json, Response},
};
use serde_json::{json, Value};
use tracing::warn;

const DENY_KEYS: &[&str] = &["__proto__", "constructor", "prototype"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollutionGuardMode {
    Block,
    Sanitize,
}

fn is_denied_key(key: &str) -> bool {
    DENY_KEYS.contains(&key) || key.starts_with("__")
}

/// Returns `true` if a denied key was found anywhere in the value.
fn scan_and_sanitize(value: &mut Value, mode: PollutionGuardMode) -> bool {
    let mut found = false;
    match value {
        Value::Object(map) => {
            let denied_keys: Vec<String> = map.keys().filter(|k| is_denied_key(k)).cloned().collect();
            if !denied_keys.is_empty() {
                found = true;
                if mode == PollutionGuardMode::Sanitize {
                    for key in &denied_keys {
                        map.remove(key);
                    }
                }
            }
            for (_, v) in map.iter_mut() {
                if scan_and_sanitize(v, mode) {
                    found = true;
                }
            }
        },
        Value::Array(items) => {
            for item in items.iter_mut() {
                if scan_and_sanitize(item, mode) {
                    found = true;
                }
            }
        },
        _ => {},
    }
    found
}

fn scan_query(query: &str) -> bool {
    query
        .split('&')
        .filter_map(|pair| pair.split('=').next())
        .any(is_denied_key)
}

pub async fn proto_pollution_guard(request: Request<Body>, next: Next) -> Response {
    let mode = if crate::app_config::config().is_production() {
        PollutionGuardMode::Block
    } else {
        PollutionGuardMode::Sanitize
    };

    if let Some(query) = request.uri().query() {
        if scan_query(query) {
            warn!(query = %query, "prototype-pollution key found in query string");
            if mode == PollutionGuardMode::Block {
                return reject();
            }
        }
    }

    let is_json = request
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.starts_with("application/json"))
        .unwrap_or(false);

    if !is_json {
        return next.run(request).await;
    }

    let (parts, body) = request.into_parts();
    let bytes = match to_bytes(body, 1024 * 1024).await {
        Ok(b) => b,
        Err(_) => return reject(),
    };

    if bytes.is_empty() {
        return next.run(Request::from_parts(parts, Body::empty())).await;
    }

    let mut value: Value = match serde_json::from_slice(&bytes) {
        Ok(v) => v,
        Err(_) => return next.run(Request::from_parts(parts, Body::from(bytes))).await,
    };

    let polluted = scan_and_sanitize(&mut value, mode);
    if polluted {
        warn!("prototype-pollution key found in request body");
        if mode == PollutionGuardMode::Block {
            return reject();
        }
    }

    let rebuilt = serde_json::to_vec(&value).unwrap_or_else(|_| bytes.to_vec());
    next.run(Request::from_parts(parts, Body::from(rebuilt))).await
}

fn reject() -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({"success": false, "error": "invalid_body", "message": "disallowed key in request"})),
    )
        .into_response()
}
