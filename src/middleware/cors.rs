// CORS gate (§4.5 item 1). Origins come from configuration; a request with
// no `Origin` header is allowed only outside production. An origin not on
// the allow list is rejected outright - never reflected back.

use axum::{
    body::Body,
    http::{
        header::{self, HeaderValue},
        Method, Request, Response, StatusCode,
    },
    middleware::Next,
};
use tracing::warn;

pub async fn dynamic_cors_middleware(
    req: Request<Body>,
    next: Next,
) -> Result<Response<Body>, StatusCode> {
    let config = crate::app_config::config();

    let origin = req
        .headers()
        .get(header::ORIGIN)
        .and_then(|v| v.to_str().ok())
        .map(String::from);

    let allowed_origin = match &origin {
        None if !config.is_production() => None,
        None => None,
        Some(req_origin) => {
            if config.security.cors_allowed_origins.iter().any(|o| o == req_origin) {
                Some(req_origin.clone())
            } else {
                warn!(origin = %req_origin, "rejected CORS origin not on allow list");
                None
            }
        },
    };

    if origin.is_some() && allowed_origin.is_none() {
        return Err(StatusCode::FORBIDDEN);
    }

    if req.method() == Method::OPTIONS {
        let mut response = Response::new(Body::empty());
        apply_cors_headers(&mut response, allowed_origin.as_deref());
        *response.status_mut() = StatusCode::OK;
        return Ok(response);
    }

    let mut response = next.run(req).await;
    apply_cors_headers(&mut response, allowed_origin.as_deref());
    Ok(response)
}

fn apply_cors_headers(response: &mut Response<Body>, allowed_origin: Option<&str>) {
    let Some(allowed) = allowed_origin else { return };
    let Ok(value) = HeaderValue::from_str(allowed) else { return };

    response.headers_mut().insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, value);
    response
        .headers_mut()
        .insert(header::ACCESS_CONTROL_ALLOW_CREDENTIALS, HeaderValue::from_static("true"));
    response.headers_mut().insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("GET, POST, PUT, DELETE, OPTIONS"),
    );
    response.headers_mut().insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static("content-type, authorization, accept, origin, x-requested-with"),
    );
    response
        .headers_mut()
        .insert(header::ACCESS_CONTROL_MAX_AGE, HeaderValue::from_static("3600"));
}
