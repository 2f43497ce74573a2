// Bearer authentication middleware (§4.5 item 8). Verifies the access
// token, reloads the user, and rejects on tokenVersion mismatch, account
// lock, or (in production) a hard fingerprint mismatch.

use axum::{
    body::Body,
    extract::{connect_info::ConnectInfo, FromRequestParts, Request, State},
    http::{header, request::Parts, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use std::net::SocketAddr;
use diesel::prelude::*;
use diesel_async::RunQueryDsl;
use serde::Serialize;
use serde_json::json;
use tracing::warn;
use uuid::Uuid;

use crate::app::AppState;
use crate::services::{enhanced_fingerprint, legacy_fingerprint, RequestSignals};

/// Authenticated user extracted from a verified access token, attached to
/// the request extensions for handlers to pull out.
#[derive(Debug, Clone, Serialize)]
pub struct AuthenticatedUser {
    pub user_id: Uuid,
    pub email: String,
    pub role: String,
    pub token_version: i32,
}

#[derive(Serialize)]
struct ErrorBody {
    success: bool,
    error: &'static str,
    message: String,
}

fn unauthorized(message: impl Into<String>) -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(ErrorBody {
            success: false,
            error: "unauthorized",
            message: message.into(),
        }),
    )
        .into_response()
}

pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let token = match request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
    {
        Some(t) => t.to_string(),
        None => return unauthorized("missing bearer token"),
    };

    let signals = RequestSignals::from_headers(
        request.headers(),
        request
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ci| ci.0.ip().to_string()),
    );
    let current_fingerprint = enhanced_fingerprint(&signals);

    let claims = match state.jwt_service.verify_access(&token, None) {
        Ok(c) => c,
        Err(_) => return unauthorized("invalid or expired token"),
    };

    let user_id = match Uuid::parse_str(&claims.sub) {
        Ok(id) => id,
        Err(_) => return unauthorized("invalid token subject"),
    };

    let mut conn = match state.diesel_pool.get().await {
        Ok(c) => c,
        Err(_) => {
            return (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({"success": false, "error": "unavailable"})),
            )
                .into_response();
        },
    };

    let user: crate::models::user::User = {
        use crate::schema::users::dsl;
        match dsl::users.filter(dsl::id.eq(user_id)).first(&mut conn).await {
            Ok(u) => u,
            Err(_) => return unauthorized("user not found"),
        }
    };

    if user.token_version != claims.token_version {
        return unauthorized("token has been superseded");
    }

    if let Some(locked_until) = user.account_locked_until {
        if locked_until > chrono::Utc::now() {
            return unauthorized("account is locked");
        }
    }

    if claims.fingerprint != current_fingerprint {
        let legacy = legacy_fingerprint(
            signals.user_agent.as_deref().unwrap_or("none"),
            signals.ip.as_deref().unwrap_or("none"),
        );
        if claims.fingerprint == legacy {
            warn!(user_id = %user_id, "access token verified via legacy fingerprint grace path");
        } else if state.config.is_production() {
            return unauthorized("fingerprint mismatch");
        } else {
            warn!(user_id = %user_id, "fingerprint mismatch tolerated outside production");
        }
    }

    request.extensions_mut().insert(AuthenticatedUser {
        user_id,
        email: user.email,
        role: user.role,
        token_version: user.token_version,
    });

    next.run(request).await
}

impl FromRequestParts<AppState> for AuthenticatedUser {
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, _state: &AppState) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthenticatedUser>()
            .cloned()
            .ok_or_else(|| unauthorized("authentication required"))
    }
}
