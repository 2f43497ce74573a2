// Single top-level error type for the handler layer. Every subsystem keeps
// its own `thiserror::Error` enum close to its own logic; this type is the
// seam where those enums collapse onto the closed HTTP-kind taxonomy the
// API actually exposes, and the envelope every handler response shares.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::Serialize;
use serde_json::Value;
use tracing::error;

use crate::{
    models::{audit_log::AuditError, order::OrderError, user::UserError},
    services::{
        anomaly::AnomalyError, audit::AuditServiceError, encryption::EncryptionError,
        failed_login::FailedLoginError, jwt::JwtError, payment::PaymentError,
        rate_limit::RateLimitError, session_store::SessionStoreError, two_factor::TwoFactorError,
    },
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    Auth,
    Permission,
    RateLimit,
    Conflict,
    FraudGate,
    Provider,
    Internal,
}

impl ErrorKind {
    fn status(self) -> StatusCode {
        match self {
            ErrorKind::Validation => StatusCode::BAD_REQUEST,
            ErrorKind::Auth => StatusCode::UNAUTHORIZED,
            ErrorKind::Permission => StatusCode::FORBIDDEN,
            ErrorKind::RateLimit => StatusCode::TOO_MANY_REQUESTS,
            ErrorKind::Conflict => StatusCode::CONFLICT,
            ErrorKind::FraudGate => StatusCode::FORBIDDEN,
            ErrorKind::Provider => StatusCode::BAD_GATEWAY,
            ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// The error every handler returns. `message` is always safe to show a
/// client; anything that isn't gets collapsed to a generic message and
/// logged with the real cause instead.
#[derive(Debug)]
pub struct ApiError {
    pub kind: ErrorKind,
    pub message: String,
    pub details: Option<Value>,
    pub retry_after: Option<u64>,
}

impl ApiError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            details: None,
            retry_after: None,
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, message)
    }

    pub fn auth(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Auth, message)
    }

    pub fn permission(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Permission, message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Conflict, message)
    }

    pub fn fraud_gate(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::FraudGate, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, message)
    }

    pub fn with_retry_after(mut self, seconds: u64) -> Self {
        self.retry_after = Some(seconds);
        self
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }
}

#[derive(Serialize)]
struct ErrorEnvelope {
    status: &'static str,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<Value>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut response = (
            self.kind.status(),
            Json(ErrorEnvelope {
                status: "error",
                message: self.message,
                details: self.details,
            }),
        )
            .into_response();

        if let (ErrorKind::RateLimit, Some(seconds)) = (self.kind, self.retry_after) {
            response
                .headers_mut()
                .insert("Retry-After", seconds.into());
        }

        response
    }
}

impl From<diesel::result::Error> for ApiError {
    fn from(err: diesel::result::Error) -> Self {
        error!(error = %err, "diesel error");
        ApiError::internal("an internal error occurred")
    }
}

impl From<JwtError> for ApiError {
    fn from(err: JwtError) -> Self {
        match err {
            JwtError::TokenExpired | JwtError::InvalidToken => {
                ApiError::auth("invalid or expired token")
            },
            other => {
                error!(error = %other, "jwt error");
                ApiError::internal("an internal error occurred")
            },
        }
    }
}

impl From<SessionStoreError> for ApiError {
    fn from(err: SessionStoreError) -> Self {
        match err {
            SessionStoreError::ReuseDetected => {
                ApiError::auth("session invalid, please log in again")
            },
            SessionStoreError::RefreshInProgress => {
                ApiError::conflict("a refresh is already in progress for this session")
            },
            SessionStoreError::Session(inner) => inner.into(),
        }
    }
}

impl From<crate::models::refresh_session::SessionError> for ApiError {
    fn from(err: crate::models::refresh_session::SessionError) -> Self {
        use crate::models::refresh_session::SessionError;
        match err {
            SessionError::NotFound | SessionError::Expired | SessionError::Revoked => {
                ApiError::auth("session invalid or expired")
            },
            SessionError::ReuseDetected => ApiError::auth("session invalid, please log in again"),
            SessionError::RefreshInProgress => {
                ApiError::conflict("a refresh is already in progress for this session")
            },
            SessionError::Database(e) => e.into(),
        }
    }
}

impl From<RateLimitError> for ApiError {
    fn from(err: RateLimitError) -> Self {
        error!(error = %err, "rate limit backend error");
        ApiError::internal("an internal error occurred")
    }
}

impl From<FailedLoginError> for ApiError {
    fn from(err: FailedLoginError) -> Self {
        error!(error = %err, "failed-login tracker backend error");
        ApiError::internal("an internal error occurred")
    }
}

impl From<AuditServiceError> for ApiError {
    fn from(err: AuditServiceError) -> Self {
        match err {
            AuditServiceError::InvalidKey => {
                error!("audit HMAC key invalid");
                ApiError::internal("an internal error occurred")
            },
            AuditServiceError::Audit(inner) => inner.into(),
        }
    }
}

impl From<AuditError> for ApiError {
    fn from(err: AuditError) -> Self {
        error!(error = %err, "audit log error");
        ApiError::internal("an internal error occurred")
    }
}

impl From<AnomalyError> for ApiError {
    fn from(err: AnomalyError) -> Self {
        error!(error = %err, "anomaly scoring error");
        ApiError::internal("an internal error occurred")
    }
}

impl From<PaymentError> for ApiError {
    fn from(err: PaymentError) -> Self {
        match err {
            PaymentError::ProductUnavailable(_) | PaymentError::NonPositiveTotal => {
                ApiError::validation(err.to_string())
            },
            PaymentError::FraudGated => ApiError::fraud_gate("this order could not be processed"),
            PaymentError::InvalidSignature => ApiError::auth("invalid webhook signature"),
            PaymentError::Provider(msg) => {
                error!(error = %msg, "payment provider error");
                ApiError::new(ErrorKind::Provider, "payment provider unavailable")
            },
        }
    }
}

impl From<TwoFactorError> for ApiError {
    fn from(err: TwoFactorError) -> Self {
        match err {
            TwoFactorError::InvalidCode => ApiError::auth("invalid two-factor code"),
            TwoFactorError::Encryption(inner) => inner.into(),
            other @ (TwoFactorError::TotpConfig(_) | TwoFactorError::Bcrypt(_)) => {
                error!(error = %other, "two-factor service error");
                ApiError::internal("an internal error occurred")
            },
        }
    }
}

impl From<EncryptionError> for ApiError {
    fn from(err: EncryptionError) -> Self {
        error!(error = %err, "field encryption error");
        ApiError::internal("an internal error occurred")
    }
}

impl From<UserError> for ApiError {
    fn from(err: UserError) -> Self {
        match err {
            UserError::NotFound => ApiError::auth("invalid credentials"),
            UserError::AlreadyExists => ApiError::conflict("an account with this email may already exist"),
            UserError::Database(e) => e.into(),
            UserError::Pool(msg) => {
                error!(error = %msg, "database pool error");
                ApiError::internal("an internal error occurred")
            },
        }
    }
}

impl From<OrderError> for ApiError {
    fn from(err: OrderError) -> Self {
        match err {
            OrderError::NonPositiveTotal => ApiError::validation(err.to_string()),
            OrderError::NotFound => ApiError::validation("order not found"),
            OrderError::Database(e) => e.into(),
        }
    }
}

impl From<validator::ValidationErrors> for ApiError {
    fn from(err: validator::ValidationErrors) -> Self {
        ApiError::validation("validation failed").with_details(serde_json::json!(err.to_string()))
    }
}
