// Authentication handlers (§3, §4.1-§4.3): registration, email verification,
// password login with optional 2FA step-up, refresh rotation, logout,
// password reset/change, 2FA enrollment, and session management.
//
// Every handler takes `State<AppState>` plus whatever extractors it needs and
// returns `Result<impl IntoResponse, ApiError>` - the `?` operator collapses
// every subsystem error onto the shared envelope in `crate::error`.

use axum::{
    extract::{ConnectInfo, State},
    http::header,
    response::{IntoResponse, Json},
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::net::SocketAddr;
use time::Duration as CookieDuration;
use tracing::warn;
use uuid::Uuid;
use validator::Validate;

use crate::{
    app::AppState,
    app_config::AppConfig,
    error::ApiError,
    middleware::auth::AuthenticatedUser,
    models::{
        audit_log::{event_type, AuditResult},
        refresh_session::DeviceInfo,
        user::{NewUser, User, UserUpdate},
    },
    services::{
        detect_automation, enhanced_fingerprint, session_store::SessionStore, rate_limit::RateLimitTier,
        RequestSignals,
    },
    utils::{hash_password, trim_and_validate_field, verify_password},
};

const REFRESH_COOKIE_NAME: &str = "refreshToken";
const EMAIL_VERIFICATION_TTL_HOURS: i64 = 24;
const PASSWORD_RESET_TTL_MINUTES: i64 = 60;
const TWO_FACTOR_TEMP_TOKEN_TTL_MINUTES: i64 = 10;

// ============================================================================
// Request/response types
// ============================================================================

#[derive(Debug, Deserialize, Validate)]
pub struct RegisterRequest {
    #[validate(email(message = "invalid email format"))]
    #[validate(length(max = 320))]
    pub email: String,

    #[validate(custom(function = "validate_password_strength"))]
    pub password: String,

    #[validate(length(min = 1, max = 255))]
    pub full_name: String,
}

/// Minimum 12 characters with at least one uppercase, lowercase, digit, and
/// symbol. Mirrors the complexity bar `reset_password`/`change_password`
/// hold new passwords to.
fn validate_password_strength(password: &str) -> Result<(), validator::ValidationError> {
    if password.len() < 12 {
        return Err(validator::ValidationError::new("password_too_short"));
    }

    let has_upper = password.chars().any(|c| c.is_uppercase());
    let has_lower = password.chars().any(|c| c.is_lowercase());
    let has_digit = password.chars().any(|c| c.is_ascii_digit());
    let has_symbol = password.chars().any(|c| !c.is_alphanumeric());

    if !(has_upper && has_lower && has_digit && has_symbol) {
        return Err(validator::ValidationError::new("password_complexity"));
    }

    Ok(())
}

#[derive(Debug, Deserialize)]
pub struct VerifyEmailRequest {
    pub token: String,
}

#[derive(Debug, Deserialize)]
pub struct ResendVerificationRequest {
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub device_id: Option<String>,
    #[serde(default)]
    pub device_name: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Login2faRequest {
    pub temp_token: String,
    pub code: String,
}

#[derive(Debug, Deserialize)]
pub struct ForgotPasswordRequest {
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct ValidateResetTokenRequest {
    pub token: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ResetPasswordRequest {
    pub token: String,
    #[validate(custom(function = "validate_password_strength"))]
    pub new_password: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ChangePasswordRequest {
    pub current_password: String,
    #[validate(custom(function = "validate_password_strength"))]
    pub new_password: String,
}

#[derive(Debug, Deserialize)]
pub struct VerifyTwoFactorSetupRequest {
    pub code: String,
}

#[derive(Debug, Deserialize)]
pub struct DisableTwoFactorRequest {
    pub password: String,
    pub code: String,
}

#[derive(Debug, Deserialize)]
pub struct RevokeSessionRequest {
    pub session_id: Uuid,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct UserDto {
    id: Uuid,
    email: String,
    full_name: String,
    role: String,
    email_verified: bool,
    two_factor_enabled: bool,
    created_at: DateTime<Utc>,
}

impl From<&User> for UserDto {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            email: user.email.clone(),
            full_name: user.full_name.clone(),
            role: user.role.clone(),
            email_verified: user.email_verified,
            two_factor_enabled: user.two_factor_enabled,
            created_at: user.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SessionDto {
    id: Uuid,
    device_name: Option<String>,
    ip_address: Option<String>,
    location: Option<String>,
    created_at: DateTime<Utc>,
    last_used_at: Option<DateTime<Utc>>,
}

// ============================================================================
// Shared helpers
// ============================================================================

fn success(data: Value) -> Json<Value> {
    Json(json!({"status": "success", "data": data}))
}

fn success_message(message: impl Into<String>) -> Json<Value> {
    Json(json!({"status": "success", "message": message.into()}))
}

fn build_refresh_cookie(token: String, config: &AppConfig) -> Cookie<'static> {
    Cookie::build((REFRESH_COOKIE_NAME, token))
        .path("/")
        .http_only(true)
        .secure(config.is_production())
        .same_site(SameSite::Strict)
        .max_age(CookieDuration::seconds(config.jwt.refresh_expiry as i64))
        .build()
}

fn build_delete_refresh_cookie(config: &AppConfig) -> Cookie<'static> {
    Cookie::build((REFRESH_COOKIE_NAME, ""))
        .path("/")
        .http_only(true)
        .secure(config.is_production())
        .same_site(SameSite::Strict)
        .max_age(CookieDuration::seconds(-1))
        .build()
}

fn user_agent(headers: &axum::http::HeaderMap) -> Option<String> {
    headers.get(header::USER_AGENT).and_then(|v| v.to_str().ok()).map(str::to_string)
}

/// Mints a fresh access/refresh pair, stores the new session, and returns the
/// access token plus the cookie to attach to the response. Used by every path
/// that ends in "the caller is now logged in": login, 2FA verification,
/// refresh rotation, and the re-authentication step after a password change.
#[allow(clippy::too_many_arguments)]
async fn issue_session(
    conn: &mut diesel_async::AsyncPgConnection,
    state: &AppState,
    user: &User,
    signals: &RequestSignals,
    ip: &str,
    device: DeviceInfo,
) -> Result<(String, Cookie<'static>), ApiError> {
    let fingerprint = enhanced_fingerprint(signals);
    let family = Uuid::new_v4().to_string();

    let access_token = state.jwt_service.sign_access(
        &user.id.to_string(),
        &user.email,
        &user.role,
        user.token_version,
        &fingerprint,
        ip,
    )?;
    let refresh_token = state.jwt_service.sign_refresh(&user.id.to_string(), &family, user.token_version)?;

    let expires_at = Utc::now() + ChronoDuration::seconds(state.config.jwt.refresh_expiry as i64);
    SessionStore::create(conn, user.id, &refresh_token, family, expires_at, device).await?;

    let cookie = build_refresh_cookie(refresh_token, &state.config);
    Ok((access_token, cookie))
}

// ============================================================================
// Registration / email verification
// ============================================================================

pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    req.validate()?;

    let email = trim_and_validate_field(&req.email, true).map_err(ApiError::validation)?;
    let full_name = trim_and_validate_field(&req.full_name, true).map_err(ApiError::validation)?;

    let password_hash = hash_password(&req.password).map_err(|e| {
        warn!(error = %e, "password hashing failed during registration");
        ApiError::internal("an internal error occurred")
    })?;

    let verification_token = Uuid::new_v4().to_string();
    let new_user = NewUser {
        email: email.to_lowercase(),
        password_hash,
        role: "user".to_string(),
        provider: "local".to_string(),
        email_verified: false,
        email_verification_token: Some(verification_token.clone()),
        email_verification_expires_at: Some(Utc::now() + ChronoDuration::hours(EMAIL_VERIFICATION_TTL_HOURS)),
        full_name,
    };

    let mut conn = state.diesel_pool.get().await.map_err(|e| {
        warn!(error = %e, "database pool exhausted");
        ApiError::internal("an internal error occurred")
    })?;

    let user = User::create(&mut conn, new_user).await?;

    state
        .audit_writer
        .record(
            &mut conn,
            event_type::AUTH_REGISTER,
            Some(user.id),
            "register",
            "user",
            Some(user.id.to_string()),
            None,
            json!({}),
            AuditResult::Success,
            None,
            None,
        )
        .await?;

    let _ = state
        .email_service
        .send_verification_email(&user.email, &user.full_name, &verification_token)
        .await;

    Ok((
        axum::http::StatusCode::CREATED,
        success_message("account created, check your email to verify your address"),
    ))
}

pub async fn verify_email(
    State(state): State<AppState>,
    Json(req): Json<VerifyEmailRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let mut conn = state.diesel_pool.get().await.map_err(|_| ApiError::internal("an internal error occurred"))?;

    let user = User::find_by_verification_token(&mut conn, &req.token)
        .await
        .map_err(|_| ApiError::validation("invalid or expired verification token"))?;

    User::update(
        &mut conn,
        user.id,
        UserUpdate {
            email_verified: Some(true),
            email_verification_token: Some(None),
            email_verification_expires_at: Some(None),
            ..Default::default()
        },
    )
    .await?;

    state
        .audit_writer
        .record(
            &mut conn,
            event_type::AUTH_EMAIL_VERIFY,
            Some(user.id),
            "verify_email",
            "user",
            Some(user.id.to_string()),
            None,
            json!({}),
            AuditResult::Success,
            None,
            None,
        )
        .await?;

    Ok(success_message("email verified"))
}

/// Always returns the same success message whether or not `email` belongs to
/// an account, and whether or not it's already verified - resending is
/// self-service and must not leak account existence.
pub async fn resend_verification(
    State(state): State<AppState>,
    Json(req): Json<ResendVerificationRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let mut conn = state.diesel_pool.get().await.map_err(|_| ApiError::internal("an internal error occurred"))?;

    if let Ok(user) = User::find_by_email(&mut conn, &req.email).await {
        if !user.email_verified {
            let verification_token = Uuid::new_v4().to_string();
            User::update(
                &mut conn,
                user.id,
                UserUpdate {
                    email_verification_token: Some(Some(verification_token.clone())),
                    email_verification_expires_at: Some(Some(
                        Utc::now() + ChronoDuration::hours(EMAIL_VERIFICATION_TTL_HOURS),
                    )),
                    ..Default::default()
                },
            )
            .await?;

            let _ = state
                .email_service
                .send_verification_email(&user.email, &user.full_name, &verification_token)
                .await;
        }
    }

    Ok(success_message("if that email is registered, a verification link has been sent"))
}

// ============================================================================
// Login / 2FA step-up
// ============================================================================

pub async fn login(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: axum::http::HeaderMap,
    Json(req): Json<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let ip = addr.ip().to_string();
    let signals = RequestSignals::from_headers(&headers, Some(ip.clone()));
    let automation = detect_automation(&signals);

    let tier = if automation.is_automated { RateLimitTier::EnhancedAuthAutomated } else { RateLimitTier::EnhancedAuthNormal };
    let rate_result = state.rate_limit_service.check(&format!("login:{ip}"), tier).await?;
    if !rate_result.allowed {
        let mut err = ApiError::new(crate::error::ErrorKind::RateLimit, "too many login attempts, try again later");
        if let Some(retry_after) = rate_result.retry_after {
            err = err.with_retry_after(retry_after as u64);
        }
        return Err(err);
    }

    let failure_key = format!("login:{}", req.email.to_lowercase());
    if let Some(remaining) = state.failed_login_tracker.check_blocked(&failure_key).await? {
        return Err(ApiError::new(crate::error::ErrorKind::RateLimit, "account temporarily locked due to repeated failed logins")
            .with_retry_after(remaining as u64));
    }

    let mut conn = state.diesel_pool.get().await.map_err(|_| ApiError::internal("an internal error occurred"))?;

    let user = match User::find_by_email(&mut conn, &req.email).await {
        Ok(u) => u,
        Err(_) => {
            record_failed_login(&state, &mut conn, &failure_key, None, &ip, "user not found").await?;
            return Err(ApiError::auth("invalid email or password"));
        },
    };

    if !user.is_active {
        record_failed_login(&state, &mut conn, &failure_key, Some(&user), &ip, "account inactive").await?;
        return Err(ApiError::auth("invalid email or password"));
    }

    if user.is_locked() {
        return Err(ApiError::auth("account is temporarily locked"));
    }

    if !verify_password(&req.password, &user.password_hash).unwrap_or(false) {
        let record = record_failed_login(&state, &mut conn, &failure_key, Some(&user), &ip, "bad password").await?;
        let delay_ms = crate::services::FailedLoginTracker::progressive_delay_ms(record.count);
        tokio::time::sleep(std::time::Duration::from_millis(delay_ms)).await;
        return Err(ApiError::auth("invalid email or password"));
    }

    state.failed_login_tracker.record_success(&failure_key).await?;

    if !user.email_verified {
        return Err(ApiError::permission("email verification is required")
            .with_details(json!({"requiresEmailVerification": true, "email": user.email})));
    }

    if user.two_factor_enabled {
        let temp_token = Uuid::new_v4().to_string();
        User::update(
            &mut conn,
            user.id,
            UserUpdate {
                two_factor_temp_token: Some(Some(temp_token.clone())),
                two_factor_temp_token_expires_at: Some(Some(
                    Utc::now() + ChronoDuration::minutes(TWO_FACTOR_TEMP_TOKEN_TTL_MINUTES),
                )),
                ..Default::default()
            },
        )
        .await?;

        return Ok(success(json!({
            "requiresTwoFactor": true,
            "tempToken": temp_token,
        }))
        .into_response());
    }

    let device = DeviceInfo {
        device_id: req.device_id.clone(),
        device_name: req.device_name.clone(),
        user_agent: user_agent(&headers),
        ip_address: Some(ip.clone()),
        location: None,
    };
    let is_new_device = req
        .device_id
        .as_deref()
        .map(|id| !user.trusted_device_list().iter().any(|d| d.device_id == id))
        .unwrap_or(true);

    let (access_token, cookie) = issue_session(&mut conn, &state, &user, &signals, &ip, device).await?;

    let trusted_devices =
        req.device_id.as_deref().map(|id| user.with_trusted_device_added(id)).unwrap_or_else(|| user.trusted_devices.clone());
    let login_history = user.with_login_history_appended(crate::models::user::LoginHistoryEntry {
        timestamp: Utc::now(),
        ip: ip.clone(),
        user_agent: user_agent(&headers).unwrap_or_default(),
        success: true,
        reason: None,
        location: None,
    });
    User::update(
        &mut conn,
        user.id,
        UserUpdate { trusted_devices: Some(trusted_devices), login_history: Some(login_history), ..Default::default() },
    )
    .await?;

    state
        .audit_writer
        .record(
            &mut conn,
            event_type::AUTH_LOGIN,
            Some(user.id),
            "login",
            "user",
            Some(user.id.to_string()),
            None,
            json!({"ip": ip}),
            AuditResult::Success,
            None,
            None,
        )
        .await?;

    if is_new_device {
        let _ = state
            .email_service
            .send_new_device_alert(
                &user.email,
                &user.full_name,
                req.device_name.as_deref().unwrap_or("unknown device"),
                &ip,
                user_agent(&headers).as_deref().unwrap_or("unknown"),
            )
            .await;
    }

    let jar = CookieJar::new().add(cookie);
    Ok((jar, success(json!({"accessToken": access_token, "user": UserDto::from(&user)}))).into_response())
}

async fn record_failed_login(
    state: &AppState,
    conn: &mut diesel_async::AsyncPgConnection,
    failure_key: &str,
    user: Option<&User>,
    ip: &str,
    reason: &str,
) -> Result<crate::services::FailedLoginRecord, ApiError> {
    let user_id = user.map(|u| u.id);
    let record = state.failed_login_tracker.record_failure(failure_key).await?;

    state
        .audit_writer
        .record(
            conn,
            event_type::SECURITY_FAILED_LOGIN,
            user_id,
            "login",
            "user",
            user_id.map(|id| id.to_string()),
            None,
            json!({"ip": ip, "reason": reason}),
            AuditResult::Failure,
            Some(reason.to_string()),
            Some(50),
        )
        .await?;

    if record.blocked {
        if let (Some(user), Some(locked_until)) = (user, record.blocked_until) {
            User::update(conn, user.id, UserUpdate { account_locked_until: Some(Some(locked_until)), ..Default::default() }).await?;
            let _ = state.email_service.send_account_locked_notice(&user.email, &user.full_name, &locked_until.to_rfc3339()).await;
        }
    }

    Ok(record)
}

pub async fn login_2fa(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: axum::http::HeaderMap,
    Json(req): Json<Login2faRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let ip = addr.ip().to_string();
    let signals = RequestSignals::from_headers(&headers, Some(ip.clone()));

    let mut conn = state.diesel_pool.get().await.map_err(|_| ApiError::internal("an internal error occurred"))?;

    let user = User::find_by_two_factor_temp_token(&mut conn, &req.temp_token)
        .await
        .map_err(|_| ApiError::auth("two-factor session expired, please log in again"))?;

    let encrypted_secret = user
        .two_factor_secret_encrypted
        .clone()
        .ok_or_else(|| ApiError::internal("two-factor state is inconsistent"))?;
    let backup_hashes = user.backup_code_hashes();

    let verification = match state.two_factor_service.verify_code(&encrypted_secret, &user.email, &backup_hashes, &req.code) {
        Ok(verification) => verification,
        Err(e) => {
            state
                .audit_writer
                .record(
                    &mut conn,
                    event_type::SECURITY_FAILED_LOGIN,
                    Some(user.id),
                    "login_2fa",
                    "user",
                    Some(user.id.to_string()),
                    None,
                    json!({"ip": ip}),
                    AuditResult::Failure,
                    Some("invalid two-factor code".to_string()),
                    Some(60),
                )
                .await?;
            return Err(e.into());
        },
    };

    let mut update = UserUpdate {
        two_factor_temp_token: Some(None),
        two_factor_temp_token_expires_at: Some(None),
        ..Default::default()
    };

    if let crate::services::two_factor::TwoFactorVerification::BackupCode(idx) = verification {
        let mut remaining = backup_hashes;
        remaining.remove(idx);
        update.two_factor_backup_codes = Some(serde_json::to_value(remaining).expect("backup codes serialize"));
    }

    User::update(&mut conn, user.id, update).await?;

    let device = DeviceInfo {
        device_id: None,
        device_name: None,
        user_agent: user_agent(&headers),
        ip_address: Some(ip.clone()),
        location: None,
    };
    let (access_token, cookie) = issue_session(&mut conn, &state, &user, &signals, &ip, device).await?;

    state
        .audit_writer
        .record(
            &mut conn,
            event_type::AUTH_LOGIN,
            Some(user.id),
            "login_2fa",
            "user",
            Some(user.id.to_string()),
            None,
            json!({"ip": ip}),
            AuditResult::Success,
            None,
            None,
        )
        .await?;

    let jar = CookieJar::new().add(cookie);
    Ok((jar, success(json!({"accessToken": access_token, "user": UserDto::from(&user)}))))
}

// ============================================================================
// Refresh / logout
// ============================================================================

/// Reads the refresh token only from the `refreshToken` cookie - any value
/// present in the request body is ignored, so a stolen access token alone
/// can never be used to drive rotation.
pub async fn refresh(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: axum::http::HeaderMap,
    jar: CookieJar,
) -> Result<impl IntoResponse, ApiError> {
    let ip = addr.ip().to_string();
    let signals = RequestSignals::from_headers(&headers, Some(ip.clone()));

    let token = jar
        .get(REFRESH_COOKIE_NAME)
        .map(|c| c.value().to_string())
        .ok_or_else(|| ApiError::auth("missing refresh token"))?;

    let mut conn = state.diesel_pool.get().await.map_err(|_| ApiError::internal("an internal error occurred"))?;

    let old_session = match SessionStore::begin_rotation(&mut conn, &token).await {
        Ok(session) => session,
        Err(crate::services::SessionStoreError::ReuseDetected) => {
            let claims = state.jwt_service.verify_refresh(&token).ok();
            let user_id = claims.and_then(|c| Uuid::parse_str(&c.sub).ok());
            state
                .audit_writer
                .record(
                    &mut conn,
                    event_type::SECURITY_SUSPICIOUS_ACTIVITY,
                    user_id,
                    "refresh",
                    "session",
                    None,
                    None,
                    json!({"ip": ip, "reason": "refresh token reuse"}),
                    AuditResult::Failure,
                    Some("refresh token reuse detected, family revoked".to_string()),
                    Some(90),
                )
                .await?;
            let deleted = CookieJar::new().add(build_delete_refresh_cookie(&state.config));
            return Ok(
                (deleted, ApiError::auth("session invalid, please log in again").into_response())
                    .into_response(),
            );
        },
        Err(other) => return Err(other.into()),
    };

    let claims = state.jwt_service.verify_refresh(&token)?;
    let user_id = Uuid::parse_str(&claims.sub).map_err(|_| ApiError::auth("invalid refresh token"))?;
    let user = User::find_by_id(&mut conn, user_id).await?;

    if user.token_version != claims.token_version {
        return Err(ApiError::auth("session invalid, please log in again"));
    }

    let device = DeviceInfo {
        device_id: old_session.device_id.clone(),
        device_name: old_session.device_name.clone(),
        user_agent: old_session.user_agent.clone().or_else(|| user_agent(&headers)),
        ip_address: Some(ip.clone()),
        location: old_session.location.clone(),
    };
    let (access_token, cookie) = issue_session(&mut conn, &state, &user, &signals, &ip, device).await?;

    let jar = CookieJar::new().add(cookie);
    Ok((jar, success(json!({"accessToken": access_token})).into_response()))
}

pub async fn logout(
    State(state): State<AppState>,
    jar: CookieJar,
) -> Result<impl IntoResponse, ApiError> {
    let mut conn = state.diesel_pool.get().await.map_err(|_| ApiError::internal("an internal error occurred"))?;

    if let Some(token) = jar.get(REFRESH_COOKIE_NAME).map(|c| c.value().to_string()) {
        let _ = SessionStore::revoke(&mut conn, &token, "logout").await;
    }

    let jar = CookieJar::new().add(build_delete_refresh_cookie(&state.config));
    Ok((jar, success_message("logged out")))
}

pub async fn logout_all(
    State(state): State<AppState>,
    auth: AuthenticatedUser,
) -> Result<impl IntoResponse, ApiError> {
    let mut conn = state.diesel_pool.get().await.map_err(|_| ApiError::internal("an internal error occurred"))?;

    SessionStore::revoke_all(&mut conn, auth.user_id, "logout_all").await?;
    User::update(&mut conn, auth.user_id, UserUpdate { token_version: Some(auth.token_version + 1), ..Default::default() }).await?;

    state
        .audit_writer
        .record(
            &mut conn,
            event_type::AUTH_LOGOUT,
            Some(auth.user_id),
            "logout_all",
            "user",
            Some(auth.user_id.to_string()),
            None,
            json!({}),
            AuditResult::Success,
            None,
            None,
        )
        .await?;

    let jar = CookieJar::new().add(build_delete_refresh_cookie(&state.config));
    Ok((jar, success_message("all sessions revoked")))
}

// ============================================================================
// Password reset / change
// ============================================================================

/// Enumeration-safe: the response is identical whether or not `email`
/// belongs to a registered account.
pub async fn forgot_password(
    State(state): State<AppState>,
    Json(req): Json<ForgotPasswordRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let mut conn = state.diesel_pool.get().await.map_err(|_| ApiError::internal("an internal error occurred"))?;

    if let Ok(user) = User::find_by_email(&mut conn, &req.email).await {
        let reset_token = Uuid::new_v4().to_string();
        User::update(
            &mut conn,
            user.id,
            UserUpdate {
                password_reset_token: Some(Some(reset_token.clone())),
                password_reset_expires_at: Some(Some(Utc::now() + ChronoDuration::minutes(PASSWORD_RESET_TTL_MINUTES))),
                ..Default::default()
            },
        )
        .await?;

        let _ = state.email_service.send_password_reset_email(&user.email, &user.full_name, &reset_token).await;
    }

    Ok(success_message("if that email is registered, a password reset link has been sent"))
}

pub async fn validate_reset_token(
    State(state): State<AppState>,
    Json(req): Json<ValidateResetTokenRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let mut conn = state.diesel_pool.get().await.map_err(|_| ApiError::internal("an internal error occurred"))?;

    let valid = User::find_by_reset_token(&mut conn, &req.token).await.is_ok();
    Ok(success(json!({"valid": valid})))
}

pub async fn reset_password(
    State(state): State<AppState>,
    Json(req): Json<ResetPasswordRequest>,
) -> Result<impl IntoResponse, ApiError> {
    req.validate()?;

    let mut conn = state.diesel_pool.get().await.map_err(|_| ApiError::internal("an internal error occurred"))?;

    let user = User::find_by_reset_token(&mut conn, &req.token)
        .await
        .map_err(|_| ApiError::validation("invalid or expired reset token"))?;

    reject_password_reuse(&user, &req.new_password)?;

    let new_hash = hash_password(&req.new_password).map_err(|_| ApiError::internal("an internal error occurred"))?;
    let new_history = user.with_new_password_history(&user.password_hash);

    User::update(
        &mut conn,
        user.id,
        UserUpdate {
            password_hash: Some(new_hash),
            password_history: Some(new_history),
            password_reset_token: Some(None),
            password_reset_expires_at: Some(None),
            token_version: Some(user.token_version + 1),
            last_password_change: Some(Some(Utc::now())),
            ..Default::default()
        },
    )
    .await?;

    SessionStore::revoke_all(&mut conn, user.id, "password_reset").await?;

    state
        .audit_writer
        .record(
            &mut conn,
            event_type::AUTH_PASSWORD_RESET,
            Some(user.id),
            "reset_password",
            "user",
            Some(user.id.to_string()),
            None,
            json!({}),
            AuditResult::Success,
            None,
            None,
        )
        .await?;

    let _ = state.email_service.send_password_change_notification(&user.email, &user.full_name, "unknown", "unknown").await;

    Ok(success_message("password reset, please log in again"))
}

pub async fn change_password(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: axum::http::HeaderMap,
    auth: AuthenticatedUser,
    Json(req): Json<ChangePasswordRequest>,
) -> Result<impl IntoResponse, ApiError> {
    req.validate()?;

    let ip = addr.ip().to_string();
    let signals = RequestSignals::from_headers(&headers, Some(ip.clone()));

    let mut conn = state.diesel_pool.get().await.map_err(|_| ApiError::internal("an internal error occurred"))?;
    let user = User::find_by_id(&mut conn, auth.user_id).await?;

    if !verify_password(&req.current_password, &user.password_hash).unwrap_or(false) {
        return Err(ApiError::auth("current password is incorrect"));
    }

    reject_password_reuse(&user, &req.new_password)?;

    let new_hash = hash_password(&req.new_password).map_err(|_| ApiError::internal("an internal error occurred"))?;
    let new_history = user.with_new_password_history(&user.password_hash);
    let new_token_version = user.token_version + 1;

    User::update(
        &mut conn,
        user.id,
        UserUpdate {
            password_hash: Some(new_hash),
            password_history: Some(new_history),
            token_version: Some(new_token_version),
            last_password_change: Some(Some(Utc::now())),
            ..Default::default()
        },
    )
    .await?;

    SessionStore::revoke_all(&mut conn, user.id, "password_change").await?;

    let mut refreshed_user = user.clone();
    refreshed_user.token_version = new_token_version;

    let device = DeviceInfo { device_id: None, device_name: None, user_agent: user_agent(&headers), ip_address: Some(ip.clone()), location: None };
    let (access_token, cookie) = issue_session(&mut conn, &state, &refreshed_user, &signals, &ip, device).await?;

    state
        .audit_writer
        .record(
            &mut conn,
            event_type::AUTH_PASSWORD_RESET,
            Some(user.id),
            "change_password",
            "user",
            Some(user.id.to_string()),
            None,
            json!({}),
            AuditResult::Success,
            None,
            None,
        )
        .await?;

    let _ = state.email_service.send_password_change_notification(&refreshed_user.email, &refreshed_user.full_name, &ip, user_agent(&headers).as_deref().unwrap_or("unknown")).await;

    let jar = CookieJar::new().add(cookie);
    Ok((jar, success(json!({"accessToken": access_token}))))
}

/// Rejects reuse against the current hash plus the last
/// `PASSWORD_HISTORY_LIMIT` prior hashes (§4.1's reuse-prevention rule).
fn reject_password_reuse(user: &User, candidate: &str) -> Result<(), ApiError> {
    let current_matches = verify_password(candidate, &user.password_hash).unwrap_or(false);
    let history_matches =
        user.password_history_hashes().iter().any(|hash| verify_password(candidate, hash).unwrap_or(false));

    if current_matches || history_matches {
        return Err(ApiError::validation("cannot reuse a recent password"));
    }

    Ok(())
}

// ============================================================================
// Two-factor enrollment
// ============================================================================

pub async fn enable_two_factor(
    State(state): State<AppState>,
    auth: AuthenticatedUser,
) -> Result<impl IntoResponse, ApiError> {
    let mut conn = state.diesel_pool.get().await.map_err(|_| ApiError::internal("an internal error occurred"))?;
    let user = User::find_by_id(&mut conn, auth.user_id).await?;

    if user.two_factor_enabled {
        return Err(ApiError::conflict("two-factor authentication is already enabled"));
    }

    let material = state.two_factor_service.enroll(&user.email)?;

    User::update(
        &mut conn,
        user.id,
        UserUpdate {
            two_factor_secret_encrypted: Some(Some(material.encrypted_secret)),
            two_factor_backup_codes: Some(serde_json::to_value(&material.backup_code_hashes).expect("codes serialize")),
            ..Default::default()
        },
    )
    .await?;

    Ok(success(json!({
        "provisioningUri": material.provisioning_uri,
        "backupCodes": material.plaintext_backup_codes,
    })))
}

pub async fn verify_two_factor_setup(
    State(state): State<AppState>,
    auth: AuthenticatedUser,
    Json(req): Json<VerifyTwoFactorSetupRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let mut conn = state.diesel_pool.get().await.map_err(|_| ApiError::internal("an internal error occurred"))?;
    let user = User::find_by_id(&mut conn, auth.user_id).await?;

    let encrypted_secret = user.two_factor_secret_encrypted.clone().ok_or_else(|| ApiError::validation("two-factor setup has not been started"))?;

    if !state.two_factor_service.verify_totp(&encrypted_secret, &user.email, &req.code)? {
        return Err(ApiError::auth("invalid two-factor code"));
    }

    User::update(&mut conn, user.id, UserUpdate { two_factor_enabled: Some(true), ..Default::default() }).await?;

    state
        .audit_writer
        .record(
            &mut conn,
            event_type::AUTH_2FA_ENABLE,
            Some(user.id),
            "verify_two_factor_setup",
            "user",
            Some(user.id.to_string()),
            None,
            json!({}),
            AuditResult::Success,
            None,
            None,
        )
        .await?;

    Ok(success_message("two-factor authentication enabled"))
}

pub async fn disable_two_factor(
    State(state): State<AppState>,
    auth: AuthenticatedUser,
    Json(req): Json<DisableTwoFactorRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let mut conn = state.diesel_pool.get().await.map_err(|_| ApiError::internal("an internal error occurred"))?;
    let user = User::find_by_id(&mut conn, auth.user_id).await?;

    if !verify_password(&req.password, &user.password_hash).unwrap_or(false) {
        return Err(ApiError::auth("password is incorrect"));
    }

    let encrypted_secret = user.two_factor_secret_encrypted.clone().ok_or_else(|| ApiError::validation("two-factor authentication is not enabled"))?;
    let backup_hashes = user.backup_code_hashes();
    state.two_factor_service.verify_code(&encrypted_secret, &user.email, &backup_hashes, &req.code)?;

    User::update(
        &mut conn,
        user.id,
        UserUpdate {
            two_factor_enabled: Some(false),
            two_factor_secret_encrypted: Some(None),
            two_factor_backup_codes: Some(json!([])),
            two_factor_temp_token: Some(None),
            two_factor_temp_token_expires_at: Some(None),
            ..Default::default()
        },
    )
    .await?;

    state
        .audit_writer
        .record(
            &mut conn,
            event_type::AUTH_2FA_DISABLE,
            Some(user.id),
            "disable_two_factor",
            "user",
            Some(user.id.to_string()),
            None,
            json!({}),
            AuditResult::Success,
            None,
            None,
        )
        .await?;

    Ok(success_message("two-factor authentication disabled"))
}

pub async fn regenerate_backup_codes(
    State(state): State<AppState>,
    auth: AuthenticatedUser,
) -> Result<impl IntoResponse, ApiError> {
    let mut conn = state.diesel_pool.get().await.map_err(|_| ApiError::internal("an internal error occurred"))?;
    let user = User::find_by_id(&mut conn, auth.user_id).await?;

    if !user.two_factor_enabled {
        return Err(ApiError::validation("two-factor authentication is not enabled"));
    }

    let (plaintext, hashes) = state.two_factor_service.regenerate_backup_codes()?;

    User::update(
        &mut conn,
        user.id,
        UserUpdate { two_factor_backup_codes: Some(serde_json::to_value(&hashes).expect("codes serialize")), ..Default::default() },
    )
    .await?;

    Ok(success(json!({"backupCodes": plaintext})))
}

// ============================================================================
// Session management / profile
// ============================================================================

pub async fn list_sessions(State(state): State<AppState>, auth: AuthenticatedUser) -> Result<impl IntoResponse, ApiError> {
    let mut conn = state.diesel_pool.get().await.map_err(|_| ApiError::internal("an internal error occurred"))?;
    let sessions = SessionStore::list_active(&mut conn, auth.user_id).await?;

    let dtos: Vec<SessionDto> = sessions
        .into_iter()
        .map(|s| SessionDto {
            id: s.id,
            device_name: s.device_name,
            ip_address: s.ip_address,
            location: s.location,
            created_at: s.created_at,
            last_used_at: s.last_used_at,
        })
        .collect();

    Ok(success(json!({"sessions": dtos})))
}

pub async fn revoke_session(
    State(state): State<AppState>,
    auth: AuthenticatedUser,
    Json(req): Json<RevokeSessionRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let mut conn = state.diesel_pool.get().await.map_err(|_| ApiError::internal("an internal error occurred"))?;

    let revoked = SessionStore::revoke_by_id(&mut conn, auth.user_id, req.session_id, "user_revoked").await?;
    if !revoked {
        return Err(ApiError::validation("session not found"));
    }

    state
        .audit_writer
        .record(
            &mut conn,
            event_type::AUTH_SESSION_REVOKE,
            Some(auth.user_id),
            "revoke_session",
            "session",
            Some(req.session_id.to_string()),
            None,
            json!({}),
            AuditResult::Success,
            None,
            None,
        )
        .await?;

    Ok(success_message("session revoked"))
}

pub async fn get_current_user(State(state): State<AppState>, auth: AuthenticatedUser) -> Result<impl IntoResponse, ApiError> {
    let mut conn = state.diesel_pool.get().await.map_err(|_| ApiError::internal("an internal error occurred"))?;
    let user = User::find_by_id(&mut conn, auth.user_id).await?;

    Ok(success(json!({"user": UserDto::from(&user)})))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn password_strength_boundary_is_twelve_chars() {
        assert!(validate_password_strength("Aa1!Aa1!Aa1").is_err()); // 11 chars
        assert!(validate_password_strength("Aa1!Aa1!Aa1!").is_ok()); // 12 chars
    }
}
