pub mod auth;
pub mod payments;

use crate::{app::AppState, middleware::auth_middleware};
use axum::{middleware as axum_middleware, routing::{get, post}, Router};

/// Routes mounted under `/api/v1/auth`. Bearer-protected routes carry their
/// own `auth_middleware` layer rather than relying on the parent nest, since
/// several sibling routes (login, register, password reset) are necessarily
/// unauthenticated.
pub fn auth_routes(state: AppState) -> Router<AppState> {
    let public = Router::new()
        .route("/register", post(auth::register))
        .route("/verify-email", post(auth::verify_email))
        .route("/resend-verification", post(auth::resend_verification))
        .route("/login", post(auth::login))
        .route("/login/2fa", post(auth::login_2fa))
        .route("/refresh", post(auth::refresh))
        .route("/forgot-password", post(auth::forgot_password))
        .route("/validate-reset-token", post(auth::validate_reset_token))
        .route("/reset-password", post(auth::reset_password));

    let protected = Router::new()
        .route("/logout", post(auth::logout))
        .route("/logout-all", post(auth::logout_all))
        .route("/change-password", post(auth::change_password))
        .route("/2fa/enable", post(auth::enable_two_factor))
        .route("/2fa/verify-setup", post(auth::verify_two_factor_setup))
        .route("/2fa/disable", post(auth::disable_two_factor))
        .route("/2fa/backup-codes", post(auth::regenerate_backup_codes))
        .route("/sessions", get(auth::list_sessions))
        .route("/sessions/revoke", post(auth::revoke_session))
        .route("/me", get(auth::get_current_user))
        .route_layer(axum_middleware::from_fn_with_state(state, auth_middleware));

    Router::new().merge(public).merge(protected)
}

/// Routes mounted under `/api/v1/payments`. The webhook route carries no
/// bearer auth - it authenticates the caller via the provider signature
/// instead - but does get its own, larger body-size limit.
pub fn payment_routes(state: AppState) -> Router<AppState> {
    let protected = Router::new()
        .route("/create-intent", post(payments::create_intent))
        .route_layer(axum_middleware::from_fn_with_state(state, auth_middleware));

    let webhook = Router::new()
        .route("/webhook", post(payments::webhook))
        .layer(crate::middleware::body_limit::webhook_body_limit_layer());

    Router::new().merge(protected).merge(webhook)
}
