mod common;

use common::{setup_test_app, test_suffix};
use serde_json::json;

/// Registering, verifying the account isn't usable for login until email
/// verification completes, is a central flow of this backend; exercised
/// against a real database the way `common::setup_test_app` wires one up.
#[tokio::test]
async fn register_then_login_without_verification_is_rejected() {
    let app = setup_test_app().await;
    let email = format!("user-{}@example.com", test_suffix());

    let register_response = app
        .post("/api/v1/auth/register")
        .json(&json!({
            "email": email,
            "password": "Correct-Horse-Battery-Staple-9!",
            "full_name": "Test User",
        }))
        .send()
        .await;

    assert_eq!(register_response.status(), axum::http::StatusCode::OK);

    let login_response = app
        .post("/api/v1/auth/login")
        .json(&json!({"email": email, "password": "Correct-Horse-Battery-Staple-9!"}))
        .send()
        .await;

    // Unverified accounts cannot be used to obtain a session.
    assert_eq!(login_response.status(), axum::http::StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn login_with_wrong_password_does_not_reveal_account_existence() {
    let app = setup_test_app().await;
    let email = format!("nonexistent-{}@example.com", test_suffix());

    let response = app
        .post("/api/v1/auth/login")
        .json(&json!({"email": email, "password": "whatever-they-guessed"}))
        .send()
        .await;

    // Same rejection shape whether or not the account exists, per the
    // enumeration-safety requirement on the login surface.
    assert_eq!(response.status(), axum::http::StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn register_rejects_weak_password() {
    let app = setup_test_app().await;
    let email = format!("weak-{}@example.com", test_suffix());

    let response = app
        .post("/api/v1/auth/register")
        .json(&json!({"email": email, "password": "short", "full_name": "Test User"}))
        .send()
        .await;

    assert_eq!(response.status(), axum::http::StatusCode::BAD_REQUEST);
}
