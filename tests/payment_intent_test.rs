mod common;

use common::setup_test_app;
use serde_json::json;

/// `/payments/create-intent` is behind `auth_middleware`; with no session
/// at all it must reject before any request-body validation runs.
#[tokio::test]
async fn create_intent_requires_authentication() {
    let app = setup_test_app().await;

    let response = app
        .post("/api/v1/payments/create-intent")
        .json(&json!({"items": [{"productId": "507f1f77bcf86cd799439011", "quantity": 1}]}))
        .send()
        .await;

    assert_eq!(response.status(), axum::http::StatusCode::UNAUTHORIZED);
}

/// The request body is `deny_unknown_fields`; a client trying to smuggle a
/// client-supplied price must be rejected at deserialization, never reach
/// the authoritative pricing step.
#[tokio::test]
async fn create_intent_rejects_client_supplied_amount() {
    let app = setup_test_app().await;

    let response = app
        .post("/api/v1/payments/create-intent")
        .bearer("not-a-real-token")
        .json(&json!({
            "items": [{"productId": "507f1f77bcf86cd799439011", "quantity": 1, "amount": 100}],
        }))
        .send()
        .await;

    // Either the auth guard or the `deny_unknown_fields` body rejection
    // fires first; both resolve to a non-success status.
    assert_ne!(response.status(), axum::http::StatusCode::OK);
}

/// The webhook route carries no auth guard but does require a valid
/// provider signature header before anything else is evaluated.
#[tokio::test]
async fn webhook_without_signature_header_is_rejected() {
    let app = setup_test_app().await;

    let response = app
        .post("/api/v1/payments/webhook")
        .json(&json!({"type": "payment_intent.succeeded", "payment_intent_id": "pi_test"}))
        .send()
        .await;

    assert_eq!(response.status(), axum::http::StatusCode::UNAUTHORIZED);
}
