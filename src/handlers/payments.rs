// Payment-intent gate and webhook verifier (§4.8): authoritative pricing,
// fraud-score gating, order creation, and provider-signature verification.
// The product catalog and the payment provider itself are external
// collaborators; this module only drives the contract in `services::payment`.

use axum::{
    body::Bytes,
    extract::{ConnectInfo, State},
    http::HeaderMap,
    response::{IntoResponse, Json},
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::net::SocketAddr;

use crate::{
    app::AppState,
    error::ApiError,
    middleware::{auth::AuthenticatedUser, object_id::validate_object_id},
    models::{
        audit_log::{event_type, AuditLogEntry, AuditResult},
        order::{NewOrder, Order, OrderUpdate},
        user::User,
    },
    services::{
        anomaly::AnomalyScorer,
        payment::{price_items, verify_webhook_signature, RequestedItem, WebhookEvent},
    },
};

const DEFAULT_CURRENCY: &str = "usd";

fn success(data: Value) -> Json<Value> {
    Json(json!({"status": "success", "data": data}))
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct CreateIntentRequest {
    pub items: Vec<RequestedItemInput>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct RequestedItemInput {
    pub product_id: String,
    pub quantity: u32,
}

pub async fn create_intent(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    auth: AuthenticatedUser,
    Json(req): Json<CreateIntentRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if req.items.is_empty() {
        return Err(ApiError::validation("items must not be empty"));
    }

    let mut requested = Vec::with_capacity(req.items.len());
    for item in &req.items {
        if !validate_object_id(&item.product_id) {
            return Err(ApiError::validation("invalid product id"));
        }
        if !(1..=100).contains(&item.quantity) {
            return Err(ApiError::validation("quantity must be between 1 and 100"));
        }
        requested.push(RequestedItem { product_id: item.product_id.clone(), quantity: item.quantity });
    }

    let priced = price_items(state.product_catalog.as_ref(), &requested).await?;

    let ip = addr.ip().to_string();
    let mut conn = state.diesel_pool.get().await.map_err(|_| ApiError::internal("an internal error occurred"))?;

    let since = chrono::Utc::now() - chrono::Duration::hours(24);
    let distinct_ips = AuditLogEntry::distinct_ip_count_since_by_user(&mut conn, auth.user_id, since).await?;
    let score = AnomalyScorer::score_payment(&mut conn, auth.user_id, priced.total_cents, distinct_ips).await?;

    if score.blocks_payment() {
        state
            .audit_writer
            .record(
                &mut conn,
                event_type::SECURITY_FRAUD_DETECTED,
                Some(auth.user_id),
                "create_intent",
                "order",
                None,
                None,
                json!({"ip": ip, "score": score.score, "reasons": score.reasons}),
                AuditResult::Failure,
                Some("payment blocked by fraud score".to_string()),
                Some(score.score as i32),
            )
            .await?;
        return Err(ApiError::fraud_gate("this order could not be processed"));
    }

    let order = Order::create(
        &mut conn,
        NewOrder {
            user_id: auth.user_id,
            items: serde_json::to_value(&priced.items).expect("order items serialize"),
            total_amount: priced.total_cents as i32,
            currency: DEFAULT_CURRENCY.to_string(),
            status: "pending".to_string(),
            shipping_address: None,
            ip_address: Some(ip.clone()),
        },
    )
    .await?;

    state
        .audit_writer
        .record(
            &mut conn,
            event_type::PAYMENT_INITIATED,
            Some(auth.user_id),
            "create_intent",
            "order",
            Some(order.id.to_string()),
            None,
            json!({"ip": ip, "totalCents": priced.total_cents}),
            AuditResult::Success,
            None,
            Some(score.score as i32),
        )
        .await?;

    let intent = state
        .payment_gateway
        .create_intent(priced.total_cents, DEFAULT_CURRENCY, order.id, auth.user_id)
        .await?;

    let order = Order::update(
        &mut conn,
        order.id,
        OrderUpdate {
            status: Some("processing".to_string()),
            payment_intent_id: Some(Some(intent.payment_intent_id.clone())),
            client_secret: Some(Some(intent.client_secret.clone())),
        },
    )
    .await?;

    Ok(success(json!({
        "orderId": order.id,
        "paymentIntentId": intent.payment_intent_id,
        "clientSecret": intent.client_secret,
    })))
}

/// Verifies the provider signature against the raw body before any
/// branching on its contents (§4.8) - the body is taken as `Bytes`, not a
/// parsed `Json<T>`, specifically so the signature covers exactly what was
/// received.
pub async fn webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let signature = headers
        .get("X-Provider-Signature")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::auth("missing webhook signature"))?;

    verify_webhook_signature(&state.config.payment.webhook_secret, &body, signature)?;

    let event: WebhookEvent = serde_json::from_slice(&body).map_err(|_| ApiError::validation("malformed webhook payload"))?;

    let mut conn = state.diesel_pool.get().await.map_err(|_| ApiError::internal("an internal error occurred"))?;

    match event {
        WebhookEvent::Succeeded { payment_intent_id } => {
            let order = Order::find_by_payment_intent_id(&mut conn, &payment_intent_id).await?;
            let order = Order::update(
                &mut conn,
                order.id,
                OrderUpdate { status: Some("paid".to_string()), payment_intent_id: None, client_secret: None },
            )
            .await?;

            state
                .audit_writer
                .record(
                    &mut conn,
                    event_type::PAYMENT_COMPLETED,
                    Some(order.user_id),
                    "webhook",
                    "order",
                    Some(order.id.to_string()),
                    None,
                    json!({"paymentIntentId": payment_intent_id}),
                    AuditResult::Success,
                    None,
                    None,
                )
                .await?;

            // Cart clearing is an external collaborator's responsibility; nothing to do here.
            if let Ok(user) = User::find_by_id(&mut conn, order.user_id).await {
                let total_display = format!("${:.2}", order.total_amount as f64 / 100.0);
                let _ = state.email_service.send_order_confirmation(&user.email, &user.full_name, &order.id.to_string(), &total_display).await;
            }
        },
        WebhookEvent::Failed { payment_intent_id, last_error_message } => {
            let order = Order::find_by_payment_intent_id(&mut conn, &payment_intent_id).await?;
            let order = Order::update(
                &mut conn,
                order.id,
                OrderUpdate { status: Some("cancelled".to_string()), payment_intent_id: None, client_secret: None },
            )
            .await?;

            state
                .audit_writer
                .record(
                    &mut conn,
                    event_type::PAYMENT_FAILED,
                    Some(order.user_id),
                    "webhook",
                    "order",
                    Some(order.id.to_string()),
                    None,
                    json!({"paymentIntentId": payment_intent_id}),
                    AuditResult::Failure,
                    last_error_message,
                    None,
                )
                .await?;
        },
    }

    Ok(success_message("ok"))
}

fn success_message(message: impl Into<String>) -> Json<Value> {
    Json(json!({"status": "success", "message": message.into()}))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_non_object_id_product() {
        assert!(!validate_object_id("not-an-id"));
    }
}
