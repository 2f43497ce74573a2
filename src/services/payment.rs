// Payment-intent gate and webhook verifier (§4.8). The product catalog and
// the payment provider itself are external collaborators per scope - this
// module only implements the contract: authoritative pricing lookup,
// fraud-score gating, order creation, and provider-signature verification.

use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use thiserror::Error;
use uuid::Uuid;

type HmacSha256 = Hmac<Sha256>;

#[derive(Error, Debug)]
pub enum PaymentError {
    #[error("product {0} is inactive or missing")]
    ProductUnavailable(String),

    #[error("order total must be positive")]
    NonPositiveTotal,

    #[error("fraud score too high to proceed")]
    FraudGated,

    #[error("invalid webhook signature")]
    InvalidSignature,

    #[error("provider error: {0}")]
    Provider(String),
}

/// One line item as presented by the client - `productId`/`quantity` only.
/// Price is never accepted from the client.
#[derive(Debug, Clone, Deserialize)]
pub struct RequestedItem {
    pub product_id: String,
    pub quantity: u32,
}

/// Authoritative product facts, resolved server-side. The catalog itself is
/// an external collaborator (out of scope); this trait is the seam a real
/// catalog client implements.
#[derive(Debug, Clone)]
pub struct CatalogProduct {
    pub id: String,
    pub unit_price_cents: i64,
    pub is_active: bool,
}

#[async_trait::async_trait]
pub trait ProductCatalog: Send + Sync {
    async fn get_products(&self, ids: &[String]) -> Result<Vec<CatalogProduct>, PaymentError>;
}

#[derive(Debug, Clone, Serialize)]
pub struct PricedOrder {
    pub items: Vec<crate::models::order::OrderItem>,
    pub total_cents: i64,
}

/// Resolves client-supplied `{productId, quantity}` pairs against the
/// catalog, rejecting inactive/missing products, and computes the
/// authoritative total.
pub async fn price_items(
    catalog: &dyn ProductCatalog,
    requested: &[RequestedItem],
) -> Result<PricedOrder, PaymentError> {
    let ids: Vec<String> = requested.iter().map(|i| i.product_id.clone()).collect();
    let products = catalog.get_products(&ids).await?;

    let mut items = Vec::with_capacity(requested.len());
    let mut total_cents: i64 = 0;

    for req in requested {
        let product = products
            .iter()
            .find(|p| p.id == req.product_id)
            .ok_or_else(|| PaymentError::ProductUnavailable(req.product_id.clone()))?;

        if !product.is_active {
            return Err(PaymentError::ProductUnavailable(req.product_id.clone()));
        }

        let line_total = product.unit_price_cents * req.quantity as i64;
        total_cents += line_total;

        items.push(crate::models::order::OrderItem {
            product_id: req.product_id.clone(),
            quantity: req.quantity,
            unit_price_cents: product.unit_price_cents,
        });
    }

    if total_cents <= 0 {
        return Err(PaymentError::NonPositiveTotal);
    }

    Ok(PricedOrder { items, total_cents })
}

/// The external payment provider's intent-creation contract. A concrete
/// implementation wraps the provider's HTTP client; this seam keeps the
/// gate logic testable without a live provider.
#[async_trait::async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_intent(
        &self,
        amount_cents: i64,
        currency: &str,
        order_id: Uuid,
        user_id: Uuid,
    ) -> Result<ProviderIntent, PaymentError>;
}

#[derive(Debug, Clone)]
pub struct ProviderIntent {
    pub payment_intent_id: String,
    pub client_secret: String,
}

/// Verifies the provider's webhook signature header against the shared
/// secret before any branching on the body's contents, per §4.8.
pub fn verify_webhook_signature(
    webhook_secret: &str,
    raw_body: &[u8],
    signature_header: &str,
) -> Result<(), PaymentError> {
    let mut mac = HmacSha256::new_from_slice(webhook_secret.as_bytes())
        .map_err(|_| PaymentError::InvalidSignature)?;
    mac.update(raw_body);
    let expected = hex::encode(mac.finalize().into_bytes());

    if expected.as_bytes().ct_eq(signature_header.as_bytes()).into() {
        Ok(())
    } else {
        Err(PaymentError::InvalidSignature)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "type")]
pub enum WebhookEvent {
    #[serde(rename = "payment_intent.succeeded")]
    Succeeded { payment_intent_id: String },

    #[serde(rename = "payment_intent.payment_failed")]
    Failed {
        payment_intent_id: String,
        last_error_message: Option<String>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    struct StubCatalog {
        products: Vec<CatalogProduct>,
    }

    #[async_trait::async_trait]
    impl ProductCatalog for StubCatalog {
        async fn get_products(&self, ids: &[String]) -> Result<Vec<CatalogProduct>, PaymentError> {
            Ok(self
                .products
                .iter()
                .filter(|p| ids.contains(&p.id))
                .cloned()
                .collect())
        }
    }

    #[tokio::test]
    async fn prices_items_from_catalog_not_client() {
        let catalog = StubCatalog {
            products: vec![CatalogProduct {
                id: "abc123".to_string(),
                unit_price_cents: 2500,
                is_active: true,
            }],
        };

        let requested = vec![RequestedItem {
            product_id: "abc123".to_string(),
            quantity: 2,
        }];

        let priced = price_items(&catalog, &requested).await.unwrap();
        assert_eq!(priced.total_cents, 5000);
    }

    #[tokio::test]
    async fn rejects_inactive_product() {
        let catalog = StubCatalog {
            products: vec![CatalogProduct {
                id: "abc123".to_string(),
                unit_price_cents: 2500,
                is_active: false,
            }],
        };

        let requested = vec![RequestedItem {
            product_id: "abc123".to_string(),
            quantity: 1,
        }];

        assert!(price_items(&catalog, &requested).await.is_err());
    }

    #[test]
    fn webhook_signature_round_trips() {
        let secret = "whsec_test_secret";
        let body = br#"{"type":"payment_intent.succeeded"}"#;

        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(body);
        let sig = hex::encode(mac.finalize().into_bytes());

        assert!(verify_webhook_signature(secret, body, &sig).is_ok());
        assert!(verify_webhook_signature(secret, body, "deadbeef").is_err());
    }
}
