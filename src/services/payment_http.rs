// HTTP-backed implementations of the `PaymentGateway`/`ProductCatalog` seams
// defined in `payment.rs`. Both upstreams are external collaborators per
// scope; this module only wraps their HTTP contracts the way `EmailSender`
// wraps Resend's.

use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use serde::Deserialize;
use tracing::{error, instrument, warn};
use uuid::Uuid;

use super::payment::{CatalogProduct, PaymentError, PaymentGateway, ProductCatalog, ProviderIntent};

/// Stripe-compatible payment intent API client.
#[derive(Clone)]
pub struct StripePaymentGateway {
    client: Arc<Client>,
    api_base_url: String,
    secret_key: String,
}

impl StripePaymentGateway {
    pub fn new(api_base_url: String, secret_key: String) -> Self {
        Self {
            client: Arc::new(Client::new()),
            api_base_url,
            secret_key,
        }
    }
}

#[derive(Debug, Deserialize)]
struct StripeIntentResponse {
    id: String,
    client_secret: String,
}

#[async_trait::async_trait]
impl PaymentGateway for StripePaymentGateway {
    #[instrument(skip(self), fields(order_id = %order_id, user_id = %user_id))]
    async fn create_intent(
        &self,
        amount_cents: i64,
        currency: &str,
        order_id: Uuid,
        user_id: Uuid,
    ) -> Result<ProviderIntent, PaymentError> {
        let response = self
            .client
            .post(format!("{}/payment_intents", self.api_base_url))
            .basic_auth(&self.secret_key, Option::<&str>::None)
            .form(&[
                ("amount", amount_cents.to_string()),
                ("currency", currency.to_lowercase()),
                ("metadata[order_id]", order_id.to_string()),
                ("metadata[user_id]", user_id.to_string()),
            ])
            .send()
            .await
            .map_err(|e| PaymentError::Provider(format!("network error: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            error!("payment provider rejected intent creation: {} {}", status, body);
            return Err(PaymentError::Provider(format!(
                "provider returned {status}"
            )));
        }

        let parsed: StripeIntentResponse = response
            .json()
            .await
            .map_err(|e| PaymentError::Provider(format!("malformed provider response: {e}")))?;

        Ok(ProviderIntent {
            payment_intent_id: parsed.id,
            client_secret: parsed.client_secret,
        })
    }
}

/// Authoritative pricing lookup against the internal product catalog
/// service. Never trusts client-supplied prices (§4.8).
#[derive(Clone)]
pub struct HttpProductCatalog {
    client: Arc<Client>,
    base_url: String,
}

impl HttpProductCatalog {
    pub fn new(base_url: String) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(5))
            .build()
            .unwrap_or_default();
        Self {
            client: Arc::new(client),
            base_url,
        }
    }
}

#[derive(Debug, Deserialize)]
struct CatalogEntry {
    id: String,
    unit_price_cents: i64,
    is_active: bool,
}

#[derive(Debug, Deserialize)]
struct CatalogLookupResponse {
    products: Vec<CatalogEntry>,
}

#[async_trait::async_trait]
impl ProductCatalog for HttpProductCatalog {
    #[instrument(skip(self, ids), fields(count = ids.len()))]
    async fn get_products(&self, ids: &[String]) -> Result<Vec<CatalogProduct>, PaymentError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let response = self
            .client
            .get(format!("{}/products", self.base_url))
            .query(&[("ids", ids.join(","))])
            .send()
            .await
            .map_err(|e| PaymentError::Provider(format!("catalog network error: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            warn!("catalog lookup returned non-success status {}", status);
            return Err(PaymentError::Provider(format!(
                "catalog returned {status}"
            )));
        }

        let parsed: CatalogLookupResponse = response
            .json()
            .await
            .map_err(|e| PaymentError::Provider(format!("malformed catalog response: {e}")))?;

        Ok(parsed
            .products
            .into_iter()
            .map(|p| CatalogProduct {
                id: p.id,
                unit_price_cents: p.unit_price_cents,
                is_active: p.is_active,
            })
            .collect())
    }
}
