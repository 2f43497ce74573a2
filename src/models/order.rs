// Order database model: produced by the payment-intent gate (§4.8), priced
// authoritatively server-side - never trusts a client-supplied amount.

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel_async::{AsyncPgConnection, RunQueryDsl};
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use uuid::Uuid;

use crate::schema::orders;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum OrderStatus {
    Pending,
    Processing,
    Paid,
    Shipped,
    Cancelled,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Processing => "processing",
            OrderStatus::Paid => "paid",
            OrderStatus::Shipped => "shipped",
            OrderStatus::Cancelled => "cancelled",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderItem {
    pub product_id: String,
    pub quantity: u32,
    /// Authoritative unit price in cents, resolved server-side at intent
    /// creation - never taken from the request body.
    pub unit_price_cents: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Selectable, Identifiable)]
#[diesel(table_name = orders)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct Order {
    pub id: Uuid,
    pub user_id: Uuid,
    pub items: Json,
    pub total_amount: i32,
    pub currency: String,
    pub status: String,
    pub payment_intent_id: Option<String>,
    pub client_secret: Option<String>,
    pub shipping_address: Option<Json>,
    pub ip_address: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = orders)]
pub struct NewOrder {
    pub user_id: Uuid,
    pub items: Json,
    pub total_amount: i32,
    pub currency: String,
    pub status: String,
    pub shipping_address: Option<Json>,
    pub ip_address: Option<String>,
}

#[derive(Debug, AsChangeset)]
#[diesel(table_name = orders)]
pub struct OrderUpdate {
    pub status: Option<String>,
    pub payment_intent_id: Option<Option<String>>,
    pub client_secret: Option<Option<String>>,
}

#[derive(thiserror::Error, Debug)]
pub enum OrderError {
    #[error("Database error: {0}")]
    Database(#[from] diesel::result::Error),

    #[error("Order not found")]
    NotFound,

    #[error("Order total must be positive")]
    NonPositiveTotal,
}

impl Order {
    pub async fn create(
        conn: &mut AsyncPgConnection,
        new_order: NewOrder,
    ) -> Result<Self, OrderError> {
        use crate::schema::orders::dsl::*;

        if new_order.total_amount <= 0 {
            return Err(OrderError::NonPositiveTotal);
        }

        diesel::insert_into(orders)
            .values(&new_order)
            .get_result::<Self>(conn)
            .await
            .map_err(OrderError::Database)
    }

    pub async fn find_by_id(
        conn: &mut AsyncPgConnection,
        order_id: Uuid,
    ) -> Result<Self, OrderError> {
        use crate::schema::orders::dsl::*;

        orders
            .filter(id.eq(order_id))
            .first::<Self>(conn)
            .await
            .map_err(|e| match e {
                diesel::result::Error::NotFound => OrderError::NotFound,
                other => OrderError::Database(other),
            })
    }

    pub async fn find_by_payment_intent_id(
        conn: &mut AsyncPgConnection,
        intent_id: &str,
    ) -> Result<Self, OrderError> {
        use crate::schema::orders::dsl::*;

        orders
            .filter(payment_intent_id.eq(intent_id))
            .first::<Self>(conn)
            .await
            .map_err(|e| match e {
                diesel::result::Error::NotFound => OrderError::NotFound,
                other => OrderError::Database(other),
            })
    }

    pub async fn update(
        conn: &mut AsyncPgConnection,
        order_id: Uuid,
        update: OrderUpdate,
    ) -> Result<Self, OrderError> {
        use crate::schema::orders::dsl::*;

        diesel::update(orders.filter(id.eq(order_id)))
            .set(&update)
            .get_result::<Self>(conn)
            .await
            .map_err(|e| match e {
                diesel::result::Error::NotFound => OrderError::NotFound,
                other => OrderError::Database(other),
            })
    }

    pub async fn recent_for_user(
        conn: &mut AsyncPgConnection,
        user_id_val: Uuid,
        limit: i64,
    ) -> Result<Vec<Self>, OrderError> {
        use crate::schema::orders::dsl::*;

        orders
            .filter(user_id.eq(user_id_val))
            .order(created_at.desc())
            .limit(limit)
            .load::<Self>(conn)
            .await
            .map_err(OrderError::Database)
    }

    pub fn items_decoded(&self) -> Vec<OrderItem> {
        serde_json::from_value(self.items.clone()).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn order_status_round_trips() {
        assert_eq!(OrderStatus::Paid.as_str(), "paid");
        assert_eq!(OrderStatus::Cancelled.as_str(), "cancelled");
    }
}
