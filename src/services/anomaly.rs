// Fraud/anomaly scoring (§4.7). Pure read-side: computes a score and
// reasons over history already fetched by the caller; never mutates state
// itself. The auth/payment orchestrators decide what to do with the result.

use chrono::{DateTime, Duration, Utc};
use diesel_async::AsyncPgConnection;
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::models::audit_log::event_type;
use crate::models::audit_log::AuditError;
use crate::models::order::Order;

#[derive(Error, Debug)]
pub enum AnomalyError {
    #[error(transparent)]
    Database(#[from] diesel::result::Error),

    #[error(transparent)]
    Audit(#[from] AuditError),
}

#[derive(Debug, Clone, Serialize, Default)]
pub struct AnomalyResult {
    pub score: u32,
    pub reasons: Vec<String>,
}

impl AnomalyResult {
    fn add(&mut self, points: u32, reason: impl Into<String>) {
        self.score += points;
        self.reasons.push(reason.into());
    }

    /// §4.6: surfaced as `security.suspicious_activity`.
    pub fn is_suspicious(&self) -> bool {
        self.score >= 60
    }

    /// Fires an alert hook (log-level escalation; no external paging system
    /// is in scope here).
    pub fn should_alert(&self) -> bool {
        self.score >= 70
    }

    /// §4.8: payment-intent creation is gated at this threshold.
    pub fn blocks_payment(&self) -> bool {
        self.score >= 80
    }
}

pub struct AnomalyScorer;

impl AnomalyScorer {
    /// High-value order anomaly + rapid order creation, combined because
    /// both read from the same user's order history.
    pub async fn score_order(
        conn: &mut AsyncPgConnection,
        user_id: Uuid,
        current_amount_cents: i64,
        shipping_address_fingerprint: Option<&str>,
    ) -> Result<AnomalyResult, AnomalyError> {
        let mut result = AnomalyResult::default();

        let recent = Order::recent_for_user(conn, user_id, 10)
            .await
            .map_err(|e| match e {
                crate::models::order::OrderError::Database(db) => db,
                _ => diesel::result::Error::NotFound,
            })?;

        if recent.is_empty() {
            if current_amount_cents > 1000_00 {
                result.add(50, "first-ever order above $1000");
            }
        } else {
            let avg = recent.iter().map(|o| o.total_amount as i64).sum::<i64>() / recent.len() as i64;
            if avg > 0 && current_amount_cents > avg * 3 {
                result.add(40, "order amount exceeds 3x recent average");
            }

            if let Some(fp) = shipping_address_fingerprint {
                let seen_before = recent.iter().any(|o| {
                    o.shipping_address
                        .as_ref()
                        .map(|addr| addr.to_string() == fp)
                        .unwrap_or(false)
                });
                if !seen_before && current_amount_cents > avg.max(1) {
                    result.add(30, "unseen shipping address on high-value order");
                }
            }
        }

        if current_amount_cents > 10000_00 {
            result.add(25, "order amount exceeds $10,000");
        }

        let hourly = count_orders_since(conn, user_id, Utc::now() - Duration::hours(1)).await?;
        if hourly > 5 {
            result.add(70, "more than 5 orders in the last hour");
        }

        let daily = count_orders_since(conn, user_id, Utc::now() - Duration::hours(24)).await?;
        if daily > 20 {
            result.add(50, "more than 20 orders in the last 24 hours");
        }

        Ok(result)
    }

    /// Failed-login pattern, scored over the audit log's
    /// `security.failed_login` entries.
    pub async fn score_failed_login(
        conn: &mut AsyncPgConnection,
        user_id: Uuid,
        ip: &str,
    ) -> Result<AnomalyResult, AnomalyError> {
        let mut result = AnomalyResult::default();
        let now = Utc::now();

        let by_user = crate::models::audit_log::AuditLogEntry::count_since_by_user(
            conn,
            event_type::SECURITY_FAILED_LOGIN,
            user_id,
            now - Duration::minutes(15),
        )
        .await?;
        if by_user > 5 {
            result.add(60, "more than 5 failed logins for this user in 15 minutes");
        }

        let by_ip = crate::models::audit_log::AuditLogEntry::count_since_by_ip(
            conn,
            event_type::SECURITY_FAILED_LOGIN,
            ip,
            now - Duration::minutes(15),
        )
        .await?;
        if by_ip > 10 {
            result.add(70, "more than 10 failed logins from this IP in 15 minutes");
        }

        let hourly_timestamps = crate::models::audit_log::AuditLogEntry::timestamps_since_by_ip(
            conn,
            event_type::SECURITY_FAILED_LOGIN,
            ip,
            now - Duration::hours(1),
        )
        .await?;

        if hourly_timestamps.len() >= 10 {
            if let Some(mean_gap) = mean_inter_attempt_gap(&hourly_timestamps) {
                if mean_gap < 5.0 {
                    result.add(80, "brute-force timing: mean inter-attempt gap under 5 seconds");
                }
            }
        }

        Ok(result)
    }

    /// Payment fraud scoring over the last 24 hours.
    pub async fn score_payment(
        conn: &mut AsyncPgConnection,
        user_id: Uuid,
        current_amount_cents: i64,
        distinct_ip_count: u32,
    ) -> Result<AnomalyResult, AnomalyError> {
        let mut result = AnomalyResult::default();
        let since = Utc::now() - Duration::hours(24);

        let failed_payments = crate::models::audit_log::AuditLogEntry::count_since_by_user(
            conn,
            event_type::PAYMENT_FAILED,
            user_id,
            since,
        )
        .await?;
        if failed_payments > 3 {
            result.add(50, "more than 3 failed payments in 24 hours");
        }

        if current_amount_cents > 5000_00 {
            result.add(20, "payment amount exceeds $5,000");
        }

        let initiated = crate::models::audit_log::AuditLogEntry::count_since_by_user(
            conn,
            event_type::PAYMENT_INITIATED,
            user_id,
            since,
        )
        .await?;
        let completed = crate::models::audit_log::AuditLogEntry::count_since_by_user(
            conn,
            event_type::PAYMENT_COMPLETED,
            user_id,
            since,
        )
        .await?;
        if initiated + completed + failed_payments > 10 {
            result.add(40, "more than 10 payment events in 24 hours");
        }

        if distinct_ip_count > 5 {
            result.add(30, "more than 5 distinct IPs in payment activity");
        }

        Ok(result)
    }
}

async fn count_orders_since(
    conn: &mut AsyncPgConnection,
    user_id: Uuid,
    since: DateTime<Utc>,
) -> Result<i64, diesel::result::Error> {
    use crate::schema::orders::dsl;
    use diesel::prelude::*;
    use diesel_async::RunQueryDsl;

    dsl::orders
        .filter(dsl::user_id.eq(user_id))
        .filter(dsl::created_at.ge(since))
        .count()
        .get_result(conn)
        .await
}

fn mean_inter_attempt_gap(timestamps: &[DateTime<Utc>]) -> Option<f64> {
    if timestamps.len() < 2 {
        return None;
    }

    let mut total_seconds = 0.0;
    for pair in timestamps.windows(2) {
        total_seconds += (pair[1] - pair[0]).num_milliseconds() as f64 / 1000.0;
    }

    Some(total_seconds / (timestamps.len() - 1) as f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn result_thresholds_match_spec() {
        let mut result = AnomalyResult::default();
        result.add(60, "x");
        assert!(result.is_suspicious());
        assert!(!result.should_alert());
        assert!(!result.blocks_payment());

        let mut high = AnomalyResult::default();
        high.add(80, "y");
        assert!(high.is_suspicious());
        assert!(high.should_alert());
        assert!(high.blocks_payment());
    }

    #[test]
    fn mean_gap_detects_tight_timing() {
        let base = Utc::now();
        let timestamps: Vec<_> = (0..10).map(|i| base + Duration::seconds(i * 2)).collect();
        let gap = mean_inter_attempt_gap(&timestamps).unwrap();
        assert!(gap < 5.0);
    }

    #[test]
    fn mean_gap_none_for_single_timestamp() {
        assert!(mean_inter_attempt_gap(&[Utc::now()]).is_none());
    }
}
