mod common;

use chrono::Utc;
use serde_json::json;
use shieldgate_core::{
    db::{create_diesel_pool, DieselDatabaseConfig},
    models::audit_log::{event_type, AuditLogEntry, AuditResult},
    services::AuditWriter,
};
use uuid::Uuid;

/// `AnomalyScorer::score_payment`'s distinct-IP signal is fed by this query;
/// writes three payment events from two distinct IPs for the same user and
/// confirms the count is 2, not 3, and that events for other users and
/// non-payment event types are excluded.
#[tokio::test]
async fn distinct_ip_count_ignores_other_users_and_non_payment_events() {
    dotenv::from_filename(".env.test").ok();
    let pool = create_diesel_pool(DieselDatabaseConfig::default()).await.expect("test database pool");
    let mut conn = pool.get().await.expect("connection");

    let writer = AuditWriter::from_config();
    let user_id = Uuid::new_v4();
    let other_user_id = Uuid::new_v4();
    let since = Utc::now() - chrono::Duration::hours(1);

    for ip in ["203.0.113.10", "203.0.113.10", "203.0.113.11"] {
        writer
            .record(
                &mut conn,
                event_type::PAYMENT_INITIATED,
                Some(user_id),
                "create_intent",
                "order",
                None,
                None,
                json!({"ip": ip}),
                AuditResult::Success,
                None,
                None,
            )
            .await
            .expect("record payment event");
    }

    // A non-payment event from a third IP for the same user must not count.
    writer
        .record(
            &mut conn,
            event_type::AUTH_LOGIN,
            Some(user_id),
            "login",
            "session",
            None,
            None,
            json!({"ip": "203.0.113.12"}),
            AuditResult::Success,
            None,
            None,
        )
        .await
        .expect("record login event");

    // A payment event for a different user must not count either.
    writer
        .record(
            &mut conn,
            event_type::PAYMENT_INITIATED,
            Some(other_user_id),
            "create_intent",
            "order",
            None,
            None,
            json!({"ip": "203.0.113.13"}),
            AuditResult::Success,
            None,
            None,
        )
        .await
        .expect("record other user payment event");

    let count = AuditLogEntry::distinct_ip_count_since_by_user(&mut conn, user_id, since)
        .await
        .expect("distinct ip count query");

    assert_eq!(count, 2);
}
