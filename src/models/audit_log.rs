// Append-only audit log row. Mutation is rejected at the storage layer by
// `audit_logs_deny_update`/`audit_logs_deny_delete` triggers (see
// migrations/diesel/2024060100000000_initial_schema); this module never
// issues an UPDATE or DELETE against the table.

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel_async::{AsyncPgConnection, RunQueryDsl};
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use uuid::Uuid;

use crate::schema::audit_logs;

/// Closed event taxonomy (§4.6). Kept as `&'static str` constants rather than
/// an enum so a new event type is a one-line addition reviewed in a diff,
/// without touching the (de)serialization of already-written rows.
pub mod event_type {
    pub const AUTH_LOGIN: &str = "auth.login";
    pub const AUTH_LOGOUT: &str = "auth.logout";
    pub const AUTH_REGISTER: &str = "auth.register";
    pub const AUTH_PASSWORD_RESET: &str = "auth.password_reset";
    pub const AUTH_EMAIL_VERIFY: &str = "auth.email_verify";
    pub const AUTH_2FA_ENABLE: &str = "auth.2fa_enable";
    pub const AUTH_2FA_DISABLE: &str = "auth.2fa_disable";
    pub const AUTH_SESSION_REVOKE: &str = "auth.session_revoke";

    pub const PAYMENT_INITIATED: &str = "payment.initiated";
    pub const PAYMENT_COMPLETED: &str = "payment.completed";
    pub const PAYMENT_FAILED: &str = "payment.failed";
    pub const PAYMENT_REFUNDED: &str = "payment.refunded";

    pub const ORDER_CREATED: &str = "order.created";
    pub const ORDER_UPDATED: &str = "order.updated";
    pub const ORDER_CANCELLED: &str = "order.cancelled";
    pub const ORDER_SHIPPED: &str = "order.shipped";

    pub const USER_PROFILE_UPDATE: &str = "user.profile_update";
    pub const USER_ADDRESS_CHANGE: &str = "user.address_change";
    pub const USER_ROLE_CHANGE: &str = "user.role_change";
    pub const USER_ACCOUNT_LOCKED: &str = "user.account_locked";

    pub const ADMIN_USER_ACCESS: &str = "admin.user_access";
    pub const ADMIN_CONFIG_CHANGE: &str = "admin.config_change";
    pub const ADMIN_DATA_EXPORT: &str = "admin.data_export";
    pub const ADMIN_PRODUCT_CREATED: &str = "admin.product_created";
    pub const ADMIN_PRODUCT_UPDATED: &str = "admin.product_updated";
    pub const ADMIN_PRODUCT_DELETED: &str = "admin.product_deleted";

    pub const SECURITY_FAILED_LOGIN: &str = "security.failed_login";
    pub const SECURITY_RATE_LIMIT_EXCEEDED: &str = "security.rate_limit_exceeded";
    pub const SECURITY_SUSPICIOUS_ACTIVITY: &str = "security.suspicious_activity";
    pub const SECURITY_FRAUD_DETECTED: &str = "security.fraud_detected";

    pub const SYSTEM_BACKUP: &str = "system.backup";
    pub const SYSTEM_RESTORE: &str = "system.restore";
    pub const SYSTEM_MAINTENANCE: &str = "system.maintenance";
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum AuditResult {
    Success,
    Failure,
    Partial,
}

impl AuditResult {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditResult::Success => "success",
            AuditResult::Failure => "failure",
            AuditResult::Partial => "partial",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Selectable, Identifiable)]
#[diesel(table_name = audit_logs)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct AuditLogEntry {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub event_type: String,
    pub user_id: Option<Uuid>,
    pub action: String,
    pub resource: String,
    pub resource_id: Option<String>,
    pub changes: Option<Json>,
    pub metadata: Json,
    pub result: String,
    pub error_message: Option<String>,
    pub risk_score: Option<i32>,
    pub signature: String,
    pub previous_hash: Option<String>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = audit_logs)]
pub struct NewAuditLogEntry {
    pub timestamp: DateTime<Utc>,
    pub event_type: String,
    pub user_id: Option<Uuid>,
    pub action: String,
    pub resource: String,
    pub resource_id: Option<String>,
    pub changes: Option<Json>,
    pub metadata: Json,
    pub result: String,
    pub error_message: Option<String>,
    pub risk_score: Option<i32>,
    pub signature: String,
    pub previous_hash: Option<String>,
}

#[derive(thiserror::Error, Debug)]
pub enum AuditError {
    #[error("Database error: {0}")]
    Database(#[from] diesel::result::Error),
}

impl AuditLogEntry {
    /// Latest row by `timestamp`, used to chain `previousHash`.
    pub async fn latest(conn: &mut AsyncPgConnection) -> Result<Option<Self>, AuditError> {
        use crate::schema::audit_logs::dsl::*;

        audit_logs
            .order(timestamp.desc())
            .first::<Self>(conn)
            .await
            .optional()
            .map_err(AuditError::Database)
    }

    pub async fn insert(
        conn: &mut AsyncPgConnection,
        entry: NewAuditLogEntry,
    ) -> Result<Self, AuditError> {
        use crate::schema::audit_logs::dsl::*;

        diesel::insert_into(audit_logs)
            .values(&entry)
            .get_result::<Self>(conn)
            .await
            .map_err(AuditError::Database)
    }

    pub async fn list_for_chain_check(
        conn: &mut AsyncPgConnection,
        limit: i64,
    ) -> Result<Vec<Self>, AuditError> {
        use crate::schema::audit_logs::dsl::*;

        audit_logs
            .order(timestamp.asc())
            .limit(limit)
            .load::<Self>(conn)
            .await
            .map_err(AuditError::Database)
    }

    /// Count of rows for `event_type_val` attributed to `user_id_val` at or
    /// after `since`. Used by fraud/anomaly scoring (§4.7).
    pub async fn count_since_by_user(
        conn: &mut AsyncPgConnection,
        event_type_val: &str,
        user_id_val: Uuid,
        since: DateTime<Utc>,
    ) -> Result<i64, AuditError> {
        use crate::schema::audit_logs::dsl::*;

        audit_logs
            .filter(event_type.eq(event_type_val))
            .filter(user_id.eq(user_id_val))
            .filter(timestamp.ge(since))
            .count()
            .get_result(conn)
            .await
            .map_err(AuditError::Database)
    }

    /// Count of rows for `event_type_val` whose `metadata->>'ip'` equals
    /// `ip_val`, at or after `since`.
    pub async fn count_since_by_ip(
        conn: &mut AsyncPgConnection,
        event_type_val: &str,
        ip_val: &str,
        since: DateTime<Utc>,
    ) -> Result<i64, AuditError> {
        use diesel::sql_types::{Text, Timestamptz};

        #[derive(QueryableByName)]
        struct CountRow {
            #[diesel(sql_type = diesel::sql_types::BigInt)]
            count: i64,
        }

        let row: CountRow = diesel::sql_query(
            "SELECT COUNT(*) AS count FROM audit_logs \
             WHERE event_type = $1 AND metadata->>'ip' = $2 AND timestamp >= $3",
        )
        .bind::<Text, _>(event_type_val)
        .bind::<Text, _>(ip_val)
        .bind::<Timestamptz, _>(since)
        .get_result(conn)
        .await
        .map_err(AuditError::Database)?;

        Ok(row.count)
    }

    /// Ordered timestamps for rows matching `event_type_val` and
    /// `metadata->>'ip'`, at or after `since` - used to compute the mean
    /// inter-attempt gap for brute-force timing detection.
    pub async fn timestamps_since_by_ip(
        conn: &mut AsyncPgConnection,
        event_type_val: &str,
        ip_val: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<DateTime<Utc>>, AuditError> {
        use diesel::sql_types::{Text, Timestamptz};

        #[derive(QueryableByName)]
        struct TimestampRow {
            #[diesel(sql_type = Timestamptz)]
            timestamp: DateTime<Utc>,
        }

        let rows: Vec<TimestampRow> = diesel::sql_query(
            "SELECT timestamp FROM audit_logs \
             WHERE event_type = $1 AND metadata->>'ip' = $2 AND timestamp >= $3 \
             ORDER BY timestamp ASC",
        )
        .bind::<Text, _>(event_type_val)
        .bind::<Text, _>(ip_val)
        .bind::<Timestamptz, _>(since)
        .get_results(conn)
        .await
        .map_err(AuditError::Database)?;

        Ok(rows.into_iter().map(|r| r.timestamp).collect())
    }

    /// Distinct `metadata->>'ip'` values across payment-related events for
    /// `user_id_val` at or after `since` - feeds the payment fraud scorer's
    /// "more than 5 distinct IPs" signal (§4.7).
    pub async fn distinct_ip_count_since_by_user(
        conn: &mut AsyncPgConnection,
        user_id_val: Uuid,
        since: DateTime<Utc>,
    ) -> Result<u32, AuditError> {
        use diesel::sql_types::{Timestamptz, Uuid as SqlUuid};

        #[derive(QueryableByName)]
        struct CountRow {
            #[diesel(sql_type = diesel::sql_types::BigInt)]
            count: i64,
        }

        let row: CountRow = diesel::sql_query(
            "SELECT COUNT(DISTINCT metadata->>'ip') AS count FROM audit_logs \
             WHERE event_type LIKE 'payment.%' AND user_id = $1 AND timestamp >= $2",
        )
        .bind::<SqlUuid, _>(user_id_val)
        .bind::<Timestamptz, _>(since)
        .get_result(conn)
        .await
        .map_err(AuditError::Database)?;

        Ok(row.count.max(0) as u32)
    }

    pub fn timestamp_iso8601(&self) -> String {
        self.timestamp.to_rfc3339_opts(chrono::SecondsFormat::Micros, true)
    }
}
