// Refresh session database model: rotation, reuse detection, per-device
// revocation. Keyed by the SHA-256 hash of the raw refresh token bytes
// (never the token, never its jti) so a leaked database row cannot be used
// to mint a token - only to recognize one already in the attacker's hands.

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel_async::{AsyncPgConnection, RunQueryDsl};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::schema::refresh_sessions;

/// Device snapshot captured at session creation.
#[derive(Debug, Clone, Default)]
pub struct DeviceInfo {
    pub device_id: Option<String>,
    pub device_name: Option<String>,
    pub user_agent: Option<String>,
    pub ip_address: Option<String>,
    pub location: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Selectable, Identifiable)]
#[diesel(table_name = refresh_sessions)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct RefreshSession {
    pub id: Uuid,
    pub user_id: Uuid,
    pub token_hash: String,
    pub family: String,
    pub device_id: Option<String>,
    pub device_name: Option<String>,
    pub user_agent: Option<String>,
    pub ip_address: Option<String>,
    pub location: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_used_at: Option<DateTime<Utc>>,
    pub expires_at: DateTime<Utc>,
    pub revoked: bool,
    pub revoked_reason: Option<String>,
    pub revoked_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = refresh_sessions)]
pub struct NewRefreshSession {
    pub user_id: Uuid,
    pub token_hash: String,
    pub family: String,
    pub device_id: Option<String>,
    pub device_name: Option<String>,
    pub user_agent: Option<String>,
    pub ip_address: Option<String>,
    pub location: Option<String>,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, AsChangeset)]
#[diesel(table_name = refresh_sessions)]
pub struct RefreshSessionUpdate {
    pub last_used_at: Option<DateTime<Utc>>,
    pub revoked: Option<bool>,
    pub revoked_reason: Option<Option<String>>,
    pub revoked_at: Option<Option<DateTime<Utc>>>,
}

#[derive(thiserror::Error, Debug)]
pub enum SessionError {
    #[error("Database error: {0}")]
    Database(#[from] diesel::result::Error),

    #[error("Session not found")]
    NotFound,

    #[error("Session expired")]
    Expired,

    #[error("Session revoked")]
    Revoked,

    #[error("Refresh in progress")]
    RefreshInProgress,

    #[error("Token reuse detected - family revoked")]
    ReuseDetected,
}

impl RefreshSession {
    /// `HashToken(token) -> hex`: SHA-256 of the raw token bytes.
    pub fn hash_token(token: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(token.as_bytes());
        format!("{:x}", hasher.finalize())
    }

    /// `Create`: insert a new session keyed by the token hash. Uniqueness is
    /// enforced at the storage layer by a partial unique index on
    /// `(token_hash) WHERE revoked = false`; a conflict here means a
    /// concurrent request already rotated this exact token.
    pub async fn create(
        conn: &mut AsyncPgConnection,
        user_id_val: Uuid,
        token: &str,
        family_val: String,
        expires_at_val: DateTime<Utc>,
        device: DeviceInfo,
    ) -> Result<Self, SessionError> {
        use crate::schema::refresh_sessions::dsl::*;

        let new_session = NewRefreshSession {
            user_id: user_id_val,
            token_hash: Self::hash_token(token),
            family: family_val,
            device_id: device.device_id,
            device_name: device.device_name,
            user_agent: device.user_agent,
            ip_address: device.ip_address,
            location: device.location,
            expires_at: expires_at_val,
        };

        diesel::insert_into(refresh_sessions)
            .values(&new_session)
            .get_result::<Self>(conn)
            .await
            .map_err(|e| match e {
                diesel::result::Error::DatabaseError(
                    diesel::result::DatabaseErrorKind::UniqueViolation,
                    _,
                ) => SessionError::RefreshInProgress,
                other => SessionError::Database(other),
            })
    }

    /// `Validate`: look up by hash among non-revoked rows; fail if not found,
    /// expired. Locks the row `FOR UPDATE` so rotation callers can revoke it
    /// atomically with respect to a concurrent rotation of the same token.
    pub async fn find_and_lock_by_token(
        conn: &mut AsyncPgConnection,
        token: &str,
    ) -> Result<Self, SessionError> {
        use diesel::sql_query;
        use diesel::sql_types::Text;

        let hash = Self::hash_token(token);

        let session = sql_query(
            "SELECT id, user_id, token_hash, family, device_id, device_name, user_agent, \
             ip_address, location, created_at, last_used_at, expires_at, revoked, \
             revoked_reason, revoked_at \
             FROM refresh_sessions \
             WHERE token_hash = $1 \
             FOR UPDATE",
        )
        .bind::<Text, _>(hash)
        .get_result::<Self>(conn)
        .await
        .map_err(|e| match e {
            diesel::result::Error::NotFound => SessionError::NotFound,
            other => SessionError::Database(other),
        })?;

        Ok(session)
    }

    /// Plain (non-locking) lookup, used by read paths like session
    /// enumeration that don't drive rotation.
    pub async fn find_by_token(
        conn: &mut AsyncPgConnection,
        token: &str,
    ) -> Result<Self, SessionError> {
        use crate::schema::refresh_sessions::dsl::*;

        let hash = Self::hash_token(token);

        refresh_sessions
            .filter(token_hash.eq(hash))
            .first::<Self>(conn)
            .await
            .map_err(|e| match e {
                diesel::result::Error::NotFound => SessionError::NotFound,
                other => SessionError::Database(other),
            })
    }

    pub fn is_usable(&self) -> bool {
        !self.revoked && self.expires_at > Utc::now()
    }

    /// A presented token whose hash matches a *revoked* row, but still
    /// within its original TTL, is a reuse signal (§4.2).
    pub fn is_reuse_within_ttl(&self) -> bool {
        self.revoked && self.expires_at > Utc::now()
    }

    pub async fn revoke(
        conn: &mut AsyncPgConnection,
        token: &str,
        reason: &str,
    ) -> Result<bool, SessionError> {
        use crate::schema::refresh_sessions::dsl::*;

        let hash = Self::hash_token(token);
        let now = Utc::now();

        let updated = diesel::update(
            refresh_sessions
                .filter(token_hash.eq(hash))
                .filter(revoked.eq(false)),
        )
        .set((
            revoked.eq(true),
            revoked_reason.eq(Some(reason)),
            revoked_at.eq(Some(now)),
        ))
        .execute(conn)
        .await?;

        Ok(updated > 0)
    }

    pub async fn revoke_by_id_in_tx(
        conn: &mut AsyncPgConnection,
        session_id: Uuid,
        reason: &str,
    ) -> Result<bool, SessionError> {
        use crate::schema::refresh_sessions::dsl::*;

        let now = Utc::now();

        let updated = diesel::update(
            refresh_sessions
                .filter(id.eq(session_id))
                .filter(revoked.eq(false)),
        )
        .set((
            revoked.eq(true),
            revoked_reason.eq(Some(reason)),
            revoked_at.eq(Some(now)),
        ))
        .execute(conn)
        .await?;

        Ok(updated > 0)
    }

    pub async fn revoke_family(
        conn: &mut AsyncPgConnection,
        family_val: &str,
        reason: &str,
    ) -> Result<usize, SessionError> {
        use crate::schema::refresh_sessions::dsl::*;

        let now = Utc::now();

        let updated = diesel::update(
            refresh_sessions
                .filter(family.eq(family_val))
                .filter(revoked.eq(false)),
        )
        .set((
            revoked.eq(true),
            revoked_reason.eq(Some(reason)),
            revoked_at.eq(Some(now)),
        ))
        .execute(conn)
        .await?;

        Ok(updated)
    }

    pub async fn revoke_all(
        conn: &mut AsyncPgConnection,
        user_id_val: Uuid,
        reason: &str,
    ) -> Result<usize, SessionError> {
        use crate::schema::refresh_sessions::dsl::*;

        let now = Utc::now();

        let updated = diesel::update(
            refresh_sessions
                .filter(user_id.eq(user_id_val))
                .filter(revoked.eq(false)),
        )
        .set((
            revoked.eq(true),
            revoked_reason.eq(Some(reason)),
            revoked_at.eq(Some(now)),
        ))
        .execute(conn)
        .await?;

        Ok(updated)
    }

    /// `RevokeById`: owner check is mandatory, enforced by filtering on both
    /// `id` and `user_id` together.
    pub async fn revoke_by_id(
        conn: &mut AsyncPgConnection,
        user_id_val: Uuid,
        session_id: Uuid,
        reason: &str,
    ) -> Result<bool, SessionError> {
        use crate::schema::refresh_sessions::dsl::*;

        let now = Utc::now();

        let updated = diesel::update(
            refresh_sessions
                .filter(id.eq(session_id))
                .filter(user_id.eq(user_id_val))
                .filter(revoked.eq(false)),
        )
        .set((
            revoked.eq(true),
            revoked_reason.eq(Some(reason)),
            revoked_at.eq(Some(now)),
        ))
        .execute(conn)
        .await?;

        Ok(updated > 0)
    }

    pub async fn list_active(
        conn: &mut AsyncPgConnection,
        user_id_val: Uuid,
    ) -> Result<Vec<Self>, SessionError> {
        use crate::schema::refresh_sessions::dsl::*;

        let now = Utc::now();

        let sessions = refresh_sessions
            .filter(user_id.eq(user_id_val))
            .filter(revoked.eq(false))
            .filter(expires_at.gt(now))
            .order(created_at.desc())
            .load::<Self>(conn)
            .await?;

        Ok(sessions)
    }

    pub async fn mark_used(conn: &mut AsyncPgConnection, id_val: Uuid) -> Result<(), SessionError> {
        use crate::schema::refresh_sessions::dsl::*;

        diesel::update(refresh_sessions.filter(id.eq(id_val)))
            .set(last_used_at.eq(Some(Utc::now())))
            .execute(conn)
            .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn sample(now: DateTime<Utc>) -> RefreshSession {
        RefreshSession {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            token_hash: RefreshSession::hash_token("raw-token-bytes"),
            family: "family-1".to_string(),
            device_id: None,
            device_name: None,
            user_agent: None,
            ip_address: None,
            location: None,
            created_at: now - Duration::minutes(5),
            last_used_at: None,
            expires_at: now + Duration::days(7),
            revoked: false,
            revoked_reason: None,
            revoked_at: None,
        }
    }

    #[test]
    fn hash_token_is_deterministic_sha256_hex() {
        let h1 = RefreshSession::hash_token("abc");
        let h2 = RefreshSession::hash_token("abc");
        let h3 = RefreshSession::hash_token("xyz");
        assert_eq!(h1, h2);
        assert_ne!(h1, h3);
        assert_eq!(h1.len(), 64);
        assert!(h1.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn usable_session_is_neither_revoked_nor_expired() {
        let now = Utc::now();
        let session = sample(now);
        assert!(session.is_usable());
        assert!(!session.is_reuse_within_ttl());
    }

    #[test]
    fn revoked_session_within_ttl_is_reuse_signal() {
        let now = Utc::now();
        let mut session = sample(now);
        session.revoked = true;
        session.revoked_at = Some(now);
        assert!(!session.is_usable());
        assert!(session.is_reuse_within_ttl());
    }

    #[test]
    fn revoked_and_expired_session_is_not_a_reuse_signal() {
        let now = Utc::now();
        let mut session = sample(now);
        session.revoked = true;
        session.expires_at = now - Duration::days(1);
        assert!(!session.is_usable());
        assert!(!session.is_reuse_within_ttl());
    }
}
