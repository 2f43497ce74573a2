// Session store (§4.2): thin orchestration over the `RefreshSession` model -
// uniqueness-on-hash creation, validation, revocation, and the
// revoke-before-insert half of the rotation protocol. The remaining half
// (JWT verify, user load, tokenVersion check, minting the new pair) lives in
// the auth orchestrator, which is the only caller that also needs the user
// record and the JWT service together.

use chrono::{DateTime, Utc};
use diesel_async::AsyncPgConnection;
use thiserror::Error;
use uuid::Uuid;

use crate::models::refresh_session::{DeviceInfo, RefreshSession, SessionError};

#[derive(Error, Debug)]
pub enum SessionStoreError {
    #[error(transparent)]
    Session(#[from] SessionError),

    #[error("refresh in progress")]
    RefreshInProgress,

    #[error("token reuse detected, family revoked")]
    ReuseDetected,
}

pub struct SessionStore;

impl SessionStore {
    pub async fn create(
        conn: &mut AsyncPgConnection,
        user_id: Uuid,
        token: &str,
        family: String,
        expires_at: DateTime<Utc>,
        device: DeviceInfo,
    ) -> Result<RefreshSession, SessionStoreError> {
        match RefreshSession::create(conn, user_id, token, family, expires_at, device).await {
            Ok(session) => Ok(session),
            Err(SessionError::RefreshInProgress) => Err(SessionStoreError::RefreshInProgress),
            Err(other) => Err(SessionStoreError::Session(other)),
        }
    }

    pub async fn validate(
        conn: &mut AsyncPgConnection,
        token: &str,
    ) -> Result<RefreshSession, SessionStoreError> {
        let session = RefreshSession::find_by_token(conn, token).await?;

        if session.is_reuse_within_ttl() {
            RefreshSession::revoke_family(conn, &session.family, "token_reuse_detected").await?;
            return Err(SessionStoreError::ReuseDetected);
        }

        if session.revoked {
            return Err(SessionStoreError::Session(SessionError::Revoked));
        }

        if session.expires_at <= Utc::now() {
            return Err(SessionStoreError::Session(SessionError::Expired));
        }

        Ok(session)
    }

    /// Locks and revokes the presented session as the first step of
    /// rotation. Returns the now-revoked session (still carrying its
    /// `family`, for the caller to mint the replacement into) on success, or
    /// `ReuseDetected` if the presented token's hash matched an
    /// already-revoked row still within its original TTL - in which case the
    /// whole family has just been revoked and the caller MUST audit a
    /// `security.suspicious_activity` event.
    pub async fn begin_rotation(
        conn: &mut AsyncPgConnection,
        token: &str,
    ) -> Result<RefreshSession, SessionStoreError> {
        let session = RefreshSession::find_and_lock_by_token(conn, token).await?;

        if session.is_reuse_within_ttl() {
            RefreshSession::revoke_family(conn, &session.family, "token_reuse_detected").await?;
            return Err(SessionStoreError::ReuseDetected);
        }

        if session.revoked {
            return Err(SessionStoreError::Session(SessionError::Revoked));
        }

        if session.expires_at <= Utc::now() {
            return Err(SessionStoreError::Session(SessionError::Expired));
        }

        RefreshSession::revoke_by_id_in_tx(conn, session.id, "rotation").await?;
        Ok(session)
    }

    pub async fn revoke(
        conn: &mut AsyncPgConnection,
        token: &str,
        reason: &str,
    ) -> Result<bool, SessionStoreError> {
        Ok(RefreshSession::revoke(conn, token, reason).await?)
    }

    pub async fn revoke_family(
        conn: &mut AsyncPgConnection,
        family: &str,
        reason: &str,
    ) -> Result<usize, SessionStoreError> {
        Ok(RefreshSession::revoke_family(conn, family, reason).await?)
    }

    pub async fn revoke_all(
        conn: &mut AsyncPgConnection,
        user_id: Uuid,
        reason: &str,
    ) -> Result<usize, SessionStoreError> {
        Ok(RefreshSession::revoke_all(conn, user_id, reason).await?)
    }

    pub async fn revoke_by_id(
        conn: &mut AsyncPgConnection,
        user_id: Uuid,
        session_id: Uuid,
        reason: &str,
    ) -> Result<bool, SessionStoreError> {
        Ok(RefreshSession::revoke_by_id(conn, user_id, session_id, reason).await?)
    }

    pub async fn list_active(
        conn: &mut AsyncPgConnection,
        user_id: Uuid,
    ) -> Result<Vec<RefreshSession>, SessionStoreError> {
        Ok(RefreshSession::list_active(conn, user_id).await?)
    }
}
