// User database model: credentials, session-invalidation epoch, 2FA secrets,
// lockout state, trusted devices and login history.

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel_async::{AsyncPgConnection, RunQueryDsl};
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use std::str::FromStr;
use uuid::Uuid;

use crate::schema::users;

/// `role` column values.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Role {
    User,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Admin => "admin",
        }
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Role::User),
            "admin" => Ok(Role::Admin),
            other => Err(format!("invalid role: {other}")),
        }
    }
}

/// `provider` column values.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Provider {
    Local,
    ExternalIdp,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Local => "local",
            Provider::ExternalIdp => "external-idp",
        }
    }
}

impl FromStr for Provider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "local" => Ok(Provider::Local),
            "external-idp" => Ok(Provider::ExternalIdp),
            other => Err(format!("invalid provider: {other}")),
        }
    }
}

/// One entry of a user's trusted-device list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrustedDevice {
    pub device_id: String,
    pub first_seen: DateTime<Utc>,
}

/// One append-only login-history entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginHistoryEntry {
    pub timestamp: DateTime<Utc>,
    pub ip: String,
    pub user_agent: String,
    pub success: bool,
    pub reason: Option<String>,
    pub location: Option<String>,
}

/// User database model - queryable from database.
///
/// `password_hash`, `two_factor_secret_encrypted`, and `two_factor_backup_codes`
/// never leave this process in a serialized response; handlers project a
/// public-facing DTO instead of serializing this struct directly.
#[derive(Debug, Clone, Queryable, Selectable, Identifiable)]
#[diesel(table_name = users)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub password_hash: String,
    pub role: String,
    pub provider: String,
    pub token_version: i32,
    pub is_active: bool,
    pub email_verified: bool,
    pub email_verification_token: Option<String>,
    pub email_verification_expires_at: Option<DateTime<Utc>>,
    pub password_reset_token: Option<String>,
    pub password_reset_expires_at: Option<DateTime<Utc>>,
    pub password_history: Json,
    pub two_factor_enabled: bool,
    pub two_factor_secret_encrypted: Option<Vec<u8>>,
    pub two_factor_backup_codes: Json,
    pub two_factor_temp_token: Option<String>,
    pub two_factor_temp_token_expires_at: Option<DateTime<Utc>>,
    pub failed_login_attempts: i32,
    pub account_locked_until: Option<DateTime<Utc>>,
    pub trusted_devices: Json,
    pub login_history: Json,
    pub full_name: String,
    pub last_password_change: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// New user for insertion. Role is always "user" - mass-assignment of role
/// is rejected at the registration validator, never accepted from the wire.
#[derive(Debug, Insertable)]
#[diesel(table_name = users)]
pub struct NewUser {
    pub email: String,
    pub password_hash: String,
    pub role: String,
    pub provider: String,
    pub email_verified: bool,
    pub email_verification_token: Option<String>,
    pub email_verification_expires_at: Option<DateTime<Utc>>,
    pub full_name: String,
}

/// User update struct. `Option<Option<T>>` fields allow explicitly clearing a
/// nullable column (`Some(None)`) versus leaving it untouched (`None`).
#[derive(Debug, AsChangeset, Default)]
#[diesel(table_name = users)]
pub struct UserUpdate {
    pub password_hash: Option<String>,
    pub token_version: Option<i32>,
    pub is_active: Option<bool>,
    pub email_verified: Option<bool>,
    pub email_verification_token: Option<Option<String>>,
    pub email_verification_expires_at: Option<Option<DateTime<Utc>>>,
    pub password_reset_token: Option<Option<String>>,
    pub password_reset_expires_at: Option<Option<DateTime<Utc>>>,
    pub password_history: Option<Json>,
    pub two_factor_enabled: Option<bool>,
    pub two_factor_secret_encrypted: Option<Option<Vec<u8>>>,
    pub two_factor_backup_codes: Option<Json>,
    pub two_factor_temp_token: Option<Option<String>>,
    pub two_factor_temp_token_expires_at: Option<Option<DateTime<Utc>>>,
    pub failed_login_attempts: Option<i32>,
    pub account_locked_until: Option<Option<DateTime<Utc>>>,
    pub trusted_devices: Option<Json>,
    pub login_history: Option<Json>,
    pub full_name: Option<String>,
    pub last_password_change: Option<Option<DateTime<Utc>>>,
}

/// Errors for user operations
#[derive(thiserror::Error, Debug)]
pub enum UserError {
    #[error("Database error: {0}")]
    Database(#[from] diesel::result::Error),

    #[error("User not found")]
    NotFound,

    #[error("Email already registered")]
    AlreadyExists,

    #[error("Connection pool error")]
    Pool(String),
}

/// Password reuse window: the last N hashes are checked on reset/change.
pub const PASSWORD_HISTORY_LIMIT: usize = 5;

impl User {
    /// Find user by ID
    pub async fn find_by_id(
        conn: &mut AsyncPgConnection,
        user_id: Uuid,
    ) -> Result<Self, UserError> {
        use crate::schema::users::dsl::*;

        users
            .filter(id.eq(user_id))
            .first::<User>(conn)
            .await
            .map_err(|e| match e {
                diesel::result::Error::NotFound => UserError::NotFound,
                _ => UserError::Database(e),
            })
    }

    /// Find user by email (case-insensitive)
    pub async fn find_by_email(
        conn: &mut AsyncPgConnection,
        email_str: &str,
    ) -> Result<Self, UserError> {
        use crate::schema::users::dsl::*;
        use diesel::PgTextExpressionMethods;

        users
            .filter(email.ilike(email_str))
            .first::<User>(conn)
            .await
            .map_err(|e| match e {
                diesel::result::Error::NotFound => UserError::NotFound,
                _ => UserError::Database(e),
            })
    }

    /// Find user by a non-expired email-verification token
    pub async fn find_by_verification_token(
        conn: &mut AsyncPgConnection,
        token: &str,
    ) -> Result<Self, UserError> {
        use crate::schema::users::dsl::*;

        users
            .filter(email_verification_token.eq(token))
            .filter(email_verification_expires_at.gt(Utc::now()))
            .first::<User>(conn)
            .await
            .map_err(|e| match e {
                diesel::result::Error::NotFound => UserError::NotFound,
                _ => UserError::Database(e),
            })
    }

    /// Find user by a non-expired password-reset token
    pub async fn find_by_reset_token(
        conn: &mut AsyncPgConnection,
        token: &str,
    ) -> Result<Self, UserError> {
        use crate::schema::users::dsl::*;

        users
            .filter(password_reset_token.eq(token))
            .filter(password_reset_expires_at.gt(Utc::now()))
            .first::<User>(conn)
            .await
            .map_err(|e| match e {
                diesel::result::Error::NotFound => UserError::NotFound,
                _ => UserError::Database(e),
            })
    }

    /// Find user by a non-expired 2FA temp token (post-password, pre-2FA login step)
    pub async fn find_by_two_factor_temp_token(
        conn: &mut AsyncPgConnection,
        token: &str,
    ) -> Result<Self, UserError> {
        use crate::schema::users::dsl::*;

        users
            .filter(two_factor_temp_token.eq(token))
            .filter(two_factor_temp_token_expires_at.gt(Utc::now()))
            .first::<User>(conn)
            .await
            .map_err(|e| match e {
                diesel::result::Error::NotFound => UserError::NotFound,
                _ => UserError::Database(e),
            })
    }

    /// Create a new user
    pub async fn create(
        conn: &mut AsyncPgConnection,
        new_user: NewUser,
    ) -> Result<Self, UserError> {
        use crate::schema::users::dsl::*;

        diesel::insert_into(users)
            .values(&new_user)
            .get_result::<User>(conn)
            .await
            .map_err(|e| match e {
                diesel::result::Error::DatabaseError(
                    diesel::result::DatabaseErrorKind::UniqueViolation,
                    _,
                ) => UserError::AlreadyExists,
                other => UserError::Database(other),
            })
    }

    /// Update user
    pub async fn update(
        conn: &mut AsyncPgConnection,
        user_id: Uuid,
        update: UserUpdate,
    ) -> Result<Self, UserError> {
        use crate::schema::users::dsl::*;

        diesel::update(users.filter(id.eq(user_id)))
            .set(&update)
            .get_result::<User>(conn)
            .await
            .map_err(|e| match e {
                diesel::result::Error::NotFound => UserError::NotFound,
                _ => UserError::Database(e),
            })
    }

    pub fn role_enum(&self) -> Role {
        Role::from_str(&self.role).unwrap_or_else(|e| {
            tracing::warn!("invalid role '{}' for user {}: {}", self.role, self.id, e);
            Role::User
        })
    }

    pub fn provider_enum(&self) -> Provider {
        Provider::from_str(&self.provider).unwrap_or_else(|e| {
            tracing::warn!(
                "invalid provider '{}' for user {}: {}",
                self.provider,
                self.id,
                e
            );
            Provider::Local
        })
    }

    /// Decode the password_history jsonb column into the list of prior hashes,
    /// most recent first.
    pub fn password_history_hashes(&self) -> Vec<String> {
        serde_json::from_value(self.password_history.clone()).unwrap_or_default()
    }

    /// Decode the two_factor_backup_codes jsonb column into bcrypt hashes.
    pub fn backup_code_hashes(&self) -> Vec<String> {
        serde_json::from_value(self.two_factor_backup_codes.clone()).unwrap_or_default()
    }

    pub fn trusted_device_list(&self) -> Vec<TrustedDevice> {
        serde_json::from_value(self.trusted_devices.clone()).unwrap_or_default()
    }

    pub fn login_history_entries(&self) -> Vec<LoginHistoryEntry> {
        serde_json::from_value(self.login_history.clone()).unwrap_or_default()
    }

    pub fn is_locked(&self) -> bool {
        self.account_locked_until
            .map(|until| until > Utc::now())
            .unwrap_or(false)
    }

    /// Push a new hash onto the front of password history, capped at
    /// PASSWORD_HISTORY_LIMIT entries.
    pub fn with_new_password_history(&self, new_hash: &str) -> Json {
        let mut history = self.password_history_hashes();
        history.insert(0, new_hash.to_string());
        history.truncate(PASSWORD_HISTORY_LIMIT);
        serde_json::to_value(history).expect("history serializes")
    }

    pub fn with_trusted_device_added(&self, device_id: &str) -> Json {
        let mut devices = self.trusted_device_list();
        if !devices.iter().any(|d| d.device_id == device_id) {
            devices.push(TrustedDevice {
                device_id: device_id.to_string(),
                first_seen: Utc::now(),
            });
        }
        serde_json::to_value(devices).expect("devices serialize")
    }

    /// Append-only login history, capped to avoid unbounded row growth.
    pub fn with_login_history_appended(&self, entry: LoginHistoryEntry) -> Json {
        const MAX_HISTORY: usize = 100;
        let mut history = self.login_history_entries();
        history.push(entry);
        if history.len() > MAX_HISTORY {
            let overflow = history.len() - MAX_HISTORY;
            history.drain(0..overflow);
        }
        serde_json::to_value(history).expect("history serializes")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_user() -> User {
        let now = Utc::now();
        User {
            id: Uuid::new_v4(),
            email: "test@example.com".to_string(),
            password_hash: "hash".to_string(),
            role: "user".to_string(),
            provider: "local".to_string(),
            token_version: 0,
            is_active: true,
            email_verified: true,
            email_verification_token: None,
            email_verification_expires_at: None,
            password_reset_token: None,
            password_reset_expires_at: None,
            password_history: serde_json::json!([]),
            two_factor_enabled: false,
            two_factor_secret_encrypted: None,
            two_factor_backup_codes: serde_json::json!([]),
            two_factor_temp_token: None,
            two_factor_temp_token_expires_at: None,
            failed_login_attempts: 0,
            account_locked_until: None,
            trusted_devices: serde_json::json!([]),
            login_history: serde_json::json!([]),
            full_name: "Test User".to_string(),
            last_password_change: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn role_round_trips() {
        assert_eq!(Role::from_str("admin").unwrap(), Role::Admin);
        assert_eq!(Role::User.as_str(), "user");
        assert!(Role::from_str("superuser").is_err());
    }

    #[test]
    fn invalid_role_falls_back_to_user() {
        let mut user = sample_user();
        user.role = "superuser".to_string();
        assert_eq!(user.role_enum(), Role::User);
    }

    #[test]
    fn password_history_caps_at_limit() {
        let mut user = sample_user();
        for i in 0..PASSWORD_HISTORY_LIMIT {
            user.password_history = user.with_new_password_history(&format!("hash-{i}"));
        }
        assert_eq!(user.password_history_hashes().len(), PASSWORD_HISTORY_LIMIT);

        user.password_history = user.with_new_password_history("hash-new");
        let hashes = user.password_history_hashes();
        assert_eq!(hashes.len(), PASSWORD_HISTORY_LIMIT);
        assert_eq!(hashes[0], "hash-new");
    }

    #[test]
    fn trusted_device_added_once() {
        let mut user = sample_user();
        user.trusted_devices = user.with_trusted_device_added("device-a");
        user.trusted_devices = user.with_trusted_device_added("device-a");
        assert_eq!(user.trusted_device_list().len(), 1);
    }

    #[test]
    fn is_locked_reflects_future_timestamp() {
        let mut user = sample_user();
        assert!(!user.is_locked());
        user.account_locked_until = Some(Utc::now() + chrono::Duration::minutes(30));
        assert!(user.is_locked());
        user.account_locked_until = Some(Utc::now() - chrono::Duration::minutes(30));
        assert!(!user.is_locked());
    }
}
