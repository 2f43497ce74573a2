// Audit log writer and chain-integrity verifier (§4.6). Every entry is
// HMAC-signed and links to the prior entry's signature, so tampering with a
// historical row is detectable by recomputing the chain from the start.

use diesel_async::AsyncPgConnection;
use hmac::{Hmac, Mac};
use serde::Serialize;
use serde_json::Value as Json;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use thiserror::Error;
use uuid::Uuid;

use crate::models::audit_log::{AuditError, AuditLogEntry, AuditResult, NewAuditLogEntry};

type HmacSha256 = Hmac<Sha256>;

#[derive(Error, Debug)]
pub enum AuditServiceError {
    #[error(transparent)]
    Audit(#[from] AuditError),

    #[error("invalid audit HMAC key")]
    InvalidKey,
}

/// Exactly the fields covered by the HMAC signature, in this fixed order -
/// `serde_json` preserves struct field order on serialization, so this is
/// the canonical form both the writer and the verifier compute over.
#[derive(Serialize)]
struct CanonicalEntry<'a> {
    timestamp: String,
    event_type: &'a str,
    user_id: Option<Uuid>,
    action: &'a str,
    resource: &'a str,
    result: &'a str,
}

pub struct AuditWriter {
    hmac_key: Vec<u8>,
}

impl AuditWriter {
    pub fn new(hmac_key: &str) -> Self {
        Self {
            hmac_key: hmac_key.as_bytes().to_vec(),
        }
    }

    pub fn from_config() -> Self {
        Self::new(&crate::CONFIG.audit_hmac_key)
    }

    fn sign(&self, timestamp_iso: &str, event_type: &str, user_id: Option<Uuid>, action: &str, resource: &str, result: &str) -> Result<String, AuditServiceError> {
        let canonical = CanonicalEntry {
            timestamp: timestamp_iso.to_string(),
            event_type,
            user_id,
            action,
            resource,
            result,
        };
        let payload = serde_json::to_vec(&canonical).expect("canonical entry serializes");

        let mut mac = HmacSha256::new_from_slice(&self.hmac_key).map_err(|_| AuditServiceError::InvalidKey)?;
        mac.update(&payload);
        Ok(hex::encode(mac.finalize().into_bytes()))
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn record(
        &self,
        conn: &mut AsyncPgConnection,
        event_type: &str,
        user_id: Option<Uuid>,
        action: &str,
        resource: &str,
        resource_id: Option<String>,
        changes: Option<Json>,
        metadata: Json,
        result: AuditResult,
        error_message: Option<String>,
        risk_score: Option<i32>,
    ) -> Result<AuditLogEntry, AuditServiceError> {
        let latest = AuditLogEntry::latest(conn).await?;
        let previous_hash = latest.map(|entry| {
            let mut hasher = Sha256::new();
            hasher.update(entry.signature.as_bytes());
            hasher.update(entry.timestamp_iso8601().as_bytes());
            format!("{:x}", hasher.finalize())
        });

        let now = chrono::Utc::now();
        let now_iso = now.to_rfc3339_opts(chrono::SecondsFormat::Micros, true);
        let signature = self.sign(&now_iso, event_type, user_id, action, resource, result.as_str())?;

        let entry = NewAuditLogEntry {
            timestamp: now,
            event_type: event_type.to_string(),
            user_id,
            action: action.to_string(),
            resource: resource.to_string(),
            resource_id,
            changes,
            metadata,
            result: result.as_str().to_string(),
            error_message,
            risk_score,
            signature,
            previous_hash,
        };

        Ok(AuditLogEntry::insert(conn, entry).await?)
    }

    /// Recompute `entry`'s signature and compare it in constant time against
    /// the stored value.
    pub fn verify_signature(&self, entry: &AuditLogEntry) -> Result<bool, AuditServiceError> {
        let expected = self.sign(
            &entry.timestamp_iso8601(),
            &entry.event_type,
            entry.user_id,
            &entry.action,
            &entry.resource,
            &entry.result,
        )?;

        Ok(expected.as_bytes().ct_eq(entry.signature.as_bytes()).into())
    }

    /// Walk forward from the earliest entry, recomputing `previousHash` at
    /// each step; returns the index of the first broken link, if any.
    pub async fn verify_chain(
        &self,
        conn: &mut AsyncPgConnection,
        limit: i64,
    ) -> Result<Option<usize>, AuditServiceError> {
        let entries = AuditLogEntry::list_for_chain_check(conn, limit).await?;

        let mut previous: Option<&AuditLogEntry> = None;
        for (idx, entry) in entries.iter().enumerate() {
            if !self.verify_signature(entry)? {
                return Ok(Some(idx));
            }

            let expected_previous_hash = previous.map(|prev| {
                let mut hasher = Sha256::new();
                hasher.update(prev.signature.as_bytes());
                hasher.update(prev.timestamp_iso8601().as_bytes());
                format!("{:x}", hasher.finalize())
            });

            if entry.previous_hash != expected_previous_hash {
                return Ok(Some(idx));
            }

            previous = Some(entry);
        }

        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_is_deterministic_for_same_inputs() {
        let writer = AuditWriter::new("test-hmac-key-at-least-32-bytes!!");
        let s1 = writer.sign("2024-01-01T00:00:00.000000Z", "auth.login", None, "login", "user", "success").unwrap();
        let s2 = writer.sign("2024-01-01T00:00:00.000000Z", "auth.login", None, "login", "user", "success").unwrap();
        assert_eq!(s1, s2);
        assert_eq!(s1.len(), 64);
    }

    #[test]
    fn signature_changes_with_result() {
        let writer = AuditWriter::new("test-hmac-key-at-least-32-bytes!!");
        let s1 = writer.sign("2024-01-01T00:00:00.000000Z", "auth.login", None, "login", "user", "success").unwrap();
        let s2 = writer.sign("2024-01-01T00:00:00.000000Z", "auth.login", None, "login", "user", "failure").unwrap();
        assert_ne!(s1, s2);
    }
}
