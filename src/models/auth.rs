// JWT claim shapes for the access and refresh token pair.
//
// Claims are intentionally minimal: the access token carries just enough to
// authorize a request without a database round trip (sub, role, tokenVersion,
// fingerprint, ip), and the refresh token carries just enough to drive
// rotation (sub, family, tokenVersion). Both are RS256-only; see
// `services::jwt` for signing/verification.

use serde::{Deserialize, Serialize};

/// Access token claims (§3, §4.1). `fingerprint` binds the token to the
/// device signature computed at issuance; `ip` is informational and is not
/// itself compared on verification (fingerprint carries IP already).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AccessTokenClaims {
    /// User ID (subject)
    pub sub: String,

    pub email: String,

    pub role: String,

    /// Must equal the user's current `token_version` row value or the token
    /// is rejected (covers password change / explicit session invalidation).
    #[serde(rename = "tokenVersion")]
    pub token_version: i32,

    /// Hex-encoded enhanced device fingerprint computed at sign time.
    pub fingerprint: String,

    pub ip: String,

    /// JWT ID, unique per issued token.
    pub jti: String,

    /// Expires at timestamp (Unix epoch seconds)
    pub exp: u64,
}

impl AccessTokenClaims {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        user_id: String,
        email: String,
        role: String,
        token_version: i32,
        fingerprint: String,
        ip: String,
        jti: String,
        expires_at: u64,
    ) -> Self {
        Self {
            sub: user_id,
            email,
            role,
            token_version,
            fingerprint,
            ip,
            jti,
            exp: expires_at,
        }
    }

    pub fn is_expired(&self) -> bool {
        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);

        self.exp < now
    }
}

/// Refresh token claims (§3, §4.1). Deliberately minimal: the session store
/// is the source of truth for device/revocation state, keyed by the hash of
/// the raw token bytes, not by `jti`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RefreshTokenClaims {
    pub sub: String,

    /// Rotation lineage id - shared by every refresh token descended from the
    /// same login, used for reuse detection and family-wide revocation.
    pub family: String,

    #[serde(rename = "tokenVersion")]
    pub token_version: i32,

    #[serde(rename = "type")]
    pub token_type: String,

    pub exp: u64,
}

impl RefreshTokenClaims {
    pub fn new(user_id: String, family: String, token_version: i32, expires_at: u64) -> Self {
        Self {
            sub: user_id,
            family,
            token_version,
            token_type: "refresh".to_string(),
            exp: expires_at,
        }
    }

    pub fn is_expired(&self) -> bool {
        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);

        self.exp < now
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_access_token_claims_structure() {
        let jti = Uuid::new_v4().to_string();
        let claims = AccessTokenClaims::new(
            "user-123".to_string(),
            "user@example.com".to_string(),
            "user".to_string(),
            0,
            "fingerprint-hex".to_string(),
            "203.0.113.10".to_string(),
            jti.clone(),
            1640998800,
        );

        assert_eq!(claims.sub, "user-123");
        assert_eq!(claims.jti, jti);
        assert_eq!(claims.email, "user@example.com");
        assert_eq!(claims.role, "user");
        assert_eq!(claims.token_version, 0);
        assert_eq!(claims.exp, 1640998800);
    }

    #[test]
    fn test_refresh_token_claims_structure() {
        let claims = RefreshTokenClaims::new(
            "user-456".to_string(),
            "family-abc".to_string(),
            2,
            1641600000,
        );

        assert_eq!(claims.sub, "user-456");
        assert_eq!(claims.family, "family-abc");
        assert_eq!(claims.token_version, 2);
        assert_eq!(claims.token_type, "refresh");
        assert_eq!(claims.exp, 1641600000);
    }

    #[test]
    fn test_access_token_serialization_uses_camel_case_token_version() {
        let claims = AccessTokenClaims::new(
            "user-789".to_string(),
            "test@example.com".to_string(),
            "admin".to_string(),
            3,
            "fp".to_string(),
            "203.0.113.5".to_string(),
            "jti-1".to_string(),
            1640998800,
        );

        let json_value = serde_json::to_value(&claims).expect("should serialize");
        let obj = json_value.as_object().expect("should be object");

        assert_eq!(obj.len(), 8, "AccessTokenClaims should have exactly 8 fields");
        assert!(obj.contains_key("tokenVersion"));
        assert!(!obj.contains_key("token_version"));

        let deserialized: AccessTokenClaims =
            serde_json::from_value(json_value).expect("should deserialize");
        assert_eq!(claims, deserialized);
    }

    #[test]
    fn test_refresh_token_serialization_has_type_field() {
        let claims =
            RefreshTokenClaims::new("user-101".to_string(), "family-1".to_string(), 0, 1641600000);

        let json_value = serde_json::to_value(&claims).expect("should serialize");
        let obj = json_value.as_object().expect("should be object");

        assert_eq!(obj.len(), 5, "RefreshTokenClaims should have exactly 5 fields");
        assert_eq!(obj.get("type").and_then(|v| v.as_str()), Some("refresh"));

        let deserialized: RefreshTokenClaims =
            serde_json::from_value(json_value).expect("should deserialize");
        assert_eq!(claims, deserialized);
    }

    #[test]
    fn test_token_expiry_check() {
        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_secs();

        let expired_claims = AccessTokenClaims::new(
            "user-expired".to_string(),
            "expired@example.com".to_string(),
            "user".to_string(),
            0,
            "fp".to_string(),
            "203.0.113.1".to_string(),
            Uuid::new_v4().to_string(),
            now - 1,
        );
        assert!(expired_claims.is_expired());

        let valid_claims = AccessTokenClaims::new(
            "user-valid".to_string(),
            "valid@example.com".to_string(),
            "user".to_string(),
            0,
            "fp".to_string(),
            "203.0.113.1".to_string(),
            Uuid::new_v4().to_string(),
            now + 3600,
        );
        assert!(!valid_claims.is_expired());
    }
}
