// JWT signing/verification service (§4.1). RS256 only, with separate
// access/refresh key pairs loaded once from PEM files at startup and held
// for the process lifetime.

use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;
use uuid::Uuid;

use crate::models::auth::{AccessTokenClaims, RefreshTokenClaims};

#[derive(Error, Debug)]
pub enum JwtError {
    #[error("failed to read key file {path}: {source}")]
    KeyFileRead {
        path: String,
        source: std::io::Error,
    },

    #[error("invalid key format: {0}")]
    InvalidKeyFormat(String),

    #[error("invalid token")]
    InvalidToken,

    #[error("token expired")]
    TokenExpired,
}

impl From<jsonwebtoken::errors::Error> for JwtError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        use jsonwebtoken::errors::ErrorKind;
        match err.kind() {
            ErrorKind::ExpiredSignature => JwtError::TokenExpired,
            _ => JwtError::InvalidToken,
        }
    }
}

fn read_pem(path: &str) -> Result<Vec<u8>, JwtError> {
    std::fs::read(path).map_err(|source| JwtError::KeyFileRead {
        path: path.to_string(),
        source,
    })
}

pub struct JwtConfig {
    pub access_token_expiry: u64,
    pub refresh_token_expiry: u64,

    access_encoding_key: EncodingKey,
    access_decoding_key: DecodingKey,
    refresh_encoding_key: EncodingKey,
    refresh_decoding_key: DecodingKey,
}

impl std::fmt::Debug for JwtConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtConfig")
            .field("access_token_expiry", &self.access_token_expiry)
            .field("refresh_token_expiry", &self.refresh_token_expiry)
            .field("access_encoding_key", &"<redacted>")
            .field("access_decoding_key", &"<redacted>")
            .field("refresh_encoding_key", &"<redacted>")
            .field("refresh_decoding_key", &"<redacted>")
            .finish()
    }
}

impl JwtConfig {
    pub fn from_env() -> Result<Self, JwtError> {
        let cfg = &crate::CONFIG.jwt;

        let access_private = read_pem(&cfg.access_private_key_path)?;
        let access_public = read_pem(&cfg.access_public_key_path)?;
        let refresh_private = read_pem(&cfg.refresh_private_key_path)?;
        let refresh_public = read_pem(&cfg.refresh_public_key_path)?;

        Ok(Self {
            access_token_expiry: cfg.access_expiry,
            refresh_token_expiry: cfg.refresh_expiry,
            access_encoding_key: EncodingKey::from_rsa_pem(&access_private)
                .map_err(|e| JwtError::InvalidKeyFormat(e.to_string()))?,
            access_decoding_key: DecodingKey::from_rsa_pem(&access_public)
                .map_err(|e| JwtError::InvalidKeyFormat(e.to_string()))?,
            refresh_encoding_key: EncodingKey::from_rsa_pem(&refresh_private)
                .map_err(|e| JwtError::InvalidKeyFormat(e.to_string()))?,
            refresh_decoding_key: DecodingKey::from_rsa_pem(&refresh_public)
                .map_err(|e| JwtError::InvalidKeyFormat(e.to_string()))?,
        })
    }

    /// Deterministic in-memory RSA pair for tests, avoiding filesystem PEM
    /// dependencies in unit tests.
    #[cfg(test)]
    pub fn for_test() -> Self {
        let private_pem = include_bytes!("../../tests/fixtures/test_rsa_private.pem");
        let public_pem = include_bytes!("../../tests/fixtures/test_rsa_public.pem");

        Self {
            access_token_expiry: 900,
            refresh_token_expiry: 604_800,
            access_encoding_key: EncodingKey::from_rsa_pem(private_pem).unwrap(),
            access_decoding_key: DecodingKey::from_rsa_pem(public_pem).unwrap(),
            refresh_encoding_key: EncodingKey::from_rsa_pem(private_pem).unwrap(),
            refresh_decoding_key: DecodingKey::from_rsa_pem(public_pem).unwrap(),
        }
    }
}

pub struct JwtService {
    config: JwtConfig,
}

impl JwtService {
    pub fn new(config: JwtConfig) -> Self {
        Self { config }
    }

    pub fn from_env() -> Result<Self, JwtError> {
        Ok(Self::new(JwtConfig::from_env()?))
    }

    fn now_secs() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0)
    }

    /// `SignAccess(user, fingerprint, ip) -> token`
    #[allow(clippy::too_many_arguments)]
    pub fn sign_access(
        &self,
        user_id: &str,
        email: &str,
        role: &str,
        token_version: i32,
        fingerprint: &str,
        ip: &str,
    ) -> Result<String, JwtError> {
        let now = Self::now_secs();
        let claims = AccessTokenClaims::new(
            user_id.to_string(),
            email.to_string(),
            role.to_string(),
            token_version,
            fingerprint.to_string(),
            ip.to_string(),
            Uuid::new_v4().to_string(),
            now + self.config.access_token_expiry,
        );

        let header = Header::new(Algorithm::RS256);
        encode(&header, &claims, &self.config.access_encoding_key).map_err(Into::into)
    }

    /// `SignRefresh(user, family) -> token`
    pub fn sign_refresh(
        &self,
        user_id: &str,
        family: &str,
        token_version: i32,
    ) -> Result<String, JwtError> {
        let now = Self::now_secs();
        let claims = RefreshTokenClaims::new(
            user_id.to_string(),
            family.to_string(),
            token_version,
            now + self.config.refresh_token_expiry,
        );

        let header = Header::new(Algorithm::RS256);
        encode(&header, &claims, &self.config.refresh_encoding_key).map_err(Into::into)
    }

    /// Structural + algorithm gate shared by access/refresh verification:
    /// exactly three dot-segments, and a header whose `alg` is RS256 -
    /// `none`, HS*, RS384, and ES256 are all rejected here before any
    /// cryptographic work happens.
    fn assert_well_formed_rs256(token: &str) -> Result<(), JwtError> {
        if token.matches('.').count() != 2 {
            return Err(JwtError::InvalidToken);
        }

        let header = jsonwebtoken::decode_header(token).map_err(|_| JwtError::InvalidToken)?;
        if header.alg != Algorithm::RS256 {
            return Err(JwtError::InvalidToken);
        }

        Ok(())
    }

    /// `VerifyAccess(token, expectedFingerprint?) -> payload | error`
    pub fn verify_access(
        &self,
        token: &str,
        expected_fingerprint: Option<&str>,
    ) -> Result<AccessTokenClaims, JwtError> {
        Self::assert_well_formed_rs256(token)?;

        let mut validation = Validation::new(Algorithm::RS256);
        validation.validate_exp = true;
        validation.validate_nbf = false;
        validation.required_spec_claims.clear();

        let data = decode::<AccessTokenClaims>(token, &self.config.access_decoding_key, &validation)?;
        let claims = data.claims;

        if claims.sub.is_empty() || claims.email.is_empty() || claims.role.is_empty() {
            return Err(JwtError::InvalidToken);
        }

        if let Some(expected) = expected_fingerprint {
            if claims.fingerprint != expected {
                return Err(JwtError::InvalidToken);
            }
        }

        Ok(claims)
    }

    /// `VerifyRefresh(token) -> payload | error`
    pub fn verify_refresh(&self, token: &str) -> Result<RefreshTokenClaims, JwtError> {
        Self::assert_well_formed_rs256(token)?;

        let mut validation = Validation::new(Algorithm::RS256);
        validation.validate_exp = true;
        validation.validate_nbf = false;
        validation.required_spec_claims.clear();

        let data = decode::<RefreshTokenClaims>(token, &self.config.refresh_decoding_key, &validation)?;
        let claims = data.claims;

        if claims.token_type != "refresh" || claims.sub.is_empty() || claims.family.is_empty() {
            return Err(JwtError::InvalidToken);
        }

        Ok(claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_access_token() {
        let service = JwtService::new(JwtConfig::for_test());
        let token = service
            .sign_access("user-1", "a@example.com", "user", 0, "fp-hash", "203.0.113.1")
            .unwrap();

        let claims = service.verify_access(&token, Some("fp-hash")).unwrap();
        assert_eq!(claims.sub, "user-1");
        assert_eq!(claims.email, "a@example.com");
    }

    #[test]
    fn rejects_fingerprint_mismatch() {
        let service = JwtService::new(JwtConfig::for_test());
        let token = service
            .sign_access("user-1", "a@example.com", "user", 0, "fp-hash", "203.0.113.1")
            .unwrap();

        let result = service.verify_access(&token, Some("other-fp"));
        assert!(result.is_err());
    }

    #[test]
    fn rejects_alg_none_token() {
        let service = JwtService::new(JwtConfig::for_test());
        let unsigned = format!(
            "{}.{}.",
            base64_url_no_pad(br#"{"alg":"none","typ":"JWT"}"#),
            base64_url_no_pad(br#"{"sub":"attacker","email":"a@x.com","role":"admin","tokenVersion":0,"fingerprint":"f","ip":"1.1.1.1","jti":"x","exp":9999999999}"#),
        );
        assert!(service.verify_access(&unsigned, None).is_err());
    }

    #[test]
    fn rejects_malformed_structure() {
        let service = JwtService::new(JwtConfig::for_test());
        assert!(service.verify_access("not-a-jwt", None).is_err());
    }

    fn base64_url_no_pad(bytes: &[u8]) -> String {
        use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
        URL_SAFE_NO_PAD.encode(bytes)
    }

    #[test]
    fn refresh_round_trips() {
        let service = JwtService::new(JwtConfig::for_test());
        let token = service.sign_refresh("user-1", "family-1", 0).unwrap();
        let claims = service.verify_refresh(&token).unwrap();
        assert_eq!(claims.family, "family-1");
        assert_eq!(claims.token_type, "refresh");
    }
}
