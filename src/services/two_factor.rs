// TOTP-based two-factor authentication (§4.3, §9). Secrets are encrypted at
// rest with `FieldCipher`; backup codes are stored as bcrypt hashes and
// consumed on use. The plaintext secret and backup codes are returned to
// the caller exactly once, at Enable time, and are never recomputable from
// the stored state afterward.

use rand::RngCore;
use thiserror::Error;
use totp_rs::{Algorithm, Secret, TotpUrlError, TOTP};

use crate::services::encryption::{EncryptionError, FieldCipher};

const BACKUP_CODE_COUNT: usize = 10;
const TOTP_DIGITS: usize = 6;
const TOTP_STEP_SECONDS: u64 = 30;
const TOTP_SKEW: u8 = 1;

#[derive(Error, Debug)]
pub enum TwoFactorError {
    #[error("encryption error: {0}")]
    Encryption(#[from] EncryptionError),

    #[error("invalid TOTP configuration: {0}")]
    TotpConfig(String),

    #[error("bcrypt error: {0}")]
    Bcrypt(#[from] bcrypt::BcryptError),

    #[error("invalid code")]
    InvalidCode,
}

impl From<TotpUrlError> for TwoFactorError {
    fn from(e: TotpUrlError) -> Self {
        TwoFactorError::TotpConfig(e.to_string())
    }
}

pub struct EnrollmentMaterial {
    pub encrypted_secret: Vec<u8>,
    pub provisioning_uri: String,
    pub plaintext_backup_codes: Vec<String>,
    pub backup_code_hashes: Vec<String>,
}

pub struct TwoFactorService {
    cipher: FieldCipher,
}

impl TwoFactorService {
    pub fn new(cipher: FieldCipher) -> Self {
        Self { cipher }
    }

    pub fn from_config() -> Result<Self, TwoFactorError> {
        Ok(Self::new(FieldCipher::from_config()?))
    }

    fn build_totp(secret_bytes: Vec<u8>, account_email: &str) -> Result<TOTP, TwoFactorError> {
        TOTP::new(
            Algorithm::SHA1,
            TOTP_DIGITS,
            TOTP_SKEW,
            TOTP_STEP_SECONDS,
            secret_bytes,
            Some("ShieldGate".to_string()),
            account_email.to_string(),
        )
        .map_err(Into::into)
    }

    /// `Enable`: generate a fresh base32 secret and backup codes. Returns
    /// the plaintext secret/provisioning URI/backup codes for a one-shot
    /// response; the caller commits `encrypted_secret` and
    /// `backup_code_hashes` and discards the plaintext after the response
    /// is sent.
    pub fn enroll(&self, account_email: &str) -> Result<EnrollmentMaterial, TwoFactorError> {
        let secret = Secret::generate_secret();
        let secret_bytes = secret.to_bytes().map_err(|e| TwoFactorError::TotpConfig(format!("{:?}", e)))?;

        let totp = Self::build_totp(secret_bytes.clone(), account_email)?;
        let provisioning_uri = totp.get_url();

        let plaintext_backup_codes = (0..BACKUP_CODE_COUNT).map(|_| generate_backup_code()).collect::<Vec<_>>();
        let backup_code_hashes = plaintext_backup_codes
            .iter()
            .map(|code| bcrypt::hash(code, bcrypt::DEFAULT_COST))
            .collect::<Result<Vec<_>, _>>()?;

        let encrypted_secret = self.cipher.encrypt(&secret_bytes)?;

        Ok(EnrollmentMaterial {
            encrypted_secret,
            provisioning_uri,
            plaintext_backup_codes,
            backup_code_hashes,
        })
    }

    /// Verifies a 6-digit TOTP code against the decrypted secret, with
    /// ±1-step skew.
    pub fn verify_totp(
        &self,
        encrypted_secret: &[u8],
        account_email: &str,
        code: &str,
    ) -> Result<bool, TwoFactorError> {
        let secret_bytes = self.cipher.decrypt(encrypted_secret)?;
        let totp = Self::build_totp(secret_bytes, account_email)?;
        Ok(totp.check_current(code).unwrap_or(false))
    }

    /// Verifies `code` against stored backup-code bcrypt hashes, returning
    /// the index of the matched hash so the caller can remove it (backup
    /// codes are single-use).
    pub fn verify_backup_code(
        &self,
        backup_code_hashes: &[String],
        code: &str,
    ) -> Result<Option<usize>, TwoFactorError> {
        for (idx, hash) in backup_code_hashes.iter().enumerate() {
            if bcrypt::verify(code, hash)? {
                return Ok(Some(idx));
            }
        }
        Ok(None)
    }

    /// `Login2FA` order of operations: TOTP first, then backup code.
    pub fn verify_code(
        &self,
        encrypted_secret: &[u8],
        account_email: &str,
        backup_code_hashes: &[String],
        code: &str,
    ) -> Result<TwoFactorVerification, TwoFactorError> {
        if self.verify_totp(encrypted_secret, account_email, code)? {
            return Ok(TwoFactorVerification::Totp);
        }

        if let Some(idx) = self.verify_backup_code(backup_code_hashes, code)? {
            return Ok(TwoFactorVerification::BackupCode(idx));
        }

        Err(TwoFactorError::InvalidCode)
    }

    pub fn regenerate_backup_codes(&self) -> Result<(Vec<String>, Vec<String>), TwoFactorError> {
        let plaintext = (0..BACKUP_CODE_COUNT).map(|_| generate_backup_code()).collect::<Vec<_>>();
        let hashes = plaintext
            .iter()
            .map(|code| bcrypt::hash(code, bcrypt::DEFAULT_COST))
            .collect::<Result<Vec<_>, _>>()?;
        Ok((plaintext, hashes))
    }
}

pub enum TwoFactorVerification {
    Totp,
    BackupCode(usize),
}

fn generate_backup_code() -> String {
    let mut bytes = [0u8; 5];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> TwoFactorService {
        TwoFactorService::new(FieldCipher::new("01234567890123456789012345678901").unwrap())
    }

    #[test]
    fn enroll_produces_verifiable_secret() {
        let svc = service();
        let material = svc.enroll("user@example.com").unwrap();
        assert_eq!(material.plaintext_backup_codes.len(), BACKUP_CODE_COUNT);
        assert_eq!(material.backup_code_hashes.len(), BACKUP_CODE_COUNT);
        assert!(material.provisioning_uri.starts_with("otpauth://totp/"));
    }

    #[test]
    fn backup_code_matches_and_identifies_index() {
        let svc = service();
        let material = svc.enroll("user@example.com").unwrap();
        let code = &material.plaintext_backup_codes[3];
        let matched = svc.verify_backup_code(&material.backup_code_hashes, code).unwrap();
        assert_eq!(matched, Some(3));
    }

    #[test]
    fn wrong_code_does_not_match_any_backup_hash() {
        let svc = service();
        let material = svc.enroll("user@example.com").unwrap();
        let matched = svc.verify_backup_code(&material.backup_code_hashes, "0000000000").unwrap();
        assert_eq!(matched, None);
    }
}
