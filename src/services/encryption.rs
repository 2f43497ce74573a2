// AES-256-GCM field encryption (§10.2 ambient stack), used to store the 2FA
// TOTP secret at rest. Key comes from `ENCRYPTION_KEY`, validated at startup
// to be at least 32 bytes and distinct from the audit HMAC key.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use rand::RngCore;
use thiserror::Error;

const NONCE_LEN: usize = 12;

#[derive(Error, Debug)]
pub enum EncryptionError {
    #[error("encryption key must be at least 32 bytes")]
    InvalidKeyLength,

    #[error("ciphertext is too short to contain a nonce")]
    CiphertextTooShort,

    #[error("AEAD operation failed")]
    Aead,
}

pub struct FieldCipher {
    cipher: Aes256Gcm,
}

impl FieldCipher {
    pub fn new(key_material: &str) -> Result<Self, EncryptionError> {
        let bytes = key_material.as_bytes();
        if bytes.len() < 32 {
            return Err(EncryptionError::InvalidKeyLength);
        }

        let key = Key::<Aes256Gcm>::from_slice(&bytes[..32]);
        Ok(Self {
            cipher: Aes256Gcm::new(key),
        })
    }

    pub fn from_config() -> Result<Self, EncryptionError> {
        Self::new(&crate::CONFIG.encryption_key)
    }

    /// Encrypts `plaintext`, returning `nonce || ciphertext` as raw bytes
    /// suitable for a `bytea` column.
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, EncryptionError> {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(nonce, plaintext)
            .map_err(|_| EncryptionError::Aead)?;

        let mut out = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        out.extend_from_slice(&nonce_bytes);
        out.extend_from_slice(&ciphertext);
        Ok(out)
    }

    pub fn decrypt(&self, stored: &[u8]) -> Result<Vec<u8>, EncryptionError> {
        if stored.len() < NONCE_LEN {
            return Err(EncryptionError::CiphertextTooShort);
        }

        let (nonce_bytes, ciphertext) = stored.split_at(NONCE_LEN);
        let nonce = Nonce::from_slice(nonce_bytes);

        self.cipher
            .decrypt(nonce, ciphertext)
            .map_err(|_| EncryptionError::Aead)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_plaintext() {
        let cipher = FieldCipher::new("01234567890123456789012345678901").unwrap();
        let plaintext = b"JBSWY3DPEHPK3PXP";
        let encrypted = cipher.encrypt(plaintext).unwrap();
        let decrypted = cipher.decrypt(&encrypted).unwrap();
        assert_eq!(decrypted, plaintext);
    }

    #[test]
    fn distinct_ciphertexts_for_same_plaintext() {
        let cipher = FieldCipher::new("01234567890123456789012345678901").unwrap();
        let a = cipher.encrypt(b"secret").unwrap();
        let b = cipher.encrypt(b"secret").unwrap();
        assert_ne!(a, b, "random nonce should make ciphertexts differ");
    }

    #[test]
    fn rejects_short_key() {
        assert!(FieldCipher::new("too-short").is_err());
    }
}
