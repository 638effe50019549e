//! Authenticated encryption of manager API keys at rest.
//!
//! Envelopes are `base64(nonce || ciphertext)` with a random 12-byte nonce per call,
//! sealed with AES-256-GCM.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use base64::Engine;
use thiserror::Error;

pub const KEY_LEN: usize = 32;
const NONCE_LEN: usize = 12;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CredentialError {
    #[error("credential key must be {KEY_LEN} bytes, got {0}")]
    InvalidKeyLength(usize),

    #[error("credential key is not valid base64")]
    InvalidKeyEncoding,

    #[error("credential envelope is not valid base64")]
    InvalidEnvelope,

    #[error("credential envelope is too short")]
    TruncatedEnvelope,

    #[error("encryption failed")]
    EncryptionFailed,

    /// Wrong key or tampered ciphertext.
    #[error("credential could not be decrypted")]
    DecryptionFailed,

    #[error("decrypted credential is not valid UTF-8")]
    InvalidPlaintext,
}

#[derive(Clone)]
pub struct CredentialCipher {
    cipher: Aes256Gcm,
}

impl std::fmt::Debug for CredentialCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialCipher").finish_non_exhaustive()
    }
}

impl CredentialCipher {
    pub fn from_key(key: &[u8]) -> Result<Self, CredentialError> {
        let cipher = Aes256Gcm::new_from_slice(key)
            .map_err(|_| CredentialError::InvalidKeyLength(key.len()))?;
        Ok(Self { cipher })
    }

    pub fn from_base64_key(encoded: &str) -> Result<Self, CredentialError> {
        let key = base64::engine::general_purpose::STANDARD
            .decode(encoded.trim())
            .map_err(|_| CredentialError::InvalidKeyEncoding)?;
        Self::from_key(&key)
    }

    /// Generate a fresh random key, returned base64-encoded alongside the cipher.
    pub fn generate() -> (Self, String) {
        let key: [u8; KEY_LEN] = rand::random();
        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key));
        (
            Self { cipher },
            base64::engine::general_purpose::STANDARD.encode(key),
        )
    }

    pub fn encrypt(&self, plaintext: &str) -> Result<String, CredentialError> {
        let nonce_bytes: [u8; NONCE_LEN] = rand::random();
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(nonce, plaintext.as_bytes())
            .map_err(|_| CredentialError::EncryptionFailed)?;

        let mut combined = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        combined.extend_from_slice(&nonce_bytes);
        combined.extend_from_slice(&ciphertext);
        Ok(base64::engine::general_purpose::STANDARD.encode(&combined))
    }

    pub fn decrypt(&self, envelope: &str) -> Result<String, CredentialError> {
        let combined = base64::engine::general_purpose::STANDARD
            .decode(envelope)
            .map_err(|_| CredentialError::InvalidEnvelope)?;
        if combined.len() <= NONCE_LEN {
            return Err(CredentialError::TruncatedEnvelope);
        }

        let (nonce_bytes, ciphertext) = combined.split_at(NONCE_LEN);
        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
            .map_err(|_| CredentialError::DecryptionFailed)?;
        String::from_utf8(plaintext).map_err(|_| CredentialError::InvalidPlaintext)
    }
}

pub fn encrypt(plaintext: &str, key: &[u8]) -> Result<String, CredentialError> {
    CredentialCipher::from_key(key)?.encrypt(plaintext)
}

pub fn decrypt(envelope: &str, key: &[u8]) -> Result<String, CredentialError> {
    CredentialCipher::from_key(key)?.decrypt(envelope)
}
