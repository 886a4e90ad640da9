//! Symmetric encryption of marketplace tokens at rest.
//!
//! Uses AES-256-GCM with a random 96-bit nonce per encryption. The stored
//! format is `base64(nonce || ciphertext || auth_tag)`. Callers must treat
//! decrypted values as use-once locals; plaintext tokens are never logged
//! and never persisted.

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use rand::rngs::OsRng;
use rand::RngCore;
use secrecy::{ExposeSecret, SecretString};
use thiserror::Error;

/// Nonce size for AES-GCM (96 bits / 12 bytes).
const NONCE_SIZE: usize = 12;

/// Required key length for AES-256 (32 bytes).
const KEY_SIZE: usize = 32;

/// Errors from encrypting or decrypting credentials.
///
/// Messages never include token material.
#[derive(Debug, Error)]
pub enum CipherError {
    #[error("Encryption key is not configured")]
    KeyMissing,

    #[error("Encryption key must be {KEY_SIZE} bytes, got {0}")]
    InvalidKeyLength(usize),

    #[error("Encryption failed")]
    EncryptFailed,

    #[error("Decryption failed: {0}")]
    DecryptFailed(&'static str),
}

/// AES-256-GCM cipher over credential strings.
pub struct CredentialCipher {
    key: [u8; KEY_SIZE],
}

impl std::fmt::Debug for CredentialCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialCipher")
            .field("key", &"[REDACTED]")
            .finish()
    }
}

impl CredentialCipher {
    /// Creates a cipher from a configured key string.
    ///
    /// # Errors
    ///
    /// Fails when the key is empty or not exactly 32 bytes.
    pub fn new(key: &SecretString) -> Result<Self, CipherError> {
        let raw = key.expose_secret().as_bytes();
        if raw.is_empty() {
            return Err(CipherError::KeyMissing);
        }
        if raw.len() != KEY_SIZE {
            return Err(CipherError::InvalidKeyLength(raw.len()));
        }
        let mut key = [0u8; KEY_SIZE];
        key.copy_from_slice(raw);
        Ok(Self { key })
    }

    /// Encrypts a plaintext token to a base64 string for storage.
    pub fn encrypt(&self, plaintext: &str) -> Result<String, CipherError> {
        let cipher =
            Aes256Gcm::new_from_slice(&self.key).map_err(|_| CipherError::EncryptFailed)?;

        let mut nonce_bytes = [0u8; NONCE_SIZE];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = cipher
            .encrypt(nonce, plaintext.as_bytes())
            .map_err(|_| CipherError::EncryptFailed)?;

        let mut out = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        out.extend_from_slice(&nonce_bytes);
        out.extend_from_slice(&ciphertext);

        Ok(BASE64.encode(&out))
    }

    /// Decrypts a stored base64 string back to the plaintext token.
    pub fn decrypt(&self, encoded: &str) -> Result<String, CipherError> {
        let encrypted = BASE64
            .decode(encoded)
            .map_err(|_| CipherError::DecryptFailed("invalid base64"))?;

        if encrypted.len() < NONCE_SIZE + 1 {
            return Err(CipherError::DecryptFailed("ciphertext too short"));
        }

        let cipher = Aes256Gcm::new_from_slice(&self.key)
            .map_err(|_| CipherError::DecryptFailed("cipher init"))?;

        let nonce = Nonce::from_slice(&encrypted[..NONCE_SIZE]);
        let plaintext = cipher
            .decrypt(nonce, &encrypted[NONCE_SIZE..])
            .map_err(|_| CipherError::DecryptFailed("authentication failed"))?;

        String::from_utf8(plaintext).map_err(|_| CipherError::DecryptFailed("invalid utf-8"))
    }
}

/// Validates the encryption key at process start.
///
/// In production a missing or malformed key is fatal. Outside production the
/// problem is logged and the process continues degraded, so local development
/// does not require a real key.
pub fn validate_key_configuration(
    key: &SecretString,
    is_production: bool,
) -> Result<(), CipherError> {
    match CredentialCipher::new(key) {
        Ok(_) => Ok(()),
        Err(e) if is_production => Err(e),
        Err(e) => {
            tracing::warn!(error = %e, "Credential encryption key invalid; continuing (non-production)");
            Ok(())
        }
    }
}
