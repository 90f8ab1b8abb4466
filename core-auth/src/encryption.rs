//! Credential Cipher
//!
//! AES-256-GCM encryption for upstream passwords stored in the credential
//! table.
//!
//! ## Wire format
//!
//! ```text
//! base64( version: u32 big-endian | nonce: 12 bytes | ciphertext + 16-byte tag )
//! ```
//!
//! The version prefix selects the key. Only the configured version is known
//! to a cipher; anything else fails with [`AuthError::DecryptionFailed`]
//! rather than guessing a fallback.

use crate::error::{AuthError, Result};
use aes_gcm::{
    aead::{Aead, KeyInit, OsRng},
    AeadCore, Aes256Gcm, Key, Nonce,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use core_runtime::config::{EncryptionSettings, ENCRYPTION_KEY_LEN};
use std::fmt;
use tracing::debug;

const VERSION_LEN: usize = 4;
const NONCE_LEN: usize = 12;
/// version + nonce + at least 4 bytes of ciphertext
const MIN_PAYLOAD_LEN: usize = VERSION_LEN + NONCE_LEN + 4;

/// 256-bit key for the credential cipher.
#[derive(Clone)]
pub struct EncryptionKey {
    key_bytes: Vec<u8>,
}

impl EncryptionKey {
    /// Create from existing key bytes.
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self> {
        if bytes.len() != ENCRYPTION_KEY_LEN {
            return Err(AuthError::Config(format!(
                "Invalid key length. Expected {} bytes for AES-256.",
                ENCRYPTION_KEY_LEN
            )));
        }

        Ok(Self { key_bytes: bytes })
    }

    /// Decode a base64 key as found in `GARMIN_ENCRYPTION_KEY`.
    pub fn from_base64(encoded: &str) -> Result<Self> {
        let bytes = STANDARD
            .decode(encoded.trim())
            .map_err(|_| AuthError::Config("Encryption key is not valid base64".to_string()))?;
        Self::from_bytes(bytes)
    }

    /// Generate a new random key, base64 encoded.
    pub fn generate_base64() -> String {
        let key = Aes256Gcm::generate_key(&mut OsRng);
        STANDARD.encode(key)
    }

    fn cipher(&self) -> Aes256Gcm {
        Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&self.key_bytes))
    }
}

impl fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncryptionKey")
            .field("key_bytes", &"[REDACTED]")
            .finish()
    }
}

/// Versioned AES-256-GCM cipher for stored credentials.
#[derive(Clone, Debug)]
pub struct CredentialCipher {
    key: EncryptionKey,
    version: u32,
}

impl CredentialCipher {
    pub fn new(key: EncryptionKey, version: u32) -> Self {
        Self { key, version }
    }

    /// Build from the encryption section of the app config.
    pub fn from_settings(settings: &EncryptionSettings) -> Result<Self> {
        let key = EncryptionKey::from_bytes(settings.key_bytes()?)?;
        Ok(Self::new(key, settings.version))
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    /// Encrypt a password for storage.
    pub fn encrypt(&self, plaintext: &str) -> Result<String> {
        if plaintext.is_empty() {
            return Err(AuthError::EncryptionFailed(
                "Cannot encrypt empty plaintext".to_string(),
            ));
        }

        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = self
            .key
            .cipher()
            .encrypt(&nonce, plaintext.as_bytes())
            .map_err(|_| AuthError::EncryptionFailed("AES-GCM encryption failed".to_string()))?;

        let mut combined = Vec::with_capacity(VERSION_LEN + NONCE_LEN + ciphertext.len());
        combined.extend_from_slice(&self.version.to_be_bytes());
        combined.extend_from_slice(&nonce);
        combined.extend_from_slice(&ciphertext);

        Ok(STANDARD.encode(combined))
    }

    /// Decrypt a stored password.
    pub fn decrypt(&self, encoded: &str) -> Result<String> {
        let (version, plaintext) = self.decrypt_with_version(encoded)?;
        debug!(version, "Decrypted credential payload");
        Ok(plaintext)
    }

    /// Decrypt and also return the version embedded in the payload.
    pub fn decrypt_with_version(&self, encoded: &str) -> Result<(u32, String)> {
        if encoded.is_empty() {
            return Err(AuthError::DecryptionFailed(
                "Cannot decrypt empty ciphertext".to_string(),
            ));
        }

        let combined = STANDARD
            .decode(encoded.trim())
            .map_err(|_| AuthError::DecryptionFailed("Invalid base64 encoding".to_string()))?;

        if combined.len() < MIN_PAYLOAD_LEN {
            return Err(AuthError::DecryptionFailed("Ciphertext too short".to_string()));
        }

        let (version_bytes, rest) = combined.split_at(VERSION_LEN);
        let (nonce_bytes, ciphertext) = rest.split_at(NONCE_LEN);

        let mut prefix = [0u8; VERSION_LEN];
        prefix.copy_from_slice(version_bytes);
        let version = u32::from_be_bytes(prefix);

        if version != self.version {
            return Err(AuthError::DecryptionFailed(format!(
                "Unsupported encryption version {}",
                version
            )));
        }

        let plaintext = self
            .key
            .cipher()
            .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
            .map_err(|_| {
                AuthError::DecryptionFailed(
                    "Invalid authentication tag, data may have been tampered with".to_string(),
                )
            })?;

        let plaintext = String::from_utf8(plaintext)
            .map_err(|_| AuthError::DecryptionFailed("Plaintext is not valid UTF-8".to_string()))?;

        Ok((version, plaintext))
    }
}
