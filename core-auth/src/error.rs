use bridge_traits::error::BridgeError;
use thiserror::Error;

/// Credential resolution failures.
///
/// Messages never carry ciphertext, plaintext or key material.
#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Invalid user_id format: {0}")]
    InvalidIdentifier(String),

    #[error("No Garmin credentials found for user {user_id}")]
    CredentialsNotFound { user_id: String },

    #[error("Failed to decrypt credentials: {0}")]
    DecryptionFailed(String),

    #[error("Failed to encrypt credentials: {0}")]
    EncryptionFailed(String),

    #[error("Credential store error: {0}")]
    Storage(#[from] BridgeError),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<core_runtime::Error> for AuthError {
    fn from(err: core_runtime::Error) -> Self {
        AuthError::Config(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, AuthError>;
