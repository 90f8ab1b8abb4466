//! Task error taxonomy.
//!
//! Every failure a task can surface maps to exactly one [`ErrorKind`], and
//! [`crate::retry::should_retry`] decides on that kind alone.

use bridge_traits::error::BridgeError;
use core_auth::AuthError;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Retry classification of a [`TaskError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Bad setup or input; retrying cannot help.
    NonRetryable,
    /// Backend or network hiccup; retry with backoff.
    Transient,
    /// Anything else; retried while the budget lasts.
    Other,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::NonRetryable => "non_retryable",
            ErrorKind::Transient => "transient",
            ErrorKind::Other => "other",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TaskError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("No Garmin credentials found for user {user_id}")]
    CredentialsNotFound { user_id: String },

    #[error("Failed to decrypt credentials: {0}")]
    DecryptionFailed(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    /// Run-level failure of the sync workflow. Keeps the cause's kind.
    #[error("{message}")]
    Workflow { message: String, cause: ErrorKind },

    #[error("FIT processing error: {0}")]
    FitProcessing(String),

    /// Any failure of the download task. Keeps the cause's kind.
    #[error("{message}")]
    GarminDownload { message: String, cause: ErrorKind },

    #[error("{0}")]
    Other(String),
}

impl TaskError {
    /// Retry classification.
    pub fn kind(&self) -> ErrorKind {
        match self {
            TaskError::Configuration(_)
            | TaskError::Validation(_)
            | TaskError::CredentialsNotFound { .. }
            | TaskError::DecryptionFailed(_) => ErrorKind::NonRetryable,
            TaskError::Storage(_) | TaskError::Network(_) | TaskError::Timeout(_) => {
                ErrorKind::Transient
            }
            TaskError::Workflow { cause, .. } | TaskError::GarminDownload { cause, .. } => *cause,
            TaskError::FitProcessing(_) | TaskError::Other(_) => ErrorKind::Other,
        }
    }

    /// Variant name as reported in failure events.
    pub fn name(&self) -> &'static str {
        match self {
            TaskError::Configuration(_) => "ConfigurationError",
            TaskError::Validation(_) => "ValidationError",
            TaskError::CredentialsNotFound { .. } => "CredentialsNotFound",
            TaskError::DecryptionFailed(_) => "DecryptionFailed",
            TaskError::Storage(_) => "StorageError",
            TaskError::Network(_) => "NetworkError",
            TaskError::Timeout(_) => "TimeoutError",
            TaskError::Workflow { .. } => "WorkflowError",
            TaskError::FitProcessing(_) => "FitProcessingError",
            TaskError::GarminDownload { .. } => "GarminDownloadError",
            TaskError::Other(_) => "Error",
        }
    }

    /// Wrap a cause as a sync workflow failure.
    pub fn workflow(message: impl Into<String>, cause: &TaskError) -> Self {
        TaskError::Workflow {
            message: message.into(),
            cause: cause.kind(),
        }
    }

    /// Wrap a cause as a download failure: `"Download failed: <cause>"`.
    pub fn download_failed(cause: &TaskError) -> Self {
        TaskError::GarminDownload {
            message: format!("Download failed: {}", cause),
            cause: cause.kind(),
        }
    }
}

impl From<BridgeError> for TaskError {
    fn from(err: BridgeError) -> Self {
        match err {
            BridgeError::Connection(msg) => TaskError::Network(msg),
            BridgeError::Timeout(msg) => TaskError::Timeout(msg),
            BridgeError::AuthenticationRejected(msg) => TaskError::Configuration(format!(
                "Upstream rejected credentials: {}",
                msg
            )),
            BridgeError::NotAvailable(msg) => TaskError::Configuration(msg),
            BridgeError::DatabaseError(msg) => TaskError::Storage(msg),
            other => TaskError::Other(other.to_string()),
        }
    }
}

impl From<AuthError> for TaskError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::InvalidIdentifier(_) => TaskError::Validation(err.to_string()),
            AuthError::CredentialsNotFound { user_id } => {
                TaskError::CredentialsNotFound { user_id }
            }
            AuthError::DecryptionFailed(reason) => TaskError::DecryptionFailed(reason),
            AuthError::Storage(bridge) => bridge.into(),
            AuthError::Config(msg) => TaskError::Configuration(msg),
            AuthError::EncryptionFailed(_) => TaskError::Other(err.to_string()),
        }
    }
}

impl From<core_runtime::Error> for TaskError {
    fn from(err: core_runtime::Error) -> Self {
        TaskError::Configuration(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, TaskError>;
