use bridge_traits::error::BridgeError;
use core_auth::AuthError;
use core_tasks::{ErrorKind, TaskError};
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    /// Run-level failure; the only error a sync run surfaces.
    #[error("{message}")]
    Workflow { message: String, cause: ErrorKind },

    #[error("FIT file not found: {}", .0.display())]
    FileNotFound(PathBuf),

    #[error("{0}")]
    MissingItemId(String),

    #[error("{0}")]
    FitProcessing(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error(transparent)]
    Bridge(#[from] BridgeError),

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Task(#[from] TaskError),
}

impl SyncError {
    /// Retry classification, consistent with the `TaskError` conversion.
    pub fn kind(&self) -> ErrorKind {
        match self {
            SyncError::Workflow { cause, .. } => *cause,
            SyncError::FileNotFound(_)
            | SyncError::MissingItemId(_)
            | SyncError::InvalidInput(_) => ErrorKind::NonRetryable,
            SyncError::FitProcessing(_) => ErrorKind::Other,
            SyncError::Bridge(err) => bridge_kind(err),
            SyncError::Auth(err) => match err {
                AuthError::Storage(bridge) => bridge_kind(bridge),
                AuthError::EncryptionFailed(_) => ErrorKind::Other,
                _ => ErrorKind::NonRetryable,
            },
            SyncError::Task(err) => err.kind(),
        }
    }

    /// Wrap any failure as `"Garmin sync workflow failed for <user>: <cause>"`.
    pub fn workflow(user_id: &str, cause: &SyncError) -> Self {
        SyncError::Workflow {
            message: format!("Garmin sync workflow failed for {}: {}", user_id, cause),
            cause: cause.kind(),
        }
    }
}

fn bridge_kind(err: &BridgeError) -> ErrorKind {
    match err {
        BridgeError::Connection(_) | BridgeError::Timeout(_) | BridgeError::DatabaseError(_) => {
            ErrorKind::Transient
        }
        BridgeError::AuthenticationRejected(_) | BridgeError::NotAvailable(_) => {
            ErrorKind::NonRetryable
        }
        _ => ErrorKind::Other,
    }
}

impl From<SyncError> for TaskError {
    fn from(err: SyncError) -> Self {
        match err {
            SyncError::Workflow { message, cause } => TaskError::Workflow { message, cause },
            SyncError::FileNotFound(_) | SyncError::MissingItemId(_) | SyncError::InvalidInput(_) => {
                TaskError::Validation(err.to_string())
            }
            SyncError::FitProcessing(msg) => TaskError::FitProcessing(msg),
            SyncError::Bridge(bridge) => bridge.into(),
            SyncError::Auth(auth) => auth.into(),
            SyncError::Task(task) => task,
        }
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;
