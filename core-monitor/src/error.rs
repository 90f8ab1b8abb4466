use bridge_traits::error::BridgeError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MonitorError {
    #[error("Monitor is already listening for task events")]
    AlreadyRunning,

    /// The event listener exited on its own; counters are no longer current.
    #[error("Task event listener stopped: {0}")]
    ListenerStopped(String),

    #[error("Worker probe failed: {0}")]
    Probe(#[from] BridgeError),

    #[error("Failed to render metrics: {0}")]
    Export(#[from] std::fmt::Error),
}

pub type Result<T> = std::result::Result<T, MonitorError>;
