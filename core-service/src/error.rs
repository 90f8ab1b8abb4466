use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Core initialization failed: {0}")]
    InitializationFailed(String),

    #[error("Configuration error: {0}")]
    Config(#[from] core_runtime::Error),

    #[error("Authentication error: {0}")]
    Auth(#[from] core_auth::AuthError),

    #[error(transparent)]
    Task(#[from] core_tasks::TaskError),

    #[error(transparent)]
    Sync(#[from] core_sync::SyncError),

    #[error("Monitor error: {0}")]
    Monitor(#[from] core_monitor::MonitorError),
}

pub type Result<T> = std::result::Result<T, CoreError>;
