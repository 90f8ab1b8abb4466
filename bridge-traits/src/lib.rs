//! # Host Bridge Traits
//!
//! Boundary traits between the ingestion core and everything it does not own.
//!
//! ## Overview
//!
//! The sync engine talks to a credential table, an upstream fitness-data
//! provider, a document store, file processors, the local disk and the
//! worker pool. Each of those is a trait here so that the core can be
//! exercised against in-memory fakes and wired to real backends by the host.
//!
//! ## Traits
//!
//! ### Data Sources
//! - [`CredentialStore`](credentials::CredentialStore) - Encrypted per-user upstream logins
//! - [`UpstreamConnector`](upstream::UpstreamConnector) - Authenticates and yields an [`UpstreamClient`](upstream::UpstreamClient)
//!
//! ### Storage & Processing
//! - [`ActivityStorage`](storage::ActivityStorage) - Already-ingested activity lookups
//! - [`ActivityProcessor`](processing::ActivityProcessor) / [`HealthProcessor`](processing::HealthProcessor) - FIT parsing and persistence
//! - [`FileSystemAccess`](storage::FileSystemAccess) - Existence checks and directory scans
//!
//! ### Runtime
//! - [`WorkerProbe`](workers::WorkerProbe) - Worker reachability and queue depth
//! - [`Clock`](time::Clock) - Time source for deterministic testing
//!
//! ## Error Handling
//!
//! All bridge traits use [`BridgeError`](error::BridgeError). Implementations
//! should map connection drops to `Connection` and deadlines to `Timeout`;
//! the task runtime retries those and nothing else without a budget check.
//!
//! ## Thread Safety
//!
//! All bridge traits require `Send + Sync` so handles can be shared across
//! tasks behind `Arc`.

pub mod credentials;
pub mod error;
pub mod processing;
pub mod storage;
pub mod time;
pub mod upstream;
pub mod workers;

pub use error::BridgeError;

// Re-export commonly used types
pub use credentials::{CredentialRecord, CredentialStore, Credentials};
pub use processing::{ActivityProcessor, HealthProcessor, ProcessingReport, ProcessingStatus};
pub use storage::{
    ActivityStorage, DocumentKind, ExistingIdsQuery, FileMetadata, FileSystemAccess,
};
pub use time::{Clock, LogLevel, SystemClock};
pub use upstream::{
    DownloadEntry, DownloadRequest, DownloadStream, DownloadedFile, UpstreamClient,
    UpstreamConnector,
};
pub use workers::{LocalWorkerProbe, WorkerProbe};
