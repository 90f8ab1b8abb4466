//! Upstream Fitness Data Source
//!
//! The wire protocol of the device vendor is not modelled here. The core
//! sees an authenticated client that streams descriptors of files it wrote
//! to disk, one per downloaded item, with error entries mixed in for items
//! that failed individually.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::credentials::Credentials;
use crate::error::Result;

/// A file the upstream client placed on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadedFile {
    pub file_path: PathBuf,
    /// Upstream activity id; wellness files usually have none.
    pub item_id: Option<String>,
    pub file_size: u64,
    pub retrieved_at: DateTime<Utc>,
}

impl DownloadedFile {
    pub fn new(file_path: impl Into<PathBuf>, item_id: Option<String>) -> Self {
        Self {
            file_path: file_path.into(),
            item_id,
            file_size: 0,
            retrieved_at: Utc::now(),
        }
    }

    pub fn with_size(mut self, file_size: u64) -> Self {
        self.file_size = file_size;
        self
    }
}

/// One element of a download stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum DownloadEntry {
    File(DownloadedFile),
    /// A single item failed; the rest of the stream continues.
    Error { message: String },
}

impl DownloadEntry {
    pub fn is_error(&self) -> bool {
        matches!(self, DownloadEntry::Error { .. })
    }

    pub fn as_file(&self) -> Option<&DownloadedFile> {
        match self {
            DownloadEntry::File(file) => Some(file),
            DownloadEntry::Error { .. } => None,
        }
    }
}

/// Parameters for one daily-data download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadRequest {
    /// Directory chosen by the caller. Clients may nest per-user
    /// subdirectories (`activities/`, `sleep/`, `monitoring/`) below it.
    pub output_dir: PathBuf,
    pub start_date: NaiveDate,
    pub days: u32,
    pub overwrite: bool,
    /// Activity ids that must not be downloaded again.
    pub exclude_ids: HashSet<String>,
}

/// Stream of download descriptors.
pub type DownloadStream = BoxStream<'static, DownloadEntry>;

/// An authenticated session against the upstream provider.
#[async_trait]
pub trait UpstreamClient: Send + Sync {
    /// Download activities, sleep and monitoring data for the window.
    async fn download_daily_data(&self, request: DownloadRequest) -> Result<DownloadStream>;

    /// Release the session. Default is a no-op.
    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// Factory that authenticates and returns a client.
#[async_trait]
pub trait UpstreamConnector: Send + Sync {
    /// Authenticate `user_id` with decrypted credentials.
    ///
    /// `config_dir` is the user's own directory for session tokens; it is
    /// created before the call and never shared between users.
    async fn connect(
        &self,
        user_id: &str,
        credentials: &Credentials,
        config_dir: &Path,
    ) -> Result<Box<dyn UpstreamClient>>;
}
