//! # Garmin Download Task
//!
//! `garmin.download_daily_data`: fetch a window of daily data for one user
//! and bind a processing request to every file that arrived.
//!
//! Unlike the sync workflow, this task does not process anything itself.
//! The requests it builds are returned in [`DownloadSummary::requests`] for
//! the caller to run as `processing.*` tasks. Every failure surfaces as
//! `GarminDownloadError("Download failed: <cause>")` and keeps the retry
//! class of its cause.

use crate::dispatcher::{BuildOptions, ProcessingDispatcher, ProcessingRequest};
use async_trait::async_trait;
use bridge_traits::storage::{ActivityStorage, ExistingIdsQuery, FileSystemAccess};
use bridge_traits::upstream::{DownloadEntry, DownloadRequest, DownloadedFile, UpstreamConnector};
use chrono::{DateTime, Duration as ChronoDuration, NaiveDate, NaiveTime, TimeZone, Utc};
use core_auth::{AuthError, CredentialProvider};
use core_runtime::config::{GarminSettings, SyncSettings};
use core_runtime::logging::strip_path;
use core_tasks::{Result, Runnable, TaskContext, TaskError};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};

pub const DOWNLOAD_TASK_NAME: &str = "garmin.download_daily_data";

const DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadInput {
    pub user_id: String,
    /// `YYYY-MM-DD`
    pub start_date: String,
    pub days: u32,
    /// When absent, ids already in storage for the window are excluded.
    pub exclude_ids: Option<HashSet<String>>,
    pub overwrite: bool,
}

impl DownloadInput {
    pub fn new(user_id: impl Into<String>, start_date: impl Into<String>, days: u32) -> Self {
        Self {
            user_id: user_id.into(),
            start_date: start_date.into(),
            days,
            exclude_ids: None,
            overwrite: false,
        }
    }

    pub fn with_exclude_ids(mut self, ids: HashSet<String>) -> Self {
        self.exclude_ids = Some(ids);
        self
    }

    pub fn with_overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadSummary {
    pub user_id: String,
    pub start_date: NaiveDate,
    pub days: u32,
    pub output_dir: PathBuf,
    /// Files received, in stream order.
    pub files: Vec<DownloadedFile>,
    /// Error entries from the stream.
    pub errors: Vec<String>,
    /// Processing work bound to the received files.
    pub requests: Vec<ProcessingRequest>,
    pub excluded_count: usize,
    pub completed_at: DateTime<Utc>,
}

impl DownloadSummary {
    pub fn total_entries(&self) -> usize {
        self.files.len() + self.errors.len()
    }
}

pub struct GarminDownloadTask {
    credentials: Arc<dyn CredentialProvider>,
    storage: Arc<dyn ActivityStorage>,
    connector: Arc<dyn UpstreamConnector>,
    dispatcher: ProcessingDispatcher,
    fs: Arc<dyn FileSystemAccess>,
    garmin: GarminSettings,
    existing_ids_limit: usize,
}

impl GarminDownloadTask {
    pub fn new(
        credentials: Arc<dyn CredentialProvider>,
        storage: Arc<dyn ActivityStorage>,
        connector: Arc<dyn UpstreamConnector>,
        dispatcher: ProcessingDispatcher,
        fs: Arc<dyn FileSystemAccess>,
        garmin: GarminSettings,
    ) -> Self {
        Self {
            credentials,
            storage,
            connector,
            dispatcher,
            fs,
            garmin,
            existing_ids_limit: SyncSettings::default().existing_ids_limit,
        }
    }

    pub fn with_existing_ids_limit(mut self, limit: usize) -> Self {
        self.existing_ids_limit = limit;
        self
    }

    async fn download(&self, ctx: &TaskContext, input: DownloadInput) -> Result<DownloadSummary> {
        let user_id = input.user_id.as_str();
        ctx.update_progress(0, 100, "initializing");
        info!(user_id, start_date = %input.start_date, days = input.days, "Starting Garmin download");

        let credentials = self.credentials.resolve(user_id).await.map_err(|e| {
            error!(user_id, error = %e, "Failed to retrieve credentials");
            credential_error(e)
        })?;

        let start_date = NaiveDate::parse_from_str(input.start_date.trim(), DATE_FORMAT)
            .map_err(|_| {
                TaskError::Validation(format!(
                    "Invalid start_date '{}', expected YYYY-MM-DD",
                    input.start_date
                ))
            })?;

        let exclude_ids = match input.exclude_ids {
            Some(ids) => ids,
            None => {
                let ids = self.existing_ids(user_id, start_date, input.days).await;
                info!(count = ids.len(), "Found existing activities to exclude");
                ids
            }
        };
        let excluded_count = exclude_ids.len();

        let config_dir = self.garmin.user_config_dir(user_id);
        self.fs.create_dir_all(&config_dir).await?;
        let client = self
            .connector
            .connect(user_id, &credentials, &config_dir)
            .await?;
        drop(credentials);

        ctx.update_progress(10, 100, "downloading");

        let output_dir = self.garmin.user_download_dir(user_id);
        self.fs.create_dir_all(&output_dir).await?;

        let request = DownloadRequest {
            output_dir: output_dir.clone(),
            start_date,
            days: input.days,
            overwrite: input.overwrite,
            exclude_ids,
        };

        let mut stream = client.download_daily_data(request).await?;

        let mut files = Vec::new();
        let mut errors = Vec::new();
        let mut requests = Vec::new();
        let mut received: u64 = 0;

        while let Some(entry) = stream.next().await {
            match entry {
                DownloadEntry::Error { message } => {
                    warn!(error = %message, "Activity download error");
                    errors.push(message);
                }
                DownloadEntry::File(file) => {
                    match self
                        .dispatcher
                        .build_request(
                            &file.file_path,
                            user_id,
                            file.item_id.as_deref(),
                            BuildOptions::default(),
                        )
                        .await
                    {
                        Ok(request) => requests.push(request),
                        Err(e) => warn!(
                            file = %strip_path(&file.file_path.to_string_lossy()),
                            item_id = ?file.item_id,
                            error = %e,
                            "Failed to queue processing"
                        ),
                    }
                    files.push(file);
                }
            }

            received += 1;
            ctx.update_progress(
                download_progress(received, input.days),
                100,
                "downloading",
            );
        }

        if let Err(e) = client.close().await {
            warn!(error = %e, "Failed to close Garmin client");
        }

        ctx.update_progress(100, 100, "completed");
        info!(
            user_id,
            files = files.len(),
            errors = errors.len(),
            "Garmin download completed"
        );

        Ok(DownloadSummary {
            user_id: user_id.to_string(),
            start_date,
            days: input.days,
            output_dir,
            files,
            errors,
            requests,
            excluded_count,
            completed_at: Utc::now(),
        })
    }

    /// Ids stored for `start_date .. start_date + days`. Failures yield an empty set.
    async fn existing_ids(&self, user_id: &str, start_date: NaiveDate, days: u32) -> HashSet<String> {
        let start = Utc.from_utc_datetime(&start_date.and_time(NaiveTime::default()));
        let query = ExistingIdsQuery {
            user_id: user_id.to_string(),
            start,
            end: start + ChronoDuration::days(i64::from(days)),
            limit: self.existing_ids_limit,
        };

        let lookup = async {
            self.storage.initialize().await?;
            self.storage.existing_activity_ids(&query).await
        };

        lookup.await.unwrap_or_else(|e| {
            warn!(error = %e, "Failed to query existing activities");
            HashSet::new()
        })
    }
}

/// Store outages stay retryable; anything else about the login is final.
fn credential_error(err: AuthError) -> TaskError {
    let message = format!("Failed to retrieve Garmin credentials: {}", err);
    match TaskError::from(err) {
        TaskError::Network(_) => TaskError::Network(message),
        TaskError::Timeout(_) => TaskError::Timeout(message),
        TaskError::Storage(_) => TaskError::Storage(message),
        _ => TaskError::Configuration(message),
    }
}

/// `min(10 + n / max(days, 1) * 80, 90)`
fn download_progress(received: u64, days: u32) -> u64 {
    let days = u64::from(days.max(1));
    (10 + received * 80 / days).min(90)
}

#[async_trait]
impl Runnable for GarminDownloadTask {
    type Input = DownloadInput;
    type Output = DownloadSummary;

    fn name(&self) -> &str {
        DOWNLOAD_TASK_NAME
    }

    async fn execute(&self, ctx: &TaskContext, input: DownloadInput) -> Result<DownloadSummary> {
        let user_id = input.user_id.clone();
        self.download(ctx, input).await.map_err(|cause| {
            error!(user_id = %user_id, error = %cause, "Garmin download failed");
            TaskError::download_failed(&cause)
        })
    }
}
