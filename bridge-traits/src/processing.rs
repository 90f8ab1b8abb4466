//! File Processors
//!
//! The binary FIT parser and the statistics engine live outside the core.
//! These traits are the boundary: hand a file over, get a report back.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::Result;

/// Outcome reported by a processor run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingStatus {
    Completed,
    PartiallyCompleted,
    Failed,
}

impl ProcessingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessingStatus::Completed => "completed",
            ProcessingStatus::PartiallyCompleted => "partially_completed",
            ProcessingStatus::Failed => "failed",
        }
    }
}

/// Per-file processing report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessingReport {
    pub status: ProcessingStatus,
    pub successful_records: u64,
    pub failed_records: u64,
    pub total_records: u64,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ProcessingReport {
    /// A report with `successful` stored records and nothing else.
    pub fn completed(successful: u64) -> Self {
        Self {
            status: ProcessingStatus::Completed,
            successful_records: successful,
            failed_records: 0,
            total_records: successful,
            errors: Vec::new(),
            warnings: Vec::new(),
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            status: ProcessingStatus::Failed,
            successful_records: 0,
            failed_records: 0,
            total_records: 0,
            errors: vec![error.into()],
            warnings: Vec::new(),
        }
    }
}

/// Parses an activity file and stores sessions, records and laps.
#[async_trait]
pub trait ActivityProcessor: Send + Sync {
    async fn process(
        &self,
        file_path: &Path,
        user_id: &str,
        activity_id: &str,
    ) -> Result<ProcessingReport>;
}

/// Parses a wellness file (sleep, HRV, stress, monitoring) and stores it.
///
/// Returns `true` when the file was stored.
#[async_trait]
pub trait HealthProcessor: Send + Sync {
    async fn process_fit_file(&self, file_path: &Path, user_id: &str) -> Result<bool>;
}
