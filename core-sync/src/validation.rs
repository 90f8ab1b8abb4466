//! `processing.validate_processed_data`: confirm an activity landed in storage.

use async_trait::async_trait;
use bridge_traits::storage::{ActivityStorage, DocumentKind};
use chrono::{DateTime, Utc};
use core_tasks::{Result, Runnable, TaskContext};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::info;

pub const VALIDATION_TASK_NAME: &str = "processing.validate_processed_data";

const COUNT_LIMIT: usize = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationStatus {
    Valid,
    PartiallyValid,
    Invalid,
}

impl ValidationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValidationStatus::Valid => "valid",
            ValidationStatus::PartiallyValid => "partially_valid",
            ValidationStatus::Invalid => "invalid",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationInput {
    pub item_id: String,
    pub user_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub item_id: String,
    pub user_id: String,
    pub data_types_found: Vec<DocumentKind>,
    pub record_counts: BTreeMap<String, usize>,
    pub validation_errors: Vec<String>,
    pub status: ValidationStatus,
    pub validated_at: DateTime<Utc>,
}

pub struct ValidateProcessedDataTask {
    storage: Arc<dyn ActivityStorage>,
}

impl ValidateProcessedDataTask {
    pub fn new(storage: Arc<dyn ActivityStorage>) -> Self {
        Self { storage }
    }
}

#[async_trait]
impl Runnable for ValidateProcessedDataTask {
    type Input = ValidationInput;
    type Output = ValidationReport;

    fn name(&self) -> &str {
        VALIDATION_TASK_NAME
    }

    async fn setup(&self, _ctx: &TaskContext) -> Result<()> {
        self.storage.initialize().await?;
        Ok(())
    }

    async fn execute(&self, ctx: &TaskContext, input: ValidationInput) -> Result<ValidationReport> {
        ctx.update_progress(0, 100, "initializing");

        let checks = [
            (DocumentKind::Session, "Session", "session", 25, "checking_sessions"),
            (DocumentKind::Record, "Record", "record", 50, "checking_records"),
            (DocumentKind::Lap, "Lap", "lap", 75, "checking_laps"),
        ];

        let mut found = Vec::new();
        let mut counts = BTreeMap::new();
        let mut errors = Vec::new();

        for (kind, label, noun, progress, stage) in checks {
            ctx.update_progress(progress, 100, stage);

            match self
                .storage
                .count_documents(kind, &input.user_id, &input.item_id, COUNT_LIMIT)
                .await
            {
                Ok(0) => errors.push(format!("No {} data found", noun)),
                Ok(count) => {
                    found.push(kind);
                    counts.insert(kind.as_str().to_string(), count);
                }
                Err(e) => errors.push(format!("{} validation error: {}", label, e)),
            }
        }

        let status = if errors.is_empty() {
            ValidationStatus::Valid
        } else if !found.is_empty() {
            ValidationStatus::PartiallyValid
        } else {
            ValidationStatus::Invalid
        };

        ctx.update_progress(100, 100, "completed");
        info!(
            item_id = %input.item_id,
            status = status.as_str(),
            "Validated processed data"
        );

        Ok(ValidationReport {
            item_id: input.item_id,
            user_id: input.user_id,
            data_types_found: found,
            record_counts: counts,
            validation_errors: errors,
            status,
            validated_at: Utc::now(),
        })
    }
}
