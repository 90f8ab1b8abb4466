//! Health snapshot and endpoint payloads.

use crate::alerts::AlertSummary;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Worker pool reachability as of the last health check.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerStatus {
    #[default]
    Unknown,
    Healthy,
    Unhealthy,
}

impl WorkerStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkerStatus::Unknown => "unknown",
            WorkerStatus::Healthy => "healthy",
            WorkerStatus::Unhealthy => "unhealthy",
        }
    }
}

/// Derived system state, refreshed by every health check.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SystemHealth {
    pub worker_status: WorkerStatus,
    pub queue_depth: u64,
    pub error_rate: f64,
    pub last_health_check: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthMetrics {
    pub total_tasks: u64,
    pub success_rate: f64,
    pub error_rate: f64,
    pub queue_depth: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthSnapshot {
    pub status: WorkerStatus,
    pub metrics: HealthMetrics,
    pub last_check: Option<DateTime<Utc>>,
    pub recent_alerts: Vec<AlertSummary>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthState {
    Healthy,
    Unhealthy,
    Error,
}

/// Body returned by the health endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: HealthState,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metrics: Option<HealthMetrics>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alerts: Option<Vec<AlertSummary>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl HealthResponse {
    pub fn healthy(timestamp: DateTime<Utc>, metrics: HealthMetrics) -> Self {
        Self {
            status: HealthState::Healthy,
            timestamp,
            metrics: Some(metrics),
            alerts: None,
            error: None,
        }
    }

    pub fn unhealthy(
        timestamp: DateTime<Utc>,
        metrics: HealthMetrics,
        alerts: Vec<AlertSummary>,
    ) -> Self {
        Self {
            status: HealthState::Unhealthy,
            timestamp,
            metrics: Some(metrics),
            alerts: Some(alerts),
            error: None,
        }
    }

    pub fn error(timestamp: DateTime<Utc>, error: impl Into<String>) -> Self {
        Self {
            status: HealthState::Error,
            timestamp,
            metrics: None,
            alerts: None,
            error: Some(error.into()),
        }
    }
}
