//! Task counters and the bounded metric sample window.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, VecDeque};

/// One observed data point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSample {
    pub name: String,
    pub value: f64,
    pub timestamp: DateTime<Utc>,
    pub tags: BTreeMap<String, String>,
}

impl MetricSample {
    pub fn new(name: impl Into<String>, value: f64, timestamp: DateTime<Utc>) -> Self {
        Self {
            name: name.into(),
            value,
            timestamp,
            tags: BTreeMap::new(),
        }
    }

    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }
}

/// Most recent samples, oldest evicted first.
#[derive(Debug, Clone)]
pub struct MetricWindow {
    samples: VecDeque<MetricSample>,
    capacity: usize,
}

impl MetricWindow {
    pub fn new(capacity: usize) -> Self {
        Self {
            samples: VecDeque::with_capacity(capacity.min(1024)),
            capacity: capacity.max(1),
        }
    }

    pub fn push(&mut self, sample: MetricSample) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(sample);
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &MetricSample> {
        self.samples.iter()
    }

    /// Latest sample recorded under `name`.
    pub fn latest(&self, name: &str) -> Option<&MetricSample> {
        self.samples.iter().rev().find(|s| s.name == name)
    }
}

/// Counters for a single task name.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskTypeStats {
    pub started: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub retried: u64,
}

/// Monotonic task counters for this worker process.
///
/// `total_tasks` counts finished attempts: successes, terminal failures and
/// attempts that ended in a retry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskStats {
    pub total_tasks: u64,
    pub successful_tasks: u64,
    pub failed_tasks: u64,
    pub retried_tasks: u64,
    /// Mean wall time of attempts that reported a duration.
    pub avg_execution_ms: f64,
    pub task_types: HashMap<String, TaskTypeStats>,
    #[serde(skip)]
    timed_attempts: u64,
}

impl TaskStats {
    pub fn record_started(&mut self, task_name: &str) {
        self.entry(task_name).started += 1;
    }

    pub fn record_success(&mut self, task_name: &str, duration_ms: u64) {
        self.total_tasks += 1;
        self.successful_tasks += 1;
        self.entry(task_name).succeeded += 1;
        self.record_duration(duration_ms);
    }

    pub fn record_failure(&mut self, task_name: &str, duration_ms: u64) {
        self.total_tasks += 1;
        self.failed_tasks += 1;
        self.entry(task_name).failed += 1;
        self.record_duration(duration_ms);
    }

    pub fn record_retry(&mut self, task_name: &str) {
        self.total_tasks += 1;
        self.retried_tasks += 1;
        self.entry(task_name).retried += 1;
    }

    /// `failed / total`, or `None` before any attempt finished.
    pub fn error_rate(&self) -> Option<f64> {
        if self.total_tasks == 0 {
            None
        } else {
            Some(self.failed_tasks as f64 / self.total_tasks as f64)
        }
    }

    pub fn success_rate(&self) -> f64 {
        self.successful_tasks as f64 / self.total_tasks.max(1) as f64
    }

    fn entry(&mut self, task_name: &str) -> &mut TaskTypeStats {
        self.task_types.entry(task_name.to_string()).or_default()
    }

    fn record_duration(&mut self, duration_ms: u64) {
        self.timed_attempts += 1;
        let n = self.timed_attempts as f64;
        self.avg_execution_ms += (duration_ms as f64 - self.avg_execution_ms) / n;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_is_bounded() {
        let mut window = MetricWindow::new(2);
        for value in [1.0, 2.0, 3.0] {
            window.push(MetricSample::new("queue_depth", value, Utc::now()));
        }

        assert_eq!(window.len(), 2);
        assert_eq!(window.iter().next().unwrap().value, 2.0);
        assert_eq!(window.latest("queue_depth").unwrap().value, 3.0);
        assert!(window.latest("error_rate").is_none());
    }

    #[test]
    fn test_stats_counters() {
        let mut stats = TaskStats::default();
        stats.record_started("a");
        stats.record_success("a", 100);
        stats.record_retry("b");
        stats.record_failure("b", 300);

        assert_eq!(stats.total_tasks, 3);
        assert_eq!(stats.successful_tasks, 1);
        assert_eq!(stats.failed_tasks, 1);
        assert_eq!(stats.retried_tasks, 1);
        assert_eq!(stats.avg_execution_ms, 200.0);
        assert_eq!(stats.task_types["a"].started, 1);
        assert_eq!(stats.task_types["b"].retried, 1);
        assert_eq!(stats.task_types["b"].failed, 1);
    }

    #[test]
    fn test_rates() {
        let mut stats = TaskStats::default();
        assert_eq!(stats.error_rate(), None);
        assert_eq!(stats.success_rate(), 0.0);

        stats.record_success("a", 10);
        stats.record_failure("a", 10);
        assert_eq!(stats.error_rate(), Some(0.5));
        assert_eq!(stats.success_rate(), 0.5);
    }
}
