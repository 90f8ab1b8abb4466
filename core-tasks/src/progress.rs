//! Structured progress reports.

use serde::{Deserialize, Serialize};

/// One progress observation of a running task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskProgress {
    pub current: u64,
    pub total: u64,
    /// `floor(current / total * 100)`, 0 when `total` is 0, capped at 100.
    pub percentage: u8,
    pub message: String,
}

impl TaskProgress {
    pub fn compute(current: u64, total: u64, message: impl Into<String>) -> Self {
        let percentage = if total > 0 {
            (current.saturating_mul(100) / total).min(100) as u8
        } else {
            0
        };

        Self {
            current,
            total,
            percentage,
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_half_way() {
        let progress = TaskProgress::compute(50, 100, "Processing");
        assert_eq!(progress.percentage, 50);
        assert_eq!(progress.message, "Processing");
    }

    #[test]
    fn test_zero_total() {
        assert_eq!(TaskProgress::compute(0, 0, "").percentage, 0);
        assert_eq!(TaskProgress::compute(7, 0, "").percentage, 0);
    }

    #[test]
    fn test_floors() {
        assert_eq!(TaskProgress::compute(1, 3, "").percentage, 33);
        assert_eq!(TaskProgress::compute(2, 3, "").percentage, 66);
    }

    #[test]
    fn test_overshoot_capped() {
        assert_eq!(TaskProgress::compute(5, 4, "").percentage, 100);
    }
}
