//! Retry policy: decides whether and when a failed attempt runs again.

use crate::error::{ErrorKind, TaskError};
use core_runtime::config::TaskLimits;
use rand::Rng;
use std::time::Duration;

/// Whether a failed task should run again.
///
/// `retries_so_far` counts retries already performed, not attempts.
/// Non-retryable errors never retry; everything else retries while
/// `retries_so_far < max_retries`.
pub fn should_retry(error: &TaskError, retries_so_far: u32, max_retries: u32) -> bool {
    match error.kind() {
        ErrorKind::NonRetryable => false,
        ErrorKind::Transient | ErrorKind::Other => retries_so_far < max_retries,
    }
}

/// Next action for a failed attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum RetryDecision {
    Retry { delay: Duration, reason: String },
    GiveUp { reason: String },
}

impl RetryDecision {
    pub fn is_retry(&self) -> bool {
        matches!(self, RetryDecision::Retry { .. })
    }
}

/// Exponential backoff: `base_delay * multiplier^retries`, capped at `max_delay`.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub base_delay: Duration,
    pub multiplier: f64,
    pub max_delay: Duration,
    /// Scale each delay by a random factor in `[0.5, 1.0)`.
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(60),
            multiplier: 2.0,
            max_delay: Duration::from_secs(600),
            jitter: true,
        }
    }
}

impl RetryPolicy {
    /// Policy whose base delay is the task category's retry delay.
    pub fn from_limits(limits: &TaskLimits) -> Self {
        Self {
            base_delay: limits.retry_delay(),
            ..Self::default()
        }
    }

    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    pub fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier;
        self
    }

    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// Delay before retry number `retries_so_far + 1`.
    pub fn next_delay(&self, retries_so_far: u32) -> Duration {
        let exponent = retries_so_far.min(i32::MAX as u32) as i32;
        let secs = self.base_delay.as_secs_f64() * self.multiplier.powi(exponent);
        let capped = secs.min(self.max_delay.as_secs_f64()).max(0.0);

        let secs = if self.jitter {
            capped * rand::thread_rng().gen_range(0.5..1.0)
        } else {
            capped
        };
        Duration::from_secs_f64(secs)
    }

    /// Pure decision for a failed attempt.
    pub fn decide(&self, error: &TaskError, retries_so_far: u32, max_retries: u32) -> RetryDecision {
        if error.kind() == ErrorKind::NonRetryable {
            return RetryDecision::GiveUp {
                reason: format!("{} is not retryable: {}", error.name(), error),
            };
        }

        if !should_retry(error, retries_so_far, max_retries) {
            return RetryDecision::GiveUp {
                reason: format!("Max retries reached: {}/{}", retries_so_far, max_retries),
            };
        }

        RetryDecision::Retry {
            delay: self.next_delay(retries_so_far),
            reason: error.to_string(),
        }
    }
}
