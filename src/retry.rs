//! Retry policy with capped exponential backoff

use crate::task::TaskStatus;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Retry policy applied to every task in a run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum attempts per task, including the first
    pub max_attempts: u32,

    /// Delay before the first retry
    pub base_delay: Duration,

    /// Upper bound on any retry delay
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Decide whether the attempt that produced `status` should be retried.
    ///
    /// `attempt` is the zero-based counter of the attempt that just finished.
    /// Success and Cancelled are terminal regardless of remaining budget.
    pub fn should_retry(&self, status: TaskStatus, attempt: u32) -> bool {
        status.is_retryable() && attempt + 1 < self.max_attempts
    }

    /// Delay before re-running a task whose zero-based `attempt` just failed:
    /// `min(base_delay * 2^attempt, max_delay)`, saturating on overflow.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = match 2u32.checked_pow(attempt) {
            Some(f) => f,
            None => return self.max_delay,
        };
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}
