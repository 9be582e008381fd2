use std::time::Duration;

use super::error::TaskError;
use crate::config::types::RetryConfig;

/// Fixed-count, fixed-delay retry around a whole upload task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub delay: Duration,
    pub skip_non_retryable: bool,
}

impl RetryPolicy {
    /// Whether another attempt follows `attempt` (1-based) failing with `err`.
    pub fn should_retry(&self, attempt: u32, err: &TaskError) -> bool {
        if attempt >= self.attempts || matches!(err, TaskError::Interrupted) {
            return false;
        }
        !self.skip_non_retryable || err.is_retryable()
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            attempts: config.attempts.max(1),
            delay: config.delay,
            skip_non_retryable: config.skip_non_retryable,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}
