use crate::config::WorkerConfig;
use std::time::Duration;

/// Exponential retry delay for reopening a failed source.
///
/// There is no retry limit: a camera that is configured active keeps being
/// retried until it is deactivated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl From<&WorkerConfig> for BackoffPolicy {
    fn from(config: &WorkerConfig) -> Self {
        Self {
            base_delay: config.backoff_base(),
            max_delay: config.backoff_max(),
        }
    }
}

impl BackoffPolicy {
    pub fn new(base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            base_delay,
            max_delay,
        }
    }

    /// Delay before attempt `retry_count + 1`; `retry_count` starts at 1 for
    /// the first failure
    pub fn delay(&self, retry_count: u32) -> Duration {
        let exponent = retry_count.saturating_sub(1).min(31);
        let delay_ms = (self.base_delay.as_millis() as u64).saturating_mul(2_u64.pow(exponent));
        let delay = Duration::from_millis(delay_ms);

        if delay > self.max_delay {
            self.max_delay
        } else {
            delay
        }
    }
}
