//! Retry policy and stage timeouts

use crate::error::{AskError, Result, Stage};
use rand::Rng;
use std::future::Future;
use std::time::Duration;

/// Bounded attempts with exponential backoff and jitter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u8,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u8, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    /// Delay before the attempt following `attempt` (1-based)
    pub fn backoff(&self, attempt: u8) -> Duration {
        let exponent = u32::from(attempt.saturating_sub(1)).min(6);
        let base = self.base_delay.saturating_mul(1 << exponent);
        let jitter_cap = (self.base_delay.as_millis() as u64 / 2).max(1);
        let jitter = rand::thread_rng().gen_range(0..jitter_cap);
        base + Duration::from_millis(jitter)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(2, Duration::from_millis(250))
    }
}

/// Bound a stage future by `after`, reporting a [`AskError::Timeout`] for `stage`
pub async fn with_timeout<T, F>(stage: Stage, after: Duration, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(after, fut).await {
        Ok(result) => result,
        Err(_) => Err(AskError::Timeout { stage, after }),
    }
}
