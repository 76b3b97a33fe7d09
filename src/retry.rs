//! Bounded retry for operations that can lose a write race.

use std::future::Future;
use std::time::Duration;

use tokio::time::sleep;

use crate::error::AppError;

/// Retry policy with linear backoff: the wait before attempt `n + 1` is
/// `base_delay * n`.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    pub base_delay: Duration,
    retryable: fn(&AppError) -> bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::write_conflicts()
    }
}

impl RetryPolicy {
    /// Three attempts, 100ms x attempt, only for transient write conflicts.
    pub fn write_conflicts() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(100),
            retryable: AppError::is_transient,
        }
    }

    #[must_use]
    pub fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    #[must_use]
    pub fn retry_if(mut self, retryable: fn(&AppError) -> bool) -> Self {
        self.retryable = retryable;
        self
    }

    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        self.base_delay * attempt
    }

    pub fn is_retryable(&self, err: &AppError) -> bool {
        (self.retryable)(err)
    }

    /// Runs `operation` until it succeeds, fails with a non-retryable error,
    /// or the attempt budget is spent. The last error is returned.
    pub async fn run<F, Fut, T>(&self, label: &'static str, mut operation: F) -> Result<T, AppError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, AppError>>,
    {
        let mut attempt = 1;
        loop {
            match operation().await {
                Ok(value) => {
                    if attempt > 1 {
                        tracing::info!(operation = label, attempt, "succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(err) if attempt < self.max_attempts && self.is_retryable(&err) => {
                    let delay = self.delay_for_attempt(attempt);
                    tracing::debug!(
                        operation = label,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "retrying after write conflict"
                    );
                    sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => {
                    if self.is_retryable(&err) {
                        tracing::warn!(operation = label, attempt, error = %err, "retries exhausted");
                    }
                    return Err(err);
                }
            }
        }
    }
}
