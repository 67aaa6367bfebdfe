/*!
 * Bounded retry with a fixed inter-attempt delay
 */

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::MAX_ATTEMPTS_CAP;
use crate::error::{Result, SmbError};
use crate::instrumentation::OperationStats;

pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(500);

/// Re-executes an operation on retryable failures
///
/// `max_attempts` caps total attempts (not retries) and is clamped to
/// `1..=5`. Attempt numbering starts at 1.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    delay: Duration,
    stats: Option<OperationStats>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ATTEMPTS, DEFAULT_RETRY_DELAY)
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.clamp(1, MAX_ATTEMPTS_CAP),
            delay,
            stats: None,
        }
    }

    /// Count attempts and retries into `stats`
    pub fn with_stats(mut self, stats: OperationStats) -> Self {
        self.stats = Some(stats);
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Default retry predicate: only remote protocol failures are retried
    pub fn is_retryable(error: &SmbError) -> bool {
        error.is_protocol()
    }

    /// Run `operation` with the default retry predicate
    pub async fn execute_default<T, F, Fut>(&self, cancel: &CancellationToken, operation: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.execute(cancel, Self::is_retryable, operation).await
    }

    /// Run `operation` until it succeeds, `retry_if` rejects the error, or
    /// the attempt cap is reached
    ///
    /// A first-attempt failure that is not retried comes back unchanged;
    /// after a retry the final error is wrapped in
    /// [`SmbError::RetriesExhausted`] with the attempt count. Cancellation is
    /// never retried, and a cancellation during the delay returns
    /// [`SmbError::Cancelled`] instead of the failure that caused the retry.
    pub async fn execute<T, F, Fut, R>(
        &self,
        cancel: &CancellationToken,
        retry_if: R,
        mut operation: F,
    ) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
        R: Fn(&SmbError) -> bool,
    {
        let mut attempt = 1;
        loop {
            if cancel.is_cancelled() {
                return Err(SmbError::Cancelled);
            }
            if let Some(stats) = &self.stats {
                stats.record_attempt();
            }

            let error = match operation().await {
                Ok(value) => {
                    if attempt > 1 {
                        debug!(attempt, "operation succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(e) => e,
            };

            if error.is_cancelled() {
                return Err(error);
            }

            if attempt >= self.max_attempts || !retry_if(&error) {
                return Err(if attempt == 1 {
                    error
                } else {
                    SmbError::RetriesExhausted {
                        attempts: attempt,
                        last: Box::new(error),
                    }
                });
            }

            warn!(
                attempt,
                max_attempts = self.max_attempts,
                delay_ms = self.delay.as_millis() as u64,
                error = %error,
                "operation failed, retrying"
            );
            if let Some(stats) = &self.stats {
                stats.record_retry(attempt);
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(SmbError::Cancelled),
                _ = tokio::time::sleep(self.delay) => {}
            }
            attempt += 1;
        }
    }
}
