//! Exponential backoff around fallible async operations.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt; the operation runs at most
    /// `max_retries + 1` times.
    pub max_retries: u32,
    pub initial_delay: Duration,
}

impl RetryPolicy {
    pub const fn new(max_retries: u32, initial_delay: Duration) -> Self {
        Self {
            max_retries,
            initial_delay,
        }
    }

    pub const fn none() -> Self {
        Self::new(0, Duration::ZERO)
    }

    /// Delay before the `retry`-th retry (1-based): `initial * 2^(retry-1)`.
    pub fn delay_before_retry(&self, retry: u32) -> Duration {
        let factor = retry
            .checked_sub(1)
            .and_then(|exp| 1u32.checked_shl(exp))
            .unwrap_or(u32::MAX);
        self.initial_delay.saturating_mul(factor)
    }
}

impl Default for RetryPolicy {
    /// Two retries starting at one second, as used for diff responses.
    fn default() -> Self {
        Self::new(2, Duration::from_millis(1_000))
    }
}

/// Run `operation`, retrying on any error with doubling delays. Returns the
/// last error once retries are exhausted.
pub async fn retry_with_backoff<T, E, F, Fut>(policy: RetryPolicy, mut operation: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    let mut retry = 0u32;
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) if retry < policy.max_retries => {
                retry += 1;
                let delay = policy.delay_before_retry(retry);
                tracing::warn!(
                    error = %err,
                    retry,
                    max_retries = policy.max_retries,
                    delay_ms = delay.as_millis() as u64,
                    "Operation failed; backing off before retry"
                );
                tokio::time::sleep(delay).await;
            }
            Err(err) => {
                tracing::debug!(
                    error = %err,
                    attempts = retry + 1,
                    "Operation failed; retries exhausted"
                );
                return Err(err);
            }
        }
    }
}
