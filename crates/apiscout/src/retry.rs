//! Bounded exponential retry.
//!
//! A [`RetryPolicy`] is a hard attempt ceiling combined with a delay schedule.
//! It wraps any fallible async operation and knows nothing about what it wraps.

use std::future::Future;
use std::time::Duration;

/// Retry ceiling plus exponential delay schedule.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Attempts after the first one.
    pub max_retries: u32,
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Growth factor between consecutive delays.
    pub multiplier: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::heal_default()
    }
}

impl RetryPolicy {
    pub fn exponential(initial_delay: Duration, max_retries: u32) -> Self {
        Self {
            max_retries,
            initial_delay,
            multiplier: 2,
        }
    }

    /// Two retries, starting at 500ms and doubling.
    pub fn heal_default() -> Self {
        Self::exponential(Duration::from_millis(500), 2)
    }

    /// Retry immediately, without sleeping. Useful in tests.
    pub fn immediate(max_retries: u32) -> Self {
        Self::exponential(Duration::ZERO, max_retries)
    }

    /// Total attempts, including the first.
    pub fn max_attempts(&self) -> u32 {
        self.max_retries + 1
    }

    /// Delay before retry number `retry` (0-indexed).
    pub fn delay_for_retry(&self, retry: u32) -> Duration {
        let factor = self.multiplier.saturating_pow(retry);
        self.initial_delay.saturating_mul(factor)
    }

    /// Run `op` until it succeeds or the ceiling is hit; returns the last error.
    ///
    /// `op` receives the 0-indexed attempt number.
    pub async fn run<T, E, F, Fut>(&self, op: F) -> Result<T, E>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        self.run_while(op, |_| true).await
    }

    /// Like [`run`](Self::run), but an error for which `retryable` is false
    /// is returned at once.
    pub async fn run_while<T, E, F, Fut, R>(&self, mut op: F, retryable: R) -> Result<T, E>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
        R: Fn(&E) -> bool,
    {
        let mut attempt = 0u32;
        loop {
            match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(e) if attempt < self.max_retries && retryable(&e) => {
                    let delay = self.delay_for_retry(attempt);
                    tracing::debug!(
                        "attempt {} of {} failed: {e}; retrying in {}ms",
                        attempt + 1,
                        self.max_attempts(),
                        delay.as_millis()
                    );
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
