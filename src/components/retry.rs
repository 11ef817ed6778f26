// Bounded retry with linear backoff for provider calls

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::serde_time::duration_millis;

/// Retry policy: a hard attempt cap plus a linearly growing delay between
/// attempts (`step`, `2 * step`, `3 * step`, ...)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts including the first one
    pub max_attempts: u32,
    /// Delay after the first failure; each later failure adds another step
    #[serde(with = "duration_millis")]
    pub step: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::linear(3, Duration::from_secs(1))
    }
}

impl RetryPolicy {
    pub fn linear(max_attempts: u32, step: Duration) -> Self {
        Self { max_attempts, step }
    }

    /// Delay to wait after the given failed attempt (1-based), capped at the
    /// delay after the last retryable attempt. Saturates instead of overflowing.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let multiplier = attempt.clamp(1, self.max_attempts.max(1));
        self.step.saturating_mul(multiplier)
    }

    /// Run `attempt_fn` until it succeeds or the attempt cap is reached.
    /// Failures are logged; `None` means every attempt failed.
    pub async fn run<T, E, F, Fut>(&self, operation: &'static str, mut attempt_fn: F) -> Option<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        for attempt in 1..=self.max_attempts {
            match attempt_fn(attempt).await {
                Ok(value) => {
                    if attempt > 1 {
                        tracing::info!(operation, attempt, "Succeeded after retry");
                    }
                    return Some(value);
                },
                Err(error) => {
                    tracing::warn!(
                        operation,
                        attempt,
                        max_attempts = self.max_attempts,
                        error = %error,
                        "Attempt failed"
                    );
                    if attempt < self.max_attempts {
                        tokio::time::sleep(self.delay_after(attempt)).await;
                    }
                },
            }
        }

        tracing::warn!(operation, max_attempts = self.max_attempts, "Retries exhausted");
        None
    }
}
