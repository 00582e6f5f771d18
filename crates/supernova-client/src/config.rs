//! Retry policy for calls against the control endpoint.

use std::future::Future;
use std::time::Duration;
use supernova_core::{Result, SupernovaError};
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// Exponential backoff policy.
///
/// The default never gives up: a node with no config has nothing better to
/// do than keep asking. Cancellation is the only way out of an unbounded
/// policy.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of attempts; `None` retries forever
    pub max_attempts: Option<u32>,

    /// Delay after the first failure
    pub initial_backoff: Duration,

    /// Upper bound on any single delay
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new()
    }
}

impl RetryPolicy {
    /// 100 ms initial delay, doubling, capped at 5 s, unbounded attempts
    #[must_use]
    pub const fn new() -> Self {
        Self {
            max_attempts: None,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_millis(5000),
        }
    }

    /// Set maximum attempts
    #[must_use]
    pub const fn max_attempts(mut self, max: u32) -> Self {
        self.max_attempts = Some(max);
        self
    }

    /// Set initial backoff duration
    #[must_use]
    pub const fn initial_backoff(mut self, duration: Duration) -> Self {
        self.initial_backoff = duration;
        self
    }

    /// Set maximum backoff duration
    #[must_use]
    pub const fn max_backoff(mut self, duration: Duration) -> Self {
        self.max_backoff = duration;
        self
    }

    /// Delay to wait after the `failures`-th consecutive failure (0-based)
    #[must_use]
    pub fn backoff_for(&self, failures: u32) -> Duration {
        let factor = 2u32.checked_pow(failures).unwrap_or(u32::MAX);
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }

    /// Run `op` until it succeeds, sleeping between failures.
    ///
    /// Returns the last error once `max_attempts` is exhausted, or
    /// [`SupernovaError::Cancelled`] as soon as `cancel` fires, including
    /// while an attempt is in flight.
    pub async fn retry<T, F, Fut>(&self, cancel: &CancellationToken, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut failures: u32 = 0;

        loop {
            let outcome = tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(SupernovaError::Cancelled),
                outcome = op() => outcome,
            };

            let err = match outcome {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };

            let delay = self.backoff_for(failures);
            failures = failures.saturating_add(1);

            if self.max_attempts.is_some_and(|max| failures >= max) {
                return Err(err);
            }

            warn!(
                error = %err,
                attempt = failures,
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                "request failed, retrying"
            );

            tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(SupernovaError::Cancelled),
                () = tokio::time::sleep(delay) => {}
            }
        }
    }
}
