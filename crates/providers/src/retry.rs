//! Retry with exponential backoff for opening a model request.
//!
//! Only retryable faults (rate limits, network errors, timeouts) are
//! retried. Once a stream is open it is never restarted.

use keel_core::error::ProviderError;
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// How many times to retry and how long to wait between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// No waiting between attempts.
    pub fn immediate(max_retries: u32) -> Self {
        Self {
            max_retries,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        }
    }

    /// Delay before retry number `attempt` (0-based).
    ///
    /// A provider-supplied `Retry-After` wins when it is longer.
    pub fn delay_for(&self, attempt: u32, error: &ProviderError) -> Duration {
        let backoff = self
            .base_delay
            .saturating_mul(2u32.saturating_pow(attempt))
            .min(self.max_delay);
        match error {
            ProviderError::RateLimited { retry_after_secs } if !self.base_delay.is_zero() => {
                backoff.max(Duration::from_secs(*retry_after_secs).min(self.max_delay))
            }
            _ => backoff,
        }
    }
}

/// Run `op` until it succeeds, fails with a non-retryable error, or the
/// retries are used up. Cancelling `cancel` aborts the wait.
pub async fn with_retries<T, F, Fut>(
    policy: &RetryPolicy,
    cancel: &CancellationToken,
    mut op: F,
) -> Result<T, ProviderError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ProviderError>>,
{
    let mut attempt = 0;
    loop {
        if cancel.is_cancelled() {
            return Err(ProviderError::Cancelled);
        }

        let error = match op().await {
            Ok(value) => return Ok(value),
            Err(e) => e,
        };

        if !error.is_retryable() || attempt >= policy.max_retries {
            if attempt > 0 {
                warn!(attempts = attempt + 1, error = %error, "Giving up after retries");
            }
            return Err(error);
        }

        let delay = policy.delay_for(attempt, &error);
        info!(
            attempt = attempt + 1,
            max_retries = policy.max_retries,
            delay_ms = delay.as_millis() as u64,
            error = %error,
            "Retrying model request"
        );

        tokio::select! {
            _ = cancel.cancelled() => return Err(ProviderError::Cancelled),
            _ = tokio::time::sleep(delay) => {}
        }
        attempt += 1;
    }
}
