//! Caller-side retry policy.
//!
//! [`crate::GatewayCore`] never retries on its own: an upload is only safe to
//! repeat if the caller can replay the body. Callers that can opt in wrap an
//! operation with [`RetryPolicy::run`], which retries errors reported as
//! retryable by [`GatewayError::is_retryable`] with exponential backoff.
//!
//! ```ignore
//! let policy = RetryPolicy::default();
//! policy.run(|| core.delete("report.pdf")).await?;
//! ```

use std::future::Future;
use std::time::Duration;

use tracing::warn;
use typed_builder::TypedBuilder;

use crate::error::GatewayError;

/// Exponential backoff retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, TypedBuilder)]
pub struct RetryPolicy {
    /// Total attempts, including the first. `1` disables retries.
    #[builder(default = 3)]
    pub max_attempts: u32,
    /// Delay before the first retry; doubled for each subsequent one.
    #[builder(default = Duration::from_millis(200))]
    pub base_delay: Duration,
    /// Upper bound on any single delay.
    #[builder(default = Duration::from_secs(5))]
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    /// A policy that makes exactly one attempt.
    #[must_use]
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Delay before retry number `retry` (1-based).
    #[must_use]
    pub fn backoff(&self, retry: u32) -> Duration {
        let factor = 1_u32.checked_shl(retry.saturating_sub(1)).unwrap_or(u32::MAX);
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    /// Run `op` until it succeeds, fails with a non-retryable error, or the
    /// attempts are used up. Returns the last error in the latter cases.
    pub async fn run<T, F, Fut>(&self, mut op: F) -> Result<T, GatewayError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, GatewayError>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_retryable() && attempt < max_attempts => {
                    let delay = self.backoff(attempt);
                    warn!(
                        attempt,
                        max_attempts,
                        kind = %err.kind(),
                        operation = %err.operation(),
                        ?delay,
                        error = %err,
                        "gateway operation failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}
