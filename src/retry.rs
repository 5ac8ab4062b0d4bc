//! Outer retry layer for transient remote failures.
//!
//! The pollers and the orchestrator surface a failed remote call at once.
//! Callers that want to ride out flaky transport wrap the whole operation
//! here, so backoff policy lives in exactly one place.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::{clog_warn, Error, Result};

/// Default number of attempts, including the first.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    /// Backoff before attempt `attempt + 1`, doubling from the initial value.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }
}

/// Run `op` until it succeeds, fails with a non-transient error, or the
/// attempts run out. The last error is returned unchanged.
pub async fn retry_transient<T, F, Fut>(
    policy: &RetryPolicy,
    cancel: &CancellationToken,
    mut op: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 1;
    loop {
        let err = match op().await {
            Ok(value) => return Ok(value),
            Err(e) => e,
        };

        if !err.is_transient() || attempt >= policy.max_attempts {
            return Err(err);
        }

        let delay = policy.backoff(attempt);
        clog_warn!(
            "[retry] attempt {}/{} failed, retrying in {:?}: {}",
            attempt,
            policy.max_attempts,
            delay,
            err
        );

        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                return Err(Error::Cancelled {
                    what: format!("retry backoff after: {err}"),
                });
            }
            _ = tokio::time::sleep(delay) => {}
        }
        attempt += 1;
    }
}
