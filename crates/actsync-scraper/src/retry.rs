//! Bounded retry with exponential back-off and jitter.
//!
//! [`retry_with_backoff`] wraps a fallible browser operation and retries it on
//! [`ScraperError::is_transient`] errors (navigation timeouts, missing wait
//! targets, failed page loads). Everything else is returned immediately so
//! the caller can recycle the session or fail the section.
//!
//! The operation receives `&mut C` on every attempt, which lets the closure
//! drive a borrowed browser session without moving it into the future.

use std::time::Duration;

use futures::future::BoxFuture;

use crate::error::ScraperError;

/// Upper bound on a single back-off sleep.
const MAX_DELAY_MS: u64 = 30_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Additional attempts after the first try.
    pub max_retries: u32,
    pub backoff_base_ms: u64,
}

impl RetryPolicy {
    /// No retries; the first error is returned.
    pub const NONE: RetryPolicy = RetryPolicy {
        max_retries: 0,
        backoff_base_ms: 0,
    };

    fn delay_for(self, attempt: u32) -> Duration {
        let computed = self
            .backoff_base_ms
            .saturating_mul(1u64 << (attempt.saturating_sub(1)).min(10));
        let capped = computed.min(MAX_DELAY_MS);
        #[allow(
            clippy::cast_possible_truncation,
            clippy::cast_sign_loss,
            clippy::cast_precision_loss
        )]
        let jittered = (capped as f64 * (rand::random::<f64>() * 0.5 + 0.75)) as u64;
        Duration::from_millis(jittered)
    }
}

/// Runs `operation` with up to `policy.max_retries` additional attempts on
/// transient errors.
///
/// Back-off with `backoff_base_ms = 500`: 500 ms, 1 s, 2 s, ... each ±25 %
/// jitter, capped at 30 s.
///
/// # Errors
///
/// Returns the first non-transient error, or the last transient error once
/// retries are exhausted.
pub async fn retry_with_backoff<C, T, F>(
    policy: RetryPolicy,
    ctx: &mut C,
    mut operation: F,
) -> Result<T, ScraperError>
where
    C: ?Sized + Send,
    F: for<'c> FnMut(&'c mut C) -> BoxFuture<'c, Result<T, ScraperError>>,
{
    let mut attempt = 0u32;
    loop {
        match operation(ctx).await {
            Ok(value) => return Ok(value),
            Err(err) => {
                if !err.is_transient() || attempt >= policy.max_retries {
                    return Err(err);
                }
                attempt += 1;
                let delay = policy.delay_for(attempt);
                tracing::warn!(
                    attempt,
                    max_retries = policy.max_retries,
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    error = %err,
                    "transient browser error, retrying after back-off"
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}
