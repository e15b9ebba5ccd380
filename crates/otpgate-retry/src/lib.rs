//! Bounded exponential-backoff retry for otpgate.
//!
//! [`with_retry`] runs an async operation and, when it fails with an error
//! that reports itself as transient through [`Retryable`], waits and runs it
//! again. The wait doubles on every attempt:
//!
//! ```text
//! attempt 0 ──fail──▶ sleep(base) ──▶ attempt 1 ──fail──▶ sleep(2·base) ──▶ ...
//! ```
//!
//! The engine never looks inside the error. Whether something is worth
//! retrying is decided once, by whoever produced the error, and exposed
//! through the trait. Validation and business failures simply answer
//! `false` and are returned on the first attempt.

use std::future::Future;
use std::time::Duration;

use tracing::{debug, warn};

// ---------------------------------------------------------------------------
// Retryable
// ---------------------------------------------------------------------------

/// Tells the retry engine whether a failure is transient.
///
/// Implemented by the protocol layer's `Failure` type, which answers `true`
/// only for technical failures (network, timeout, 5xx, service errors).
pub trait Retryable {
    /// Returns `true` if running the operation again might succeed.
    fn is_retryable(&self) -> bool;
}

// ---------------------------------------------------------------------------
// RetryPolicy
// ---------------------------------------------------------------------------

/// How many times to retry, and how long to wait between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt. `3` means up to 4 attempts total.
    pub max_retries: u32,
    /// Delay before the first retry. Doubles for each later retry.
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(1_000),
        }
    }
}

impl RetryPolicy {
    /// Upper bound on `max_retries`. Past this the backoff is measured in hours.
    pub const MAX_RETRIES: u32 = 10;

    /// A policy that never retries.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Clamps out-of-range values so the policy is safe to use.
    pub fn validated(mut self) -> Self {
        if self.max_retries > Self::MAX_RETRIES {
            warn!(
                max_retries = self.max_retries,
                cap = Self::MAX_RETRIES,
                "max_retries exceeds cap, clamping"
            );
            self.max_retries = Self::MAX_RETRIES;
        }
        self
    }

    /// Backoff before retry number `attempt + 1`, i.e. `base_delay × 2^attempt`.
    ///
    /// Saturates instead of overflowing.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor)
    }
}

// ---------------------------------------------------------------------------
// with_retry
// ---------------------------------------------------------------------------

/// Runs `operation`, retrying retryable failures with exponential backoff.
///
/// `on_retry` is called right before each backoff sleep with the 1-based
/// retry number and the failure that caused it. It is for observability
/// only; it cannot change what happens next.
///
/// Returns the first success, or the last failure unchanged once retries
/// are exhausted or a non-retryable failure is seen.
pub async fn with_retry<T, E, F, Fut, R>(
    policy: &RetryPolicy,
    mut operation: F,
    mut on_retry: R,
) -> Result<T, E>
where
    E: Retryable,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    R: FnMut(u32, &E),
{
    let mut attempt = 0u32;
    loop {
        let err = match operation().await {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };

        if !err.is_retryable() {
            debug!(attempt, "failure is not retryable, giving up");
            return Err(err);
        }
        if attempt >= policy.max_retries {
            warn!(
                attempts = attempt + 1,
                "retries exhausted, returning last failure"
            );
            return Err(err);
        }

        let delay = policy.delay_for(attempt);
        attempt += 1;
        on_retry(attempt, &err);
        debug!(
            retry = attempt,
            delay_ms = delay.as_millis() as u64,
            "transient failure, backing off"
        );
        tokio::time::sleep(delay).await;
    }
}
