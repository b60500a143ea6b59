//! Retry with exponential backoff.
//!
//! Store calls that fail with a transient error (store unreachable, timeout,
//! 5xx, local I/O) are retried; every other error is returned immediately.
//! Execution is synchronous, so the delay blocks the calling thread.
//!
//! # Usage
//!
//! ```rust,ignore
//! use segfuse_core::retry::{RetryPolicy, with_retry};
//!
//! let policy = RetryPolicy::default();
//! let exists = with_retry(&policy, || Ok(store.collection_exists("segments")?))?;
//! ```

use std::thread;
use std::time::{Duration, Instant};

use rand::Rng;
use tracing::{debug, warn};

use crate::error::{Error, Result};

/// Exponential backoff settings for store calls.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Delay before the second attempt.
    pub initial_delay: Duration,
    /// Upper bound on any single delay, applied before jitter.
    pub max_delay: Duration,
    pub backoff_factor: f64,
    /// Fraction of the delay added or removed at random, 0.0 to 1.0.
    pub jitter_percent: f64,
    /// Attempts including the first; `None` keeps retrying.
    pub max_attempts: Option<u32>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(Duration::from_millis(100), Duration::from_secs(5), 2.0, 0.1, Some(3))
    }
}

impl RetryPolicy {
    /// Build a policy, forcing `backoff_factor >= 1` and jitter into `0..=1`.
    #[must_use]
    pub fn new(
        initial_delay: Duration,
        max_delay: Duration,
        backoff_factor: f64,
        jitter_percent: f64,
        max_attempts: Option<u32>,
    ) -> Self {
        Self {
            initial_delay,
            max_delay,
            backoff_factor: backoff_factor.max(1.0),
            jitter_percent: jitter_percent.clamp(0.0, 1.0),
            max_attempts,
        }
    }

    /// A single attempt, no retries.
    #[must_use]
    pub fn no_retry() -> Self {
        Self {
            max_attempts: Some(1),
            ..Self::default()
        }
    }

    /// Delay after the failed attempt `attempt` (0-based):
    /// `min(initial * factor^attempt, max)` with jitter applied on top.
    #[must_use]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let ceiling = self.max_delay.as_secs_f64() * 1000.0;
        // powi overflows to infinity long before 31 doublings matter.
        let exponent = i32::try_from(attempt.min(31)).unwrap_or(31);
        let base = (self.initial_delay.as_secs_f64() * 1000.0 * self.backoff_factor.powi(exponent))
            .min(ceiling);

        let spread = base * self.jitter_percent;
        let jitter = if spread > 0.0 {
            rand::rng().random_range(-spread..=spread)
        } else {
            0.0
        };
        Duration::from_millis((base + jitter).max(0.0).round() as u64)
    }

    fn exhausted(&self, attempts: u32) -> bool {
        self.max_attempts.is_some_and(|max| attempts >= max)
    }
}

/// Result of a retried operation with its bookkeeping.
#[derive(Debug)]
pub struct RetryOutcome<T> {
    /// Success value or the last error.
    pub result: Result<T>,
    pub attempts: u32,
    /// Wall time including sleeps.
    pub elapsed: Duration,
}

/// Run `operation` under `policy`, returning only the result.
pub fn with_retry<T, F>(policy: &RetryPolicy, operation: F) -> Result<T>
where
    F: FnMut() -> Result<T>,
{
    with_retry_outcome(policy, operation).result
}

/// Run `operation` under `policy`.
///
/// Stops at the first success, at the first error for which
/// [`is_retryable`] is false, or once `max_attempts` is reached.
pub fn with_retry_outcome<T, F>(policy: &RetryPolicy, mut operation: F) -> RetryOutcome<T>
where
    F: FnMut() -> Result<T>,
{
    let started = Instant::now();
    let mut attempts = 0u32;

    let result = loop {
        attempts += 1;
        let error = match operation() {
            Ok(value) => {
                if attempts > 1 {
                    debug!(attempt = attempts, "Succeeded after retry");
                }
                break Ok(value);
            }
            Err(e) => e,
        };

        if !is_retryable(&error) {
            break Err(error);
        }
        if policy.exhausted(attempts) {
            warn!(attempt = attempts, error = %error, "Giving up after retries");
            break Err(error);
        }

        let delay = policy.delay_for_attempt(attempts - 1);
        debug!(
            attempt = attempts,
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            error = %error,
            "Transient failure, retrying"
        );
        thread::sleep(delay);
    };

    RetryOutcome {
        result,
        attempts,
        elapsed: started.elapsed(),
    }
}

/// Check if an error is retryable.
///
/// Only transient store failures and local I/O qualify. Model failures,
/// schema conflicts and malformed input fail the same way on every attempt.
#[must_use]
pub fn is_retryable(error: &Error) -> bool {
    match error {
        Error::Io(_) => true,
        Error::Store(e) => e.is_transient(),
        Error::BatchAborted { source, .. } => is_retryable(source),
        Error::Embed(_)
        | Error::SchemaConflict(_)
        | Error::InputMalformed(_)
        | Error::Config(_)
        | Error::Json(_) => false,
    }
}
