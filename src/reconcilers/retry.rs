// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Bounded retry with jittered exponential backoff.
//!
//! This module knows nothing about Kubernetes. It runs a fallible async operation
//! up to `max_retries + 1` times, sleeping between attempts, and hands the last
//! error back to the caller once retries are exhausted or the retry predicate
//! rejects an error.
//!
//! # Backoff
//!
//! The first sleep is `initial_delay`. After each sleep the delay grows by a random
//! factor in `[1.5, 2.0)` and is capped at `max_delay`:
//!
//! ```text
//! delay(n+1) = min(max_delay, delay(n) * U(1.5, 2.0))
//! ```
//!
//! With the API policy (3 retries, 1s initial, 10s max) the sleeps are roughly
//! 1s, 1.5-2s, 2.25-4s.

use crate::constants::{
    BACKOFF_MULTIPLIER_MAX, BACKOFF_MULTIPLIER_MIN, CLEANUP_MAX_RETRY_DELAY_MILLIS,
    DEFAULT_INITIAL_RETRY_DELAY_MILLIS, DEFAULT_MAX_RETRIES, DEFAULT_MAX_RETRY_DELAY_MILLIS,
};
use rand::Rng;
use std::fmt::Display;
use std::future::Future;
use std::time::{Duration, Instant};
use tracing::{debug, error, warn};

/// Retry bounds for one class of operations.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,
    /// Sleep before the first retry
    pub initial_delay: Duration,
    /// Upper bound for any single sleep
    pub max_delay: Duration,
}

impl RetryPolicy {
    #[must_use]
    pub const fn new(max_retries: u32, initial_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_retries,
            initial_delay,
            max_delay,
        }
    }

    /// Policy for mutating API calls during reconciliation.
    #[must_use]
    pub const fn api() -> Self {
        Self::new(
            DEFAULT_MAX_RETRIES,
            Duration::from_millis(DEFAULT_INITIAL_RETRY_DELAY_MILLIS),
            Duration::from_millis(DEFAULT_MAX_RETRY_DELAY_MILLIS),
        )
    }

    /// Policy for per-resource deletes during finalization.
    #[must_use]
    pub const fn cleanup() -> Self {
        Self::new(
            DEFAULT_MAX_RETRIES,
            Duration::from_millis(DEFAULT_INITIAL_RETRY_DELAY_MILLIS),
            Duration::from_millis(CLEANUP_MAX_RETRY_DELAY_MILLIS),
        )
    }

    #[must_use]
    pub fn backoff(&self) -> ExponentialBackoff {
        ExponentialBackoff::new(self.initial_delay, self.max_delay)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::api()
    }
}

/// Jittered exponential backoff state.
#[derive(Debug)]
pub struct ExponentialBackoff {
    /// Delay returned by the next call to [`ExponentialBackoff::next_backoff`]
    pub current_interval: Duration,
    /// Upper bound for any delay
    pub max_interval: Duration,
}

impl ExponentialBackoff {
    #[must_use]
    pub fn new(initial_interval: Duration, max_interval: Duration) -> Self {
        Self {
            current_interval: initial_interval.min(max_interval),
            max_interval,
        }
    }

    /// Return the current delay and advance to the next one.
    pub fn next_backoff(&mut self) -> Duration {
        let interval = self.current_interval;
        let factor = rand::thread_rng().gen_range(BACKOFF_MULTIPLIER_MIN..BACKOFF_MULTIPLIER_MAX);
        self.current_interval = grow(interval, factor, self.max_interval);
        interval
    }
}

/// `min(max, interval * factor)`
fn grow(interval: Duration, factor: f64, max: Duration) -> Duration {
    Duration::from_secs_f64(interval.as_secs_f64() * factor).min(max)
}

/// Retry `operation` on every error.
///
/// # Errors
///
/// Returns the last error once all attempts failed.
pub async fn retry_with_backoff<T, E, F, Fut>(
    operation: F,
    policy: &RetryPolicy,
    operation_name: &str,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    retry_with_backoff_if(operation, policy, |_| true, operation_name).await
}

/// Retry `operation` while `should_retry` accepts the error and retries remain.
///
/// # Arguments
///
/// * `operation` - Produces a fresh attempt on every call
/// * `policy` - Retry count and delay bounds
/// * `should_retry` - Pure predicate deciding whether an error is worth another attempt
/// * `operation_name` - Human-readable name for logging (e.g., "sync configmaps shop/orders")
///
/// # Errors
///
/// Returns the most recent error when the predicate rejects it or retries are exhausted.
pub async fn retry_with_backoff_if<T, E, F, Fut, P>(
    mut operation: F,
    policy: &RetryPolicy,
    should_retry: P,
    operation_name: &str,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    P: Fn(&E) -> bool,
    E: Display,
{
    let mut backoff = policy.backoff();
    let start_time = Instant::now();
    let mut attempt: u32 = 0;

    loop {
        attempt += 1;

        match operation().await {
            Ok(value) => {
                if attempt > 1 {
                    debug!(
                        operation = operation_name,
                        attempt = attempt,
                        elapsed = ?start_time.elapsed(),
                        "Operation succeeded after retries"
                    );
                }
                return Ok(value);
            }
            Err(e) => {
                if !should_retry(&e) {
                    error!(
                        operation = operation_name,
                        error = %e,
                        "Non-retryable error, failing immediately"
                    );
                    return Err(e);
                }

                if attempt > policy.max_retries {
                    error!(
                        operation = operation_name,
                        attempt = attempt,
                        elapsed = ?start_time.elapsed(),
                        error = %e,
                        "Retries exhausted, giving up"
                    );
                    return Err(e);
                }

                let delay = backoff.next_backoff();
                warn!(
                    operation = operation_name,
                    attempt = attempt,
                    retry_after = ?delay,
                    error = %e,
                    "Operation failed, will retry"
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}

#[cfg(test)]
#[path = "retry_tests.rs"]
mod retry_tests;
