// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `retry.rs`

#[cfg(test)]
mod tests {
    use super::super::{grow, retry_with_backoff, retry_with_backoff_if, ExponentialBackoff, RetryPolicy};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    fn fast_policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy::new(max_retries, Duration::from_millis(1), Duration::from_millis(5))
    }

    /// Test that the built-in policies carry the expected bounds
    #[test]
    fn test_policy_configuration() {
        let api = RetryPolicy::api();
        assert_eq!(api.max_retries, 3, "API policy retries 3 times");
        assert_eq!(api.initial_delay, Duration::from_millis(1000));
        assert_eq!(api.max_delay, Duration::from_millis(10_000));

        let cleanup = RetryPolicy::cleanup();
        assert_eq!(cleanup.max_retries, 3);
        assert_eq!(
            cleanup.max_delay,
            Duration::from_millis(5000),
            "Cleanup deletes cap backoff at 5 seconds"
        );
    }

    #[test]
    fn test_grow_is_capped() {
        let max = Duration::from_secs(10);

        assert_eq!(grow(Duration::from_secs(2), 1.5, max), Duration::from_secs(3));
        assert_eq!(grow(Duration::from_secs(8), 2.0, max), max);
    }

    /// Test that every growth step stays within [1.5x, 2.0x] and never exceeds the cap
    #[test]
    fn test_backoff_growth_bounds() {
        let max = Duration::from_secs(60);
        let mut backoff = ExponentialBackoff::new(Duration::from_millis(100), max);

        let mut previous = backoff.next_backoff();
        assert_eq!(previous, Duration::from_millis(100), "First delay is the initial delay");

        for _ in 0..20 {
            let next = backoff.next_backoff();
            assert!(next <= max, "Delay {next:?} exceeds cap");
            if next < max {
                let ratio = next.as_secs_f64() / previous.as_secs_f64();
                assert!(
                    (1.5 - 1e-6..2.0 + 1e-6).contains(&ratio),
                    "Growth factor {ratio} outside [1.5, 2.0]"
                );
            }
            previous = next;
        }
        assert_eq!(previous, max, "Delay should saturate at the cap");
    }

    #[tokio::test]
    async fn test_retry_succeeds_after_transient_failures() {
        // Arrange
        let attempts = AtomicU32::new(0);

        // Act
        let result: Result<&str, String> = retry_with_backoff(
            || async {
                let n = attempts.fetch_add(1, Ordering::SeqCst) + 1;
                if n < 3 {
                    Err(format!("attempt {n} failed"))
                } else {
                    Ok("done")
                }
            },
            &fast_policy(3),
            "flaky operation",
        )
        .await;

        // Assert
        assert_eq!(result, Ok("done"));
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_exhaustion_returns_last_error() {
        let attempts = AtomicU32::new(0);

        let result: Result<(), String> = retry_with_backoff(
            || async {
                let n = attempts.fetch_add(1, Ordering::SeqCst) + 1;
                Err(format!("failure {n}"))
            },
            &fast_policy(3),
            "always failing",
        )
        .await;

        assert_eq!(attempts.load(Ordering::SeqCst), 4, "One attempt plus three retries");
        assert_eq!(result, Err("failure 4".to_string()), "The most recent error is returned");
    }

    #[tokio::test]
    async fn test_predicate_rejection_stops_immediately() {
        let attempts = AtomicU32::new(0);

        let result: Result<(), u16> = retry_with_backoff_if(
            || async {
                attempts.fetch_add(1, Ordering::SeqCst);
                Err(403)
            },
            &fast_policy(5),
            |code| *code >= 500,
            "forbidden call",
        )
        .await;

        assert_eq!(result, Err(403));
        assert_eq!(attempts.load(Ordering::SeqCst), 1, "Rejected errors are not retried");
    }

    #[tokio::test]
    async fn test_zero_retries_runs_once() {
        let attempts = AtomicU32::new(0);

        let result: Result<(), &str> = retry_with_backoff(
            || async {
                attempts.fetch_add(1, Ordering::SeqCst);
                Err("nope")
            },
            &fast_policy(0),
            "single shot",
        )
        .await;

        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    /// Test that the sleep schedule follows the configured delays under paused time
    #[tokio::test(start_paused = true)]
    async fn test_retry_sleeps_between_attempts() {
        let start = tokio::time::Instant::now();

        let result: Result<(), &str> = retry_with_backoff(
            || async { Err("down") },
            &RetryPolicy::new(2, Duration::from_secs(1), Duration::from_secs(10)),
            "paused clock",
        )
        .await;

        assert!(result.is_err());
        let elapsed = start.elapsed();
        // 1s, then 1.5s..2s
        assert!(elapsed >= Duration::from_millis(2500), "elapsed {elapsed:?}");
        assert!(elapsed <= Duration::from_millis(3000), "elapsed {elapsed:?}");
    }
}
