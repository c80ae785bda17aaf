// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `errors.rs`

#[cfg(test)]
mod tests {
    use super::super::{ClusterError, ReconcileError, SourceError};
    use std::time::Duration;

    #[test]
    fn test_server_error_requeues_after_30s() {
        let err = ReconcileError::from(ClusterError::api(503, "ServiceUnavailable", "etcd down"));

        assert_eq!(
            err.transient_requeue(),
            Some(Duration::from_secs(30)),
            "5xx should requeue after 30 seconds"
        );
    }

    #[test]
    fn test_rate_limit_requeues_after_10s() {
        let err = ReconcileError::from(ClusterError::api(429, "TooManyRequests", "slow down"));

        assert_eq!(
            err.transient_requeue(),
            Some(Duration::from_secs(10)),
            "429 should requeue after 10 seconds"
        );
    }

    #[test]
    fn test_client_error_has_no_requeue() {
        for code in [400, 403, 404, 409, 422] {
            let err = ReconcileError::from(ClusterError::api(code, "Bad", "nope"));
            assert_eq!(
                err.transient_requeue(),
                None,
                "HTTP {code} is not transient"
            );
        }

        let err = ReconcileError::InvalidResource("no namespace".to_string());
        assert_eq!(err.transient_requeue(), None);
    }

    #[test]
    fn test_retry_predicate() {
        assert!(ReconcileError::from(ClusterError::api(500, "InternalError", "x")).is_retryable());
        assert!(ReconcileError::from(ClusterError::api(429, "TooManyRequests", "x")).is_retryable());
        assert!(ReconcileError::from(ClusterError::Transport("reset".into())).is_retryable());
        assert!(ReconcileError::from(SourceError::Git {
            operation: "clone",
            repo: "https://example.com/repo.git".into(),
            stderr: "timeout".into(),
        })
        .is_retryable());

        assert!(!ReconcileError::from(ClusterError::api(403, "Forbidden", "x")).is_retryable());
        assert!(!ReconcileError::from(ClusterError::api(422, "Invalid", "x")).is_retryable());
        assert!(!ReconcileError::InvalidResource("bad".into()).is_retryable());
    }

    #[test]
    fn test_rejected_source_coordinates_are_not_retried() {
        assert!(!ReconcileError::from(SourceError::InvalidRef("--upload-pack=x".into())).is_retryable());
        assert!(!ReconcileError::from(SourceError::PathEscape("../etc".into())).is_retryable());
        assert!(ReconcileError::from(SourceError::Timeout {
            operation: "clone",
            secs: 120
        })
        .is_retryable());
    }

    #[test]
    fn test_cluster_error_message_prefix() {
        let err = ReconcileError::from(ClusterError::api(500, "InternalError", "boom"));

        assert_eq!(err.to_string(), "Kubernetes API error: 500 InternalError: boom");
    }

    #[test]
    fn test_not_found_helper() {
        assert!(ClusterError::api(404, "NotFound", "x").is_not_found());
        assert!(!ClusterError::api(409, "AlreadyExists", "x").is_not_found());
        assert!(!ClusterError::Transport("x".into()).is_not_found());
        assert_eq!(ClusterError::Transport("x".into()).code(), None);
    }
}
