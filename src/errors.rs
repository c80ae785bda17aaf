// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Error types for `AppConfig` reconciliation.
//!
//! Three layers:
//!
//! - [`ClusterError`] - a failed call against the Kubernetes API, carrying the HTTP
//!   status code so callers can classify it
//! - [`SourceError`] - a failed fetch of the configuration repository
//! - [`ReconcileError`] - everything a reconciliation step can fail with
//!
//! Classification lives on [`ReconcileError`]: [`ReconcileError::transient_requeue`]
//! decides the requeue delay after a failed pass, and [`ReconcileError::is_retryable`]
//! is the predicate handed to the backoff retrier.

use crate::constants::{RATE_LIMIT_REQUEUE_SECS, SERVER_ERROR_REQUEUE_SECS};
use std::time::Duration;
use thiserror::Error;

/// HTTP 404 Not Found
pub const HTTP_NOT_FOUND: u16 = 404;

/// HTTP 429 Too Many Requests
pub const HTTP_TOO_MANY_REQUESTS: u16 = 429;

/// Errors returned by the cluster API seam.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClusterError {
    /// The API server answered with an error status.
    #[error("{code} {reason}: {message}")]
    Api {
        /// HTTP status code
        code: u16,
        /// Machine-readable reason (e.g. `NotFound`, `AlreadyExists`)
        reason: String,
        /// Human-readable message from the API server
        message: String,
    },

    /// The request never produced an API response (connection, TLS, timeout).
    #[error("transport error: {0}")]
    Transport(String),

    /// A request or response body could not be (de)serialized.
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl ClusterError {
    /// Build an API error.
    pub fn api(code: u16, reason: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Api {
            code,
            reason: reason.into(),
            message: message.into(),
        }
    }

    /// HTTP status code when the API server responded.
    #[must_use]
    pub fn code(&self) -> Option<u16> {
        match self {
            Self::Api { code, .. } => Some(*code),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_not_found(&self) -> bool {
        self.code() == Some(HTTP_NOT_FOUND)
    }
}

impl From<kube::Error> for ClusterError {
    fn from(err: kube::Error) -> Self {
        match err {
            kube::Error::Api(api_err) => Self::Api {
                code: api_err.code,
                reason: api_err.reason.clone(),
                message: api_err.message.clone(),
            },
            kube::Error::SerdeError(e) => Self::Serialization(e.to_string()),
            other => Self::Transport(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for ClusterError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Errors fetching configuration files from the source repository.
#[derive(Error, Debug)]
pub enum SourceError {
    /// The `git` binary could not be started.
    #[error("failed to run git {operation}: {source}")]
    Spawn {
        operation: &'static str,
        #[source]
        source: std::io::Error,
    },

    /// `git` exited with a non-zero status.
    #[error("git {operation} failed for {repo}: {stderr}")]
    Git {
        operation: &'static str,
        repo: String,
        stderr: String,
    },

    /// Reading the checked-out tree failed.
    #[error("failed to read source tree: {0}")]
    Io(#[from] std::io::Error),

    /// Walking the checked-out tree failed.
    #[error("failed to walk source tree: {0}")]
    Walk(#[from] walkdir::Error),

    /// `git` did not finish within the allotted time.
    #[error("git {operation} timed out after {secs}s")]
    Timeout { operation: &'static str, secs: u64 },

    /// The ref would be parsed by `git` as an option.
    #[error("invalid git ref {0:?}")]
    InvalidRef(String),

    /// The configured path leaves the repository checkout.
    #[error("config path {0:?} escapes the repository")]
    PathEscape(String),
}

impl SourceError {
    /// Errors caused by the `AppConfig` spec rather than the environment.
    #[must_use]
    pub fn is_permanent(&self) -> bool {
        matches!(self, Self::InvalidRef(_) | Self::PathEscape(_))
    }
}

/// Errors produced by a reconciliation step.
#[derive(Error, Debug)]
pub enum ReconcileError {
    #[error("Kubernetes API error: {0}")]
    Cluster(#[from] ClusterError),

    #[error("Source fetch error: {0}")]
    Source(#[from] SourceError),

    /// The `AppConfig` itself cannot be processed (e.g. missing namespace).
    #[error("Invalid AppConfig: {0}")]
    InvalidResource(String),
}

impl ReconcileError {
    /// Requeue delay for transient API failures.
    ///
    /// - 5xx → 30 seconds
    /// - 429 → 10 seconds
    /// - anything else → `None`, leaving the next attempt to the watch stream
    #[must_use]
    pub fn transient_requeue(&self) -> Option<Duration> {
        match self {
            Self::Cluster(err) => match err.code() {
                Some(HTTP_TOO_MANY_REQUESTS) => Some(Duration::from_secs(RATE_LIMIT_REQUEUE_SECS)),
                Some(code) if (500..600).contains(&code) => {
                    Some(Duration::from_secs(SERVER_ERROR_REQUEUE_SECS))
                }
                _ => None,
            },
            _ => None,
        }
    }

    /// Retry predicate used with the backoff retrier.
    ///
    /// Client errors (4xx except 429), invalid resources and rejected source
    /// coordinates fail the same way on every attempt and are not retried.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Cluster(err) => match err.code() {
                Some(HTTP_TOO_MANY_REQUESTS) => true,
                Some(code) => !(400..500).contains(&code),
                None => true,
            },
            Self::Source(err) => !err.is_permanent(),
            Self::InvalidResource(_) => false,
        }
    }

    /// Short label for the errors metric.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Cluster(err) => match err.code() {
                Some(HTTP_TOO_MANY_REQUESTS) => "rate_limited",
                Some(code) if (500..600).contains(&code) => "server_error",
                Some(_) => "client_error",
                None => "transport_error",
            },
            Self::Source(_) => "source_fetch",
            Self::InvalidResource(_) => "invalid_resource",
        }
    }
}

#[cfg(test)]
#[path = "errors_tests.rs"]
mod errors_tests;
