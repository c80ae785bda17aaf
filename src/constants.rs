// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Global constants for the `AppConfig` operator.
//!
//! This module contains all numeric and string constants used throughout the codebase.
//! Constants are organized by category for easy maintenance.

// ============================================================================
// API Constants
// ============================================================================

/// API group for the `AppConfig` CRD
pub const API_GROUP: &str = "microservice.example.com";

/// API version for the `AppConfig` CRD
pub const API_VERSION: &str = "v1";

/// Fully qualified API version (group/version)
pub const API_GROUP_VERSION: &str = "microservice.example.com/v1";

/// Kind name for `AppConfig` resource
pub const KIND_APP_CONFIG: &str = "AppConfig";

/// Schema version stamped on every `AppConfig` after upgrade
pub const CURRENT_SCHEMA_VERSION: &str = "v1";

/// Field manager used for server-side apply
pub const FIELD_MANAGER: &str = "appconfig-operator";

// ============================================================================
// Retry Constants
// ============================================================================

/// Maximum retries for a mutating cluster operation (attempts = retries + 1)
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Initial backoff delay in milliseconds
pub const DEFAULT_INITIAL_RETRY_DELAY_MILLIS: u64 = 1000;

/// Maximum backoff delay in milliseconds
pub const DEFAULT_MAX_RETRY_DELAY_MILLIS: u64 = 10_000;

/// Maximum backoff delay in milliseconds for finalization deletes
pub const CLEANUP_MAX_RETRY_DELAY_MILLIS: u64 = 5000;

/// Lower bound of the jittered backoff multiplier
pub const BACKOFF_MULTIPLIER_MIN: f64 = 1.5;

/// Upper bound of the jittered backoff multiplier
pub const BACKOFF_MULTIPLIER_MAX: f64 = 2.0;

// ============================================================================
// Requeue Constants
// ============================================================================

/// Requeue delay after a 5xx response from the API server
pub const SERVER_ERROR_REQUEUE_SECS: u64 = 30;

/// Requeue delay after a 429 response from the API server
pub const RATE_LIMIT_REQUEUE_SECS: u64 = 10;

/// Requeue delay used by the controller error policy
pub const ERROR_POLICY_REQUEUE_SECS: u64 = 30;

/// Delay before re-invoking after the resource itself was persisted
pub const REINVOKE_DELAY_SECS: u64 = 1;

/// Seconds per hour, for rotation interval arithmetic
pub const SECONDS_PER_HOUR: u64 = 3600;

/// Longest requeue handed to the controller scheduler (one year)
pub const MAX_REQUEUE_SECS: u64 = MAX_ROTATION_INTERVAL_HOURS as u64 * SECONDS_PER_HOUR;

// ============================================================================
// Secret Rotation Constants
// ============================================================================

/// Default rotation interval when `intervalHours` is not set
pub const DEFAULT_ROTATION_INTERVAL_HOURS: u32 = 24;

/// Largest accepted `intervalHours` (one year)
pub const MAX_ROTATION_INTERVAL_HOURS: u32 = 8760;

/// Largest accepted `passwordLength`, `keyLength` and `secretLength`
pub const MAX_GENERATED_LENGTH: usize = 1024;

/// Default rotation strategy name
pub const DEFAULT_ROTATION_STRATEGY: &str = "default";

/// Default generated password length
pub const DEFAULT_PASSWORD_LENGTH: usize = 16;

/// Default API key length in random bytes
pub const DEFAULT_API_KEY_BYTES: usize = 16;

/// Default API secret length in random bytes
pub const DEFAULT_API_SECRET_BYTES: usize = 32;

/// Upper bound (exclusive) of the random username suffix
pub const USERNAME_SUFFIX_BOUND: u32 = 0x1000;

/// Suffix of the default rotation target secret (`<appName>-secrets`)
pub const SECRET_NAME_SUFFIX: &str = "-secrets";

/// Default PostgreSQL port for the `database` strategy
pub const DEFAULT_POSTGRES_PORT: u16 = 5432;

/// Default MySQL port for the `database` strategy
pub const DEFAULT_MYSQL_PORT: u16 = 3306;

// ============================================================================
// Resource Naming Constants
// ============================================================================

/// Suffix of the default sidecar container name (`<appName>-sidecar`)
pub const SIDECAR_NAME_SUFFIX: &str = "-sidecar";

/// Suffix of the generated network policy name (`<appName>-network-policy`)
pub const NETWORK_POLICY_NAME_SUFFIX: &str = "-network-policy";

/// Default directory inside the source repository
pub const DEFAULT_CONFIG_PATH: &str = "/";

/// Upper bound for a single `git` invocation
pub const GIT_TIMEOUT_SECS: u64 = 120;

// ============================================================================
// Runtime Constants
// ============================================================================

/// Number of tokio worker threads
pub const TOKIO_WORKER_THREADS: usize = 4;

/// Default port for the metrics and health server
pub const DEFAULT_METRICS_PORT: u16 = 8080;
