// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! # AppConfig Operator - application bootstrap for Kubernetes
//!
//! The AppConfig operator watches `AppConfig` custom resources
//! (`microservice.example.com/v1`) and bootstraps everything an application needs
//! in its namespace from that single declaration.
//!
//! ## Overview
//!
//! For every `AppConfig` the operator:
//!
//! - Materializes one ConfigMap per file found in a git repository
//! - Creates a ServiceAccount, Roles and RoleBindings
//! - Creates a NetworkPolicy restricting traffic to declared peers
//! - Generates and periodically rotates credentials in Secrets
//! - Injects a sidecar container into newly created matching pods
//! - Deletes every child it created when the `AppConfig` is deleted
//!
//! ## Modules
//!
//! - [`crd`] - The `AppConfig` custom resource
//! - [`reconcilers`] - Lifecycle state machine and per-concern synchronizers
//! - [`injection`] - Injection registry and pod watcher
//! - [`cluster`] - Cluster API seam and its `kube` implementation
//! - [`source`] - Configuration source fetching (git)
//! - [`context`] - Shared reconciler context
//! - [`metrics`] - Prometheus metrics
//! - [`server`] - Metrics and probe endpoints
//!
//! ## Example
//!
//! ```rust,no_run
//! use appconfig_operator::crd::{AppConfig, AppConfigSpec, SecretRotationSpec};
//!
//! let app = AppConfig::new(
//!     "orders",
//!     AppConfigSpec {
//!         app_name: "orders".to_string(),
//!         github_repo: Some("https://github.com/example/orders-config.git".to_string()),
//!         secret_rotation: Some(SecretRotationSpec {
//!             enabled: true,
//!             interval_hours: 12,
//!             ..SecretRotationSpec::default()
//!         }),
//!         ..AppConfigSpec::default()
//!     },
//! );
//! ```

pub mod cluster;
pub mod constants;
pub mod context;
pub mod crd;
pub mod errors;
pub mod injection;
pub mod labels;
pub mod metrics;
pub mod reconcilers;
pub mod server;
pub mod source;
pub mod status_reasons;

#[cfg(test)]
pub(crate) mod fake_cluster;
