// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Kubernetes reconciliation logic for `AppConfig` resources.
//!
//! # Reconciliation Architecture
//!
//! The operator follows the standard Kubernetes controller pattern:
//!
//! 1. **Watch** - Monitor `AppConfig` changes via the Kubernetes API
//! 2. **Reconcile** - Compare the declared spec with the children in the namespace
//! 3. **Update** - Create or update ConfigMaps, RBAC, NetworkPolicy and Secrets
//! 4. **Status** - Append a `Reconciled` condition and record created children
//!
//! # Modules
//!
//! - [`appconfig`] - Lifecycle state machine and outcome persistence
//! - [`configmaps`] - ConfigMaps materialized from the source repository
//! - [`rbac`] - ServiceAccount, Roles and RoleBindings
//! - [`network_policy`] - Namespace-local NetworkPolicy
//! - [`secrets`] - Credential generation and rotation
//! - [`finalizers`] - Finalizer bookkeeping and best-effort cleanup
//! - [`upgrade`] - In-place schema upgrades of older `AppConfig` objects
//! - [`resources`] - Shared create-or-update helper and child metadata
//! - [`retry`] - Exponential backoff retrier
//! - [`status`] - Condition helpers
//!
//! # Example
//!
//! ```rust,no_run
//! use appconfig_operator::context::Context;
//! use appconfig_operator::crd::AppConfig;
//! use appconfig_operator::reconcilers::{apply_outcome, reconcile_appconfig};
//!
//! async fn reconcile_once(ctx: &Context, app: AppConfig) -> anyhow::Result<()> {
//!     let outcome = reconcile_appconfig(ctx, app).await;
//!     let action = apply_outcome(ctx, outcome).await?;
//!     println!("next action: {action:?}");
//!     Ok(())
//! }
//! ```

pub mod appconfig;
pub mod configmaps;
pub mod finalizers;
pub mod network_policy;
pub mod rbac;
pub mod resources;
pub mod retry;
pub mod secrets;
pub mod status;
pub mod upgrade;

pub use appconfig::{
    apply_outcome, lifecycle_phase, reconcile_appconfig, record_error_condition, LifecyclePhase,
    ReconcileOutcome,
};
