// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Status condition types and reasons for `AppConfig` resources.
//!
//! Reasons are programmatic identifiers in CamelCase that explain why a condition has
//! a particular status.
//!
//! # Condition History
//!
//! `AppConfig` uses a single condition type, `Reconciled`. Conditions are appended on
//! every reconciliation pass and never pruned, so the latest outcome is always the
//! last entry:
//!
//! ```yaml
//! status:
//!   conditions:
//!     - type: Reconciled
//!       status: "False"
//!       reason: ReconciliationFailed
//!       message: "Kubernetes API error: 503 ServiceUnavailable: etcd leader changed"
//!     - type: Reconciled
//!       status: "True"
//!       reason: ReconciliationSucceeded
//!       message: "AppConfig reconciled successfully"
//! ```

// ============================================================================
// Condition Types
// ============================================================================

/// The only condition type written to `AppConfig` status.
pub const CONDITION_TYPE_RECONCILED: &str = "Reconciled";

/// Condition status string for a successful outcome.
pub const CONDITION_STATUS_TRUE: &str = "True";

/// Condition status string for a failed outcome.
pub const CONDITION_STATUS_FALSE: &str = "False";

// ============================================================================
// Reasons
// ============================================================================

/// All child resources were synchronized.
pub const REASON_RECONCILIATION_SUCCEEDED: &str = "ReconciliationSucceeded";

/// A synchronizer or the rotation scheduler failed.
///
/// The condition message carries the error text. Transient API errors (5xx, 429)
/// additionally schedule a requeue.
pub const REASON_RECONCILIATION_FAILED: &str = "ReconciliationFailed";

/// Finalization could not start; the finalizer stays in place.
pub const REASON_FINALIZATION_FAILED: &str = "FinalizationFailed";

// ============================================================================
// Messages
// ============================================================================

/// Message of the success condition.
pub const MESSAGE_RECONCILED: &str = "AppConfig reconciled successfully";
