// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Status helpers for `AppConfig` resources.
//!
//! `AppConfig` keeps an append-only condition history: every reconciliation pass
//! adds one `Reconciled` condition and nothing is ever pruned or deduplicated.
//! Readers wanting the current state take the last entry ([`latest_condition`]).
//!
//! `createdResources` is the opposite: a set, kept free of duplicates by
//! [`record_created_resource`], because finalization deletes exactly what it lists.
//!
//! # Example
//!
//! ```rust,no_run
//! use appconfig_operator::crd::AppConfigStatus;
//! use appconfig_operator::reconcilers::status::{append_condition, success_condition};
//!
//! let mut status = AppConfigStatus::default();
//! append_condition(&mut status, success_condition());
//! assert_eq!(status.conditions.len(), 1);
//! ```

use crate::crd::{AppConfigStatus, Condition};
use crate::status_reasons::{
    CONDITION_STATUS_FALSE, CONDITION_STATUS_TRUE, CONDITION_TYPE_RECONCILED, MESSAGE_RECONCILED,
    REASON_RECONCILIATION_SUCCEEDED,
};
use chrono::Utc;
use serde_json::json;

/// Create a new condition stamped with the current time.
///
/// # Arguments
///
/// * `condition_type` - The type of condition (always `Reconciled` for `AppConfig`)
/// * `status` - `"True"` or `"False"`
/// * `reason` - A programmatic identifier in `CamelCase`
/// * `message` - A human-readable explanation
#[must_use]
pub fn create_condition(
    condition_type: &str,
    status: &str,
    reason: &str,
    message: &str,
) -> Condition {
    Condition {
        r#type: condition_type.to_string(),
        status: status.to_string(),
        reason: Some(reason.to_string()),
        message: Some(message.to_string()),
        last_transition_time: Some(Utc::now().to_rfc3339()),
    }
}

/// `Reconciled/True/ReconciliationSucceeded`
#[must_use]
pub fn success_condition() -> Condition {
    create_condition(
        CONDITION_TYPE_RECONCILED,
        CONDITION_STATUS_TRUE,
        REASON_RECONCILIATION_SUCCEEDED,
        MESSAGE_RECONCILED,
    )
}

/// `Reconciled/False/<reason>` with the given message.
#[must_use]
pub fn failure_condition(reason: &str, message: &str) -> Condition {
    create_condition(
        CONDITION_TYPE_RECONCILED,
        CONDITION_STATUS_FALSE,
        reason,
        message,
    )
}

/// Append a condition to the history.
pub fn append_condition(status: &mut AppConfigStatus, condition: Condition) {
    status.conditions.push(condition);
}

/// The current condition, i.e. the last one appended.
#[must_use]
pub fn latest_condition(status: &AppConfigStatus) -> Option<&Condition> {
    status.conditions.last()
}

/// Add a `<Kind>:<namespace>/<name>` reference unless already present.
///
/// Returns `true` when the reference was new.
pub fn record_created_resource(status: &mut AppConfigStatus, reference: &str) -> bool {
    if status.created_resources.iter().any(|r| r == reference) {
        return false;
    }
    status.created_resources.push(reference.to_string());
    true
}

/// Current time in the RFC3339 format used for every status timestamp.
#[must_use]
pub fn now_rfc3339() -> String {
    Utc::now().to_rfc3339()
}

/// Merge patch body replacing the whole status subresource.
#[must_use]
pub fn status_patch(status: &AppConfigStatus) -> serde_json::Value {
    json!({ "status": status })
}

#[cfg(test)]
#[path = "status_tests.rs"]
mod status_tests;
