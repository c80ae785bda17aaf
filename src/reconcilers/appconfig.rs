// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! `AppConfig` reconciliation state machine.
//!
//! Every `AppConfig` moves through four phases ([`LifecyclePhase`]):
//!
//! ```text
//! New --add finalizer--> Active --deletionTimestamp--> Terminating --cleanup--> Finalized
//! ```
//!
//! [`reconcile_appconfig`] never talks to the dispatch engine. It computes a
//! [`ReconcileOutcome`] describing what must be persisted; [`apply_outcome`] writes it
//! and turns it into a controller [`Action`].
//!
//! # Active pass
//!
//! 1. Schema upgrade; a performed conversion is persisted before anything else
//! 2. ConfigMaps from the source repository
//! 3. RBAC objects
//! 4. NetworkPolicy
//! 5. Injection registry refresh
//! 6. Secret rotation, when due
//! 7. `Reconciled/True` condition and `lastSyncTime`
//!
//! Steps 2, 3, 4 and 6 each run under the backoff retrier. References to created
//! children are recorded in `status.createdResources` as each step succeeds, so a
//! failure part-way still leaves earlier children tracked for cleanup.

use crate::cluster::ClusterApi;
use crate::constants::{KIND_APP_CONFIG, MAX_REQUEUE_SECS, REINVOKE_DELAY_SECS, SECONDS_PER_HOUR};
use crate::context::Context;
use crate::crd::{AppConfig, AppConfigStatus};
use crate::errors::{ClusterError, ReconcileError};
use crate::metrics;
use crate::reconcilers::configmaps::sync_config_maps;
use crate::reconcilers::finalizers::{
    add_finalizer, cleanup_created_resources, has_finalizer, remove_finalizer, ResourceRef,
};
use crate::reconcilers::network_policy::sync_network_policy;
use crate::reconcilers::rbac::sync_rbac;
use crate::reconcilers::resources::app_namespace;
use crate::reconcilers::retry::retry_with_backoff_if;
use crate::reconcilers::secrets::{is_rotation_due, rotate_secrets};
use crate::reconcilers::status::{
    append_condition, failure_condition, now_rfc3339, record_created_resource, status_patch,
    success_condition,
};
use crate::reconcilers::upgrade::{upgrade_to_current, Conversion};
use crate::source::SourceFetcher;
use crate::status_reasons::{REASON_FINALIZATION_FAILED, REASON_RECONCILIATION_FAILED};
use chrono::Utc;
use kube::runtime::controller::Action;
use kube::ResourceExt;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Where an `AppConfig` is in its lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LifecyclePhase {
    /// No finalizer, not deleted.
    New,
    /// Finalizer present, not deleted.
    Active,
    /// Deleted, finalizer still present.
    Terminating,
    /// Deleted and finalizer removed; nothing left to do.
    Finalized,
}

#[must_use]
pub fn lifecycle_phase(app: &AppConfig) -> LifecyclePhase {
    match (app.metadata.deletion_timestamp.is_some(), has_finalizer(app)) {
        (false, false) => LifecyclePhase::New,
        (false, true) => LifecyclePhase::Active,
        (true, true) => LifecyclePhase::Terminating,
        (true, false) => LifecyclePhase::Finalized,
    }
}

/// What a reconciliation pass wants persisted.
#[derive(Clone, Debug, PartialEq)]
pub enum ReconcileOutcome {
    /// Nothing to write.
    NoUpdate,
    /// Metadata or spec changed: replace the object and re-invoke.
    UpdateResource(AppConfig),
    /// Only the status changed.
    UpdateStatus {
        resource: AppConfig,
        /// Explicit requeue; `None` waits for the next change.
        requeue_after: Option<Duration>,
    },
}

impl ReconcileOutcome {
    /// Short label for logs and metrics.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::NoUpdate => "no_update",
            Self::UpdateResource(_) => "update_resource",
            Self::UpdateStatus { .. } => "update_status",
        }
    }
}

/// Run one reconciliation pass over `app`.
///
/// Never fails: errors during the Active and Terminating phases are recorded as
/// `Reconciled/False` conditions in the returned status.
pub async fn reconcile_appconfig<C, F>(ctx: &Context<C, F>, app: AppConfig) -> ReconcileOutcome
where
    C: ClusterApi,
    F: SourceFetcher,
{
    let phase = lifecycle_phase(&app);
    debug!(resource = %app.registry_key(), phase = ?phase, "Reconciling AppConfig");

    match phase {
        LifecyclePhase::New => {
            let mut app = app;
            add_finalizer(&mut app);
            info!(resource = %app.registry_key(), "Added finalizer");
            ReconcileOutcome::UpdateResource(app)
        }
        LifecyclePhase::Active => reconcile_active(ctx, app).await,
        LifecyclePhase::Terminating => finalize(ctx, app).await,
        LifecyclePhase::Finalized => ReconcileOutcome::NoUpdate,
    }
}

/// Requeue delay for the next rotation check, capped at [`MAX_REQUEUE_SECS`].
pub(crate) fn rotation_requeue(interval_hours: u32) -> Duration {
    Duration::from_secs(
        u64::from(interval_hours)
            .saturating_mul(SECONDS_PER_HOUR)
            .min(MAX_REQUEUE_SECS),
    )
}

async fn reconcile_active<C, F>(ctx: &Context<C, F>, mut app: AppConfig) -> ReconcileOutcome
where
    C: ClusterApi,
    F: SourceFetcher,
{
    if upgrade_to_current(&mut app) == Conversion::Performed {
        return ReconcileOutcome::UpdateResource(app);
    }

    let mut status = app.status.clone().unwrap_or_default();
    let result = sync_children(ctx, &app, &mut status).await;

    let requeue_after = match result {
        Ok(()) => {
            append_condition(&mut status, success_condition());
            status.last_sync_time = Some(now_rfc3339());
            info!(resource = %app.registry_key(), "AppConfig reconciled");
            app.enabled_rotation()
                .map(|rotation| rotation_requeue(rotation.interval_hours))
        }
        Err(e) => {
            error!(resource = %app.registry_key(), error = %e, "AppConfig reconciliation failed");
            metrics::record_error(KIND_APP_CONFIG, e.kind());
            append_condition(
                &mut status,
                failure_condition(REASON_RECONCILIATION_FAILED, &e.to_string()),
            );
            e.transient_requeue()
        }
    };

    app.status = Some(status);
    ReconcileOutcome::UpdateStatus {
        resource: app,
        requeue_after,
    }
}

fn record_all(status: &mut AppConfigStatus, refs: &[ResourceRef]) {
    for reference in refs {
        record_created_resource(status, &reference.to_string());
    }
}

/// Steps 2-6 of an Active pass. Stops at the first error.
async fn sync_children<C, F>(
    ctx: &Context<C, F>,
    app: &AppConfig,
    status: &mut AppConfigStatus,
) -> Result<(), ReconcileError>
where
    C: ClusterApi,
    F: SourceFetcher,
{
    let policy = &ctx.settings.api_retry;
    let key = app.registry_key();

    let refs = retry_with_backoff_if(
        move || sync_config_maps(ctx, app),
        policy,
        ReconcileError::is_retryable,
        &format!("sync configmaps {key}"),
    )
    .await?;
    record_all(status, &refs);

    if app.spec.rbac.is_some() {
        let refs = retry_with_backoff_if(
            move || sync_rbac(ctx, app),
            policy,
            ReconcileError::is_retryable,
            &format!("sync rbac {key}"),
        )
        .await?;
        record_all(status, &refs);
    }

    if app.spec.network_policy.as_ref().is_some_and(|np| np.enabled) {
        let refs = retry_with_backoff_if(
            move || sync_network_policy(ctx, app),
            policy,
            ReconcileError::is_retryable,
            &format!("sync network policy {key}"),
        )
        .await?;
        record_all(status, &refs);
    }

    if app.injection_enabled() {
        ctx.registry.register(app);
    } else {
        let namespace = app_namespace(app)?;
        ctx.registry.unregister(&namespace, &app.name_any());
    }

    if let Some(rotation) = app.enabled_rotation() {
        let last = status.last_secret_rotation_time.as_deref();
        if is_rotation_due(last, rotation.interval_hours, Utc::now()) {
            let mut refs = Vec::new();
            let result = rotate_secrets(ctx, app, &mut refs).await;
            record_all(status, &refs);
            result?;
            status.last_secret_rotation_time = Some(now_rfc3339());
        } else {
            debug!(resource = %key, "Secret rotation not due yet");
        }
    }

    Ok(())
}

/// Terminating phase: delete recorded children, then release the finalizer.
pub async fn finalize<C, F>(ctx: &Context<C, F>, mut app: AppConfig) -> ReconcileOutcome
where
    C: ClusterApi,
    F: SourceFetcher,
{
    let namespace = match app_namespace(&app) {
        Ok(ns) => ns,
        Err(e) => {
            error!(resource = %app.name_any(), error = %e, "AppConfig finalization failed");
            let mut status = app.status.clone().unwrap_or_default();
            append_condition(
                &mut status,
                failure_condition(REASON_FINALIZATION_FAILED, &format!("Finalization failed: {e}")),
            );
            app.status = Some(status);
            return ReconcileOutcome::UpdateStatus {
                resource: app,
                requeue_after: None,
            };
        }
    };

    ctx.registry.unregister(&namespace, &app.name_any());

    let created = app
        .status
        .as_ref()
        .map(|s| s.created_resources.clone())
        .unwrap_or_default();
    let report = cleanup_created_resources(&ctx.cluster, &created, &ctx.settings.cleanup_retry).await;
    if !report.failed.is_empty() {
        warn!(
            resource = %app.registry_key(),
            failed = ?report.failed,
            "Some child resources could not be deleted; owner references will garbage collect them"
        );
    }

    remove_finalizer(&mut app);
    info!(
        resource = %app.registry_key(),
        deleted = report.deleted.len(),
        failed = report.failed.len(),
        skipped = report.skipped.len(),
        "Finalized AppConfig"
    );
    ReconcileOutcome::UpdateResource(app)
}

/// Persist `outcome` and compute the controller action.
///
/// # Errors
///
/// Returns the cluster error of the replace or status patch.
pub async fn apply_outcome<C, F>(
    ctx: &Context<C, F>,
    outcome: ReconcileOutcome,
) -> Result<Action, ClusterError>
where
    C: ClusterApi,
    F: SourceFetcher,
{
    match outcome {
        ReconcileOutcome::NoUpdate => Ok(Action::await_change()),
        ReconcileOutcome::UpdateResource(app) => {
            let namespace = app.namespace().unwrap_or_default();
            ctx.cluster
                .replace(&namespace, &app.name_any(), &app)
                .await?;
            metrics::record_reconciliation_requeue(KIND_APP_CONFIG, "reinvoke");
            Ok(Action::requeue(Duration::from_secs(REINVOKE_DELAY_SECS)))
        }
        ReconcileOutcome::UpdateStatus {
            resource,
            requeue_after,
        } => {
            let namespace = resource.namespace().unwrap_or_default();
            let status = resource.status.clone().unwrap_or_default();
            ctx.cluster
                .patch_status::<AppConfig>(&namespace, &resource.name_any(), &status_patch(&status))
                .await?;
            Ok(match requeue_after {
                Some(delay) => {
                    metrics::record_reconciliation_requeue(KIND_APP_CONFIG, "scheduled");
                    Action::requeue(delay)
                }
                None => Action::await_change(),
            })
        }
    }
}

/// Append a `Reconciled/False/ReconciliationFailed` condition carrying `message`.
///
/// Used by the controller's error policy for failures that escaped
/// [`reconcile_appconfig`], e.g. a failed [`apply_outcome`].
///
/// # Errors
///
/// Returns the cluster error of the status patch.
pub async fn record_error_condition<C, F>(
    ctx: &Context<C, F>,
    app: &AppConfig,
    message: &str,
) -> Result<(), ClusterError>
where
    C: ClusterApi,
    F: SourceFetcher,
{
    let namespace = app.namespace().unwrap_or_default();
    let mut status = app.status.clone().unwrap_or_default();
    append_condition(
        &mut status,
        failure_condition(REASON_RECONCILIATION_FAILED, message),
    );
    ctx.cluster
        .patch_status::<AppConfig>(&namespace, &app.name_any(), &status_patch(&status))
        .await?;
    Ok(())
}

#[cfg(test)]
#[path = "appconfig_tests.rs"]
mod appconfig_tests;
