// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Ownership metadata and idempotent create-or-update for child resources.
//!
//! Every object an `AppConfig` creates carries:
//!
//! - an owner reference back to the `AppConfig` (`controller: true`,
//!   `blockOwnerDeletion: true`) so the garbage collector cascades deletion
//! - `app=<appName>` and `app.kubernetes.io/managed-by=microservice-bootstrap-operator`
//!
//! The managed-by label is what separates our objects from foreign objects that
//! happen to have the same name. [`ensure_resource`] never overwrites a foreign
//! object.
//!
//! # Strategies
//!
//! - [`UpdateStrategy::Apply`]: create when absent, server-side apply when present
//! - [`UpdateStrategy::CreateOnly`]: create when absent, leave an existing object alone

use crate::cluster::{ClusterApi, ClusterResource};
use crate::crd::AppConfig;
use crate::errors::{ClusterError, ReconcileError};
use crate::labels::{K8S_MANAGED_BY, LABEL_APP, MANAGED_BY_APPCONFIG_OPERATOR};
use crate::metrics;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference};
use kube::{Resource, ResourceExt};
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

/// How an existing object is treated by [`ensure_resource`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UpdateStrategy {
    /// Server-side apply over the existing object.
    Apply,
    /// Keep the existing object untouched.
    CreateOnly,
}

/// What [`ensure_resource`] did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EnsureOutcome {
    Created,
    Updated,
    /// Already present and owned by us; nothing written.
    Unchanged,
    /// An object of the same name exists without our managed-by label.
    Foreign,
}

impl EnsureOutcome {
    /// Whether the object is ours and belongs in `createdResources`.
    #[must_use]
    pub fn is_owned(self) -> bool {
        !matches!(self, Self::Foreign)
    }
}

/// Labels applied to every child resource.
#[must_use]
pub fn managed_labels(app_name: &str) -> BTreeMap<String, String> {
    BTreeMap::from([
        (LABEL_APP.to_string(), app_name.to_string()),
        (
            K8S_MANAGED_BY.to_string(),
            MANAGED_BY_APPCONFIG_OPERATOR.to_string(),
        ),
    ])
}

/// True when the object carries our managed-by label.
#[must_use]
pub fn is_managed(meta: &ObjectMeta) -> bool {
    meta.labels
        .as_ref()
        .and_then(|labels| labels.get(K8S_MANAGED_BY))
        .is_some_and(|value| value == MANAGED_BY_APPCONFIG_OPERATOR)
}

/// Controller owner reference pointing at `app`.
///
/// # Errors
///
/// Returns [`ReconcileError::InvalidResource`] if the `AppConfig` has no UID yet.
pub fn owner_reference(app: &AppConfig) -> Result<OwnerReference, ReconcileError> {
    app.controller_owner_ref(&()).ok_or_else(|| {
        ReconcileError::InvalidResource(format!(
            "AppConfig {} has no uid, cannot own child resources",
            app.registry_key()
        ))
    })
}

/// Namespace of `app`.
///
/// # Errors
///
/// Returns [`ReconcileError::InvalidResource`] for an `AppConfig` without namespace.
pub fn app_namespace(app: &AppConfig) -> Result<String, ReconcileError> {
    app.namespace().ok_or_else(|| {
        ReconcileError::InvalidResource(format!("AppConfig {} has no namespace", app.name_any()))
    })
}

/// Metadata for a child object named `name` in the `AppConfig`'s namespace.
///
/// # Errors
///
/// Fails when the owner reference or namespace cannot be derived.
pub fn child_metadata(app: &AppConfig, name: &str) -> Result<ObjectMeta, ReconcileError> {
    Ok(ObjectMeta {
        name: Some(name.to_string()),
        namespace: Some(app_namespace(app)?),
        labels: Some(managed_labels(&app.spec.app_name)),
        owner_references: Some(vec![owner_reference(app)?]),
        ..ObjectMeta::default()
    })
}

/// Create `desired` or bring the existing object in line with it.
///
/// # Errors
///
/// Returns the underlying cluster error of the get, create or apply call.
pub async fn ensure_resource<C, K>(
    cluster: &C,
    namespace: &str,
    desired: &K,
    strategy: UpdateStrategy,
) -> Result<EnsureOutcome, ClusterError>
where
    C: ClusterApi,
    K: ClusterResource,
{
    let name = desired.name_any();
    let kind = K::kind(&());

    match cluster.get::<K>(namespace, &name).await? {
        None => {
            cluster.create(namespace, desired).await?;
            info!(namespace = %namespace, name = %name, kind = %kind, "Created resource");
            metrics::record_resource_created(&kind);
            Ok(EnsureOutcome::Created)
        }
        Some(existing) if !is_managed(existing.meta()) => {
            warn!(
                namespace = %namespace,
                name = %name,
                kind = %kind,
                "Resource exists but is not managed by this operator, leaving it untouched"
            );
            Ok(EnsureOutcome::Foreign)
        }
        Some(_) if strategy == UpdateStrategy::CreateOnly => {
            debug!(namespace = %namespace, name = %name, kind = %kind, "Resource already exists");
            Ok(EnsureOutcome::Unchanged)
        }
        Some(_) => {
            cluster.apply(namespace, &name, desired).await?;
            debug!(namespace = %namespace, name = %name, kind = %kind, "Applied resource");
            metrics::record_resource_updated(&kind);
            Ok(EnsureOutcome::Updated)
        }
    }
}

#[cfg(test)]
#[path = "resources_tests.rs"]
mod resources_tests;
