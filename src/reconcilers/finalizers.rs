// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Finalizer bookkeeping and child resource cleanup.
//!
//! The `AppConfig` finalizer keeps the object around until the controller has
//! deleted every child listed in `status.createdResources`. Entries use the
//! `<Kind>:<namespace>/<name>` encoding and are parsed into [`ResourceRef`] values;
//! each [`ResourceKind`] variant has its own delete handler.
//!
//! Cleanup is best-effort: one failing delete is logged and the loop moves on to
//! the next entry. Unknown kinds and malformed entries are logged and skipped.

use crate::cluster::{ClusterApi, ClusterResource};
use crate::crd::AppConfig;
use crate::errors::ClusterError;
use crate::labels::FINALIZER_APP_CONFIG;
use crate::metrics;
use crate::reconcilers::retry::{retry_with_backoff_if, RetryPolicy};
use k8s_openapi::api::core::v1::{ConfigMap, Secret, ServiceAccount};
use k8s_openapi::api::networking::v1::NetworkPolicy;
use k8s_openapi::api::rbac::v1::{Role, RoleBinding};
use std::fmt;
use tracing::{debug, error, info, warn};

/// Kinds of child resources the operator creates.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ResourceKind {
    ConfigMap,
    Secret,
    ServiceAccount,
    Role,
    RoleBinding,
    NetworkPolicy,
    /// A kind this operator never creates; skipped during cleanup.
    Unknown(String),
}

impl ResourceKind {
    /// Parse a kind name, ignoring case.
    #[must_use]
    pub fn from_name(kind: &str) -> Self {
        match kind.to_ascii_lowercase().as_str() {
            "configmap" => Self::ConfigMap,
            "secret" => Self::Secret,
            "serviceaccount" => Self::ServiceAccount,
            "role" => Self::Role,
            "rolebinding" => Self::RoleBinding,
            "networkpolicy" => Self::NetworkPolicy,
            _ => Self::Unknown(kind.to_string()),
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::ConfigMap => "ConfigMap",
            Self::Secret => "Secret",
            Self::ServiceAccount => "ServiceAccount",
            Self::Role => "Role",
            Self::RoleBinding => "RoleBinding",
            Self::NetworkPolicy => "NetworkPolicy",
            Self::Unknown(kind) => kind,
        }
    }
}

/// A child resource reference as stored in `status.createdResources`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResourceRef {
    pub kind: ResourceKind,
    pub namespace: String,
    pub name: String,
}

impl ResourceRef {
    pub fn new(kind: ResourceKind, namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            kind,
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Parse `<Kind>:<namespace>/<name>`. Returns `None` for malformed strings.
    #[must_use]
    pub fn parse(encoded: &str) -> Option<Self> {
        let (kind, rest) = encoded.split_once(':')?;
        let (namespace, name) = rest.split_once('/')?;
        if kind.is_empty() || namespace.is_empty() || name.is_empty() || name.contains('/') {
            return None;
        }
        Some(Self::new(ResourceKind::from_name(kind), namespace, name))
    }
}

impl fmt::Display for ResourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}/{}", self.kind.as_str(), self.namespace, self.name)
    }
}

#[must_use]
pub fn has_finalizer(app: &AppConfig) -> bool {
    app.metadata
        .finalizers
        .as_ref()
        .is_some_and(|f| f.iter().any(|x| x == FINALIZER_APP_CONFIG))
}

/// Add the finalizer in memory. Returns `false` if it was already present.
pub fn add_finalizer(app: &mut AppConfig) -> bool {
    if has_finalizer(app) {
        return false;
    }
    app.metadata
        .finalizers
        .get_or_insert_with(Vec::new)
        .push(FINALIZER_APP_CONFIG.to_string());
    true
}

/// Remove the finalizer in memory. Returns `false` if it was absent.
pub fn remove_finalizer(app: &mut AppConfig) -> bool {
    let Some(finalizers) = app.metadata.finalizers.as_mut() else {
        return false;
    };
    let before = finalizers.len();
    finalizers.retain(|f| f != FINALIZER_APP_CONFIG);
    before != finalizers.len()
}

/// Result of a cleanup pass.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CleanupReport {
    /// References deleted (or already gone).
    pub deleted: Vec<String>,
    /// References whose delete failed after retries.
    pub failed: Vec<String>,
    /// Malformed or unknown-kind references.
    pub skipped: Vec<String>,
}

async fn delete_typed<C, K>(cluster: &C, namespace: &str, name: &str) -> Result<(), ClusterError>
where
    C: ClusterApi,
    K: ClusterResource,
{
    match cluster.delete::<K>(namespace, name).await {
        Err(e) if e.is_not_found() => {
            debug!(namespace = %namespace, name = %name, kind = %K::kind(&()), "Resource already gone");
            Ok(())
        }
        other => other,
    }
}

/// Delete one referenced resource. Unknown kinds are rejected by the caller.
async fn delete_resource<C: ClusterApi>(cluster: &C, reference: &ResourceRef) -> Result<(), ClusterError> {
    let (ns, name) = (reference.namespace.as_str(), reference.name.as_str());
    match &reference.kind {
        ResourceKind::ConfigMap => delete_typed::<C, ConfigMap>(cluster, ns, name).await,
        ResourceKind::Secret => delete_typed::<C, Secret>(cluster, ns, name).await,
        ResourceKind::ServiceAccount => delete_typed::<C, ServiceAccount>(cluster, ns, name).await,
        ResourceKind::Role => delete_typed::<C, Role>(cluster, ns, name).await,
        ResourceKind::RoleBinding => delete_typed::<C, RoleBinding>(cluster, ns, name).await,
        ResourceKind::NetworkPolicy => delete_typed::<C, NetworkPolicy>(cluster, ns, name).await,
        ResourceKind::Unknown(_) => Ok(()),
    }
}

/// Delete every entry of `created_resources`, each under its own retry loop.
///
/// Never fails: per-resource errors end up in [`CleanupReport::failed`].
pub async fn cleanup_created_resources<C: ClusterApi>(
    cluster: &C,
    created_resources: &[String],
    policy: &RetryPolicy,
) -> CleanupReport {
    let mut report = CleanupReport::default();

    for encoded in created_resources {
        let Some(reference) = ResourceRef::parse(encoded) else {
            warn!(reference = %encoded, "Skipping malformed resource reference");
            report.skipped.push(encoded.clone());
            continue;
        };

        if let ResourceKind::Unknown(kind) = &reference.kind {
            warn!(reference = %encoded, kind = %kind, "Skipping resource of unknown kind");
            report.skipped.push(encoded.clone());
            continue;
        }

        let operation_name = format!("delete {reference}");
        let reference_ref = &reference;
        let result = retry_with_backoff_if(
            move || delete_resource(cluster, reference_ref),
            policy,
            |e: &ClusterError| !matches!(e.code(), Some(code) if (400..500).contains(&code) && code != 429),
            &operation_name,
        )
        .await;

        match result {
            Ok(()) => {
                info!(reference = %reference, "Deleted resource");
                metrics::record_resource_deleted(reference.kind.as_str());
                report.deleted.push(encoded.clone());
            }
            Err(e) => {
                error!(reference = %reference, error = %e, "Failed to delete resource, continuing cleanup");
                report.failed.push(encoded.clone());
            }
        }
    }

    report
}

#[cfg(test)]
#[path = "finalizers_tests.rs"]
mod finalizers_tests;
