// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! RBAC synchronization.
//!
//! From `spec.rbac` the controller ensures:
//!
//! - one `ServiceAccount` (`serviceAccountName`, default `appName`), created once and
//!   never updated so tokens and image pull secrets added by others survive
//! - one `Role` per entry of `roles`, granting `get`/`list`/`watch` on ConfigMaps
//! - one `RoleBinding` per entry of `roleBindings`, binding the derived role to the
//!   service account
//!
//! The bound role is derived from the binding name, see [`role_for_binding`].

use crate::cluster::ClusterApi;
use crate::context::Context;
use crate::crd::{AppConfig, RbacSpec};
use crate::errors::ReconcileError;
use crate::reconcilers::finalizers::{ResourceKind, ResourceRef};
use crate::reconcilers::resources::{
    app_namespace, child_metadata, ensure_resource, UpdateStrategy,
};
use crate::source::SourceFetcher;
use k8s_openapi::api::core::v1::ServiceAccount;
use k8s_openapi::api::rbac::v1::{PolicyRule, Role, RoleBinding, RoleRef, Subject};
use tracing::{info, warn};

const RBAC_API_GROUP: &str = "rbac.authorization.k8s.io";

/// Name of the service account, falling back to the app name.
#[must_use]
pub fn service_account_name<'a>(app: &'a AppConfig, rbac: &'a RbacSpec) -> &'a str {
    rbac.service_account_name
        .as_deref()
        .filter(|name| !name.is_empty())
        .unwrap_or(&app.spec.app_name)
}

/// Role bound by `binding`.
///
/// Strips a trailing `Binding` or `-binding` from the binding name. If the result
/// is not one of `roles` and exactly one role is configured, that role is used.
///
/// ```
/// use appconfig_operator::reconcilers::rbac::role_for_binding;
///
/// let roles = vec!["reader".to_string()];
/// assert_eq!(role_for_binding("readerBinding", &roles), "reader");
/// assert_eq!(role_for_binding("reader-binding", &roles), "reader");
/// assert_eq!(role_for_binding("ops", &roles), "reader");
/// ```
#[must_use]
pub fn role_for_binding(binding: &str, roles: &[String]) -> String {
    let derived = binding
        .strip_suffix("-binding")
        .or_else(|| binding.strip_suffix("Binding"))
        .filter(|stem| !stem.is_empty())
        .unwrap_or(binding);

    if roles.iter().any(|r| r == derived) {
        return derived.to_string();
    }
    match roles {
        [only] => only.clone(),
        _ => derived.to_string(),
    }
}

/// Read-only access to ConfigMaps.
#[must_use]
pub fn config_reader_rules() -> Vec<PolicyRule> {
    vec![PolicyRule {
        api_groups: Some(vec![String::new()]),
        resources: Some(vec!["configmaps".to_string()]),
        verbs: vec!["get".to_string(), "list".to_string(), "watch".to_string()],
        ..PolicyRule::default()
    }]
}

/// # Errors
///
/// Fails when ownership metadata cannot be derived from `app`.
pub fn build_service_account(app: &AppConfig, name: &str) -> Result<ServiceAccount, ReconcileError> {
    Ok(ServiceAccount {
        metadata: child_metadata(app, name)?,
        ..ServiceAccount::default()
    })
}

/// # Errors
///
/// Fails when ownership metadata cannot be derived from `app`.
pub fn build_role(app: &AppConfig, name: &str) -> Result<Role, ReconcileError> {
    Ok(Role {
        metadata: child_metadata(app, name)?,
        rules: Some(config_reader_rules()),
    })
}

/// # Errors
///
/// Fails when ownership metadata cannot be derived from `app`.
pub fn build_role_binding(
    app: &AppConfig,
    name: &str,
    role: &str,
    service_account: &str,
) -> Result<RoleBinding, ReconcileError> {
    let namespace = app_namespace(app)?;
    Ok(RoleBinding {
        metadata: child_metadata(app, name)?,
        role_ref: RoleRef {
            api_group: RBAC_API_GROUP.to_string(),
            kind: "Role".to_string(),
            name: role.to_string(),
        },
        subjects: Some(vec![Subject {
            kind: "ServiceAccount".to_string(),
            name: service_account.to_string(),
            namespace: Some(namespace),
            ..Subject::default()
        }]),
    })
}

/// Ensure the service account, roles and role bindings of `spec.rbac`.
///
/// Returns references to the objects owned by `app`.
///
/// # Errors
///
/// Returns the first cluster error encountered.
pub async fn sync_rbac<C, F>(
    ctx: &Context<C, F>,
    app: &AppConfig,
) -> Result<Vec<ResourceRef>, ReconcileError>
where
    C: ClusterApi,
    F: SourceFetcher,
{
    let Some(rbac) = app.spec.rbac.as_ref() else {
        return Ok(Vec::new());
    };
    let namespace = app_namespace(app)?;
    let sa_name = service_account_name(app, rbac);
    let mut owned = Vec::new();

    let sa = build_service_account(app, sa_name)?;
    if ensure_resource(&ctx.cluster, &namespace, &sa, UpdateStrategy::CreateOnly)
        .await?
        .is_owned()
    {
        owned.push(ResourceRef::new(ResourceKind::ServiceAccount, namespace.as_str(), sa_name));
    }

    for role_name in &rbac.roles {
        let role = build_role(app, role_name)?;
        if ensure_resource(&ctx.cluster, &namespace, &role, UpdateStrategy::Apply)
            .await?
            .is_owned()
        {
            owned.push(ResourceRef::new(ResourceKind::Role, namespace.as_str(), role_name.as_str()));
        }
    }

    for binding_name in &rbac.role_bindings {
        let role = role_for_binding(binding_name, &rbac.roles);
        if !rbac.roles.contains(&role) {
            warn!(
                namespace = %namespace,
                binding = %binding_name,
                role = %role,
                "RoleBinding refers to a role this AppConfig does not declare"
            );
        }
        let binding = build_role_binding(app, binding_name, &role, sa_name)?;
        if ensure_resource(&ctx.cluster, &namespace, &binding, UpdateStrategy::Apply)
            .await?
            .is_owned()
        {
            owned.push(ResourceRef::new(
                ResourceKind::RoleBinding,
                namespace.as_str(),
                binding_name.as_str(),
            ));
        }
    }

    info!(
        namespace = %namespace,
        service_account = %sa_name,
        roles = rbac.roles.len(),
        role_bindings = rbac.role_bindings.len(),
        "Synchronized RBAC"
    );
    Ok(owned)
}

#[cfg(test)]
#[path = "rbac_tests.rs"]
mod rbac_tests;
