// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Custom Resource Definition for application bootstrap configuration.
//!
//! This module defines the [`AppConfig`] custom resource, the single declarative
//! entry point of the operator. One `AppConfig` describes everything an application
//! needs bootstrapped in its namespace:
//!
//! - ConfigMaps materialized from a git repository ([`AppConfigSpec::github_repo`])
//! - RBAC objects ([`RbacSpec`])
//! - A namespace-local network policy ([`NetworkPolicySpec`])
//! - Rotating credentials ([`SecretRotationSpec`])
//! - A sidecar injected into matching pods ([`SidecarInjectionSpec`])
//!
//! # Example
//!
//! ```yaml
//! apiVersion: microservice.example.com/v1
//! kind: AppConfig
//! metadata:
//!   name: orders
//!   namespace: shop
//! spec:
//!   appName: orders
//!   githubRepo: https://github.com/example/orders-config.git
//!   githubRef: main
//!   configPath: /prod
//!   rbac:
//!     serviceAccountName: orders
//!     roles: [orders-reader]
//!     roleBindings: [orders-readerBinding]
//!   networkPolicy:
//!     enabled: true
//!     ingress: ["app=gateway"]
//!   secretRotation:
//!     enabled: true
//!     intervalHours: 12
//!     strategy: database
//!     strategyConfig:
//!       dbType: postgresql
//!   sidecarInjection:
//!     enabled: true
//!     image: envoyproxy/envoy:v1.31.0
//!     selectorLabels:
//!       app: orders
//!     env:
//!       LOG_LEVEL: info
//!     volumes: [envoy-config]
//!     volumeMounts:
//!       envoy-config: /etc/envoy
//! ```

use crate::constants::{
    DEFAULT_CONFIG_PATH, DEFAULT_ROTATION_INTERVAL_HOURS, DEFAULT_ROTATION_STRATEGY,
    SECRET_NAME_SUFFIX, SIDECAR_NAME_SUFFIX,
};
use indexmap::IndexMap;
use kube::{CustomResource, ResourceExt};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Condition represents an observation of a resource's current state.
///
/// `AppConfig` only ever writes conditions of type `Reconciled`; see
/// [`crate::status_reasons`].
#[derive(Clone, Debug, Serialize, Deserialize, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    /// Type of condition. Always `Reconciled` for `AppConfig`.
    pub r#type: String,

    /// Status of the condition: True or False.
    pub status: String,

    /// Brief CamelCase reason for the condition's last transition.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    /// Human-readable message indicating details about the transition.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// Time the condition was recorded (RFC3339 format).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_transition_time: Option<String>,
}

/// RBAC objects created for the application.
#[derive(Clone, Debug, Serialize, Deserialize, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RbacSpec {
    /// Name of the `ServiceAccount`. Defaults to `spec.appName`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service_account_name: Option<String>,

    /// Roles to create. Each grants read access (get/list/watch) to ConfigMaps.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub roles: Vec<String>,

    /// RoleBindings to create, binding a role to the service account.
    ///
    /// The bound role is derived from the binding name by dropping its
    /// `Binding` / `-binding` suffix (`readerBinding` binds role `reader`).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub role_bindings: Vec<String>,
}

/// Network isolation for the application's pods.
#[derive(Clone, Debug, Serialize, Deserialize, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct NetworkPolicySpec {
    /// Create the `<appName>-network-policy` object.
    #[serde(default)]
    pub enabled: bool,

    /// Allowed ingress peers. Each entry is either a `key=value` pod label
    /// selector or a CIDR block (`10.0.0.0/8`). Empty denies all ingress.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ingress: Vec<String>,

    /// Allowed egress peers, same format as `ingress`. Empty leaves egress unrestricted.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub egress: Vec<String>,
}

/// Scheduled credential rotation.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SecretRotationSpec {
    /// Enable rotation.
    #[serde(default)]
    pub enabled: bool,

    /// Hours between rotations, at most one year.
    #[serde(default = "default_interval_hours")]
    #[schemars(range(min = 1, max = 8760))]
    pub interval_hours: u32,

    /// Names of the secrets to rotate. Defaults to `<appName>-secrets`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sources: Vec<String>,

    /// Generation strategy: `default`, `database`, `api-key` or `tls` (case-insensitive).
    #[serde(default = "default_strategy")]
    pub strategy: String,

    /// Strategy parameters, e.g. `passwordLength`, `dbType`, `keyLength`, `commonName`.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub strategy_config: BTreeMap<String, String>,
}

impl Default for SecretRotationSpec {
    fn default() -> Self {
        Self {
            enabled: false,
            interval_hours: default_interval_hours(),
            sources: Vec::new(),
            strategy: default_strategy(),
            strategy_config: BTreeMap::new(),
        }
    }
}

fn default_interval_hours() -> u32 {
    DEFAULT_ROTATION_INTERVAL_HOURS
}

fn default_strategy() -> String {
    DEFAULT_ROTATION_STRATEGY.to_string()
}

/// Sidecar injected into newly created pods matching `selectorLabels`.
#[derive(Clone, Debug, Serialize, Deserialize, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SidecarInjectionSpec {
    /// Enable injection for this `AppConfig`.
    #[serde(default)]
    pub enabled: bool,

    /// Sidecar container name. Defaults to `<appName>-sidecar`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Sidecar container image.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,

    /// Labels a pod must carry (all of them, same values) to receive the sidecar.
    /// An empty selector matches nothing.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub selector_labels: BTreeMap<String, String>,

    /// Environment variables, injected in declaration order.
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    #[schemars(with = "BTreeMap<String, String>")]
    pub env: IndexMap<String, String>,

    /// `emptyDir` volumes appended to the pod.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub volumes: Vec<String>,

    /// Volume name to mount path.
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    #[schemars(with = "BTreeMap<String, String>")]
    pub volume_mounts: IndexMap<String, String>,
}

/// `AppConfig` declares the bootstrap configuration of one application.
#[derive(CustomResource, Clone, Debug, Serialize, Deserialize, Default, PartialEq, JsonSchema)]
#[kube(
    group = "microservice.example.com",
    version = "v1",
    kind = "AppConfig",
    namespaced,
    shortname = "appcfg",
    doc = "AppConfig declares the bootstrap configuration of one application: ConfigMaps sourced from git, RBAC objects, a network policy, rotating secrets and sidecar injection."
)]
#[kube(status = "AppConfigStatus", derive = "PartialEq")]
#[kube(printcolumn = r#"{"name":"App","type":"string","jsonPath":".spec.appName"}"#)]
#[kube(
    printcolumn = r#"{"name":"Last Sync","type":"string","jsonPath":".status.lastSyncTime"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct AppConfigSpec {
    /// Application name, used as prefix for every child resource.
    pub app_name: String,

    /// Git repository holding configuration files. ConfigMap sync is skipped when empty.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub github_repo: Option<String>,

    /// Branch, tag or commit to check out. Empty uses the remote default branch.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub github_ref: Option<String>,

    /// Directory inside the repository. Defaults to the repository root.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config_path: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub rbac: Option<RbacSpec>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub network_policy: Option<NetworkPolicySpec>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub secret_rotation: Option<SecretRotationSpec>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub sidecar_injection: Option<SidecarInjectionSpec>,
}

/// `AppConfig` status
#[derive(Clone, Debug, Serialize, Deserialize, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AppConfigStatus {
    /// Append-only condition history. The last entry is the current state.
    #[serde(default)]
    pub conditions: Vec<Condition>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_sync_time: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_secret_rotation_time: Option<String>,

    /// Child resources as `<Kind>:<namespace>/<name>`, without duplicates.
    /// Finalization deletes exactly these.
    #[serde(default)]
    pub created_resources: Vec<String>,
}

impl AppConfig {
    /// Registry key (`namespace/name`) of this resource.
    #[must_use]
    pub fn registry_key(&self) -> String {
        format!("{}/{}", self.namespace().unwrap_or_default(), self.name_any())
    }

    /// Container name used for sidecar injection.
    #[must_use]
    pub fn sidecar_name(&self) -> String {
        self.spec
            .sidecar_injection
            .as_ref()
            .and_then(|s| s.name.clone())
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| format!("{}{SIDECAR_NAME_SUFFIX}", self.spec.app_name))
    }

    /// Directory inside the source repository to read files from.
    #[must_use]
    pub fn config_path(&self) -> &str {
        self.spec
            .config_path
            .as_deref()
            .filter(|p| !p.is_empty())
            .unwrap_or(DEFAULT_CONFIG_PATH)
    }

    /// Secrets targeted by rotation.
    #[must_use]
    pub fn rotation_targets(&self) -> Vec<String> {
        match &self.spec.secret_rotation {
            Some(rotation) if !rotation.sources.is_empty() => rotation.sources.clone(),
            _ => vec![format!("{}{SECRET_NAME_SUFFIX}", self.spec.app_name)],
        }
    }

    /// True when sidecar injection is configured and enabled.
    #[must_use]
    pub fn injection_enabled(&self) -> bool {
        self.spec
            .sidecar_injection
            .as_ref()
            .is_some_and(|s| s.enabled)
    }

    /// Rotation settings when rotation is configured and enabled.
    #[must_use]
    pub fn enabled_rotation(&self) -> Option<&SecretRotationSpec> {
        self.spec.secret_rotation.as_ref().filter(|r| r.enabled)
    }
}
