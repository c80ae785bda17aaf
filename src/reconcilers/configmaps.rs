// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! ConfigMap synchronization from the configuration repository.
//!
//! Every leaf file under `spec.configPath` at `spec.githubRef` becomes one
//! ConfigMap named `<appName>-<file name>` (lowercased, `.` and `_` replaced by
//! `-`) with a single data key: the original file name.
//!
//! Sync is skipped, not failed, when `spec.githubRepo` is empty.

use crate::cluster::ClusterApi;
use crate::context::Context;
use crate::crd::AppConfig;
use crate::errors::ReconcileError;
use crate::reconcilers::finalizers::{ResourceKind, ResourceRef};
use crate::reconcilers::resources::{
    app_namespace, child_metadata, ensure_resource, UpdateStrategy,
};
use crate::source::{SourceFetcher, SourceFile, SourceRef};
use k8s_openapi::api::core::v1::ConfigMap;
use std::collections::BTreeMap;
use tracing::{debug, info};

/// ConfigMap name for a source file.
///
/// ```
/// use appconfig_operator::reconcilers::configmaps::config_map_name;
///
/// assert_eq!(config_map_name("orders", "App_Settings.yaml"), "orders-app-settings-yaml");
/// ```
#[must_use]
pub fn config_map_name(app_name: &str, file_name: &str) -> String {
    let suffix: String = file_name
        .chars()
        .map(|c| match c {
            '.' | '_' => '-',
            other => other.to_ascii_lowercase(),
        })
        .collect();
    format!("{app_name}-{suffix}")
}

/// Desired ConfigMap for one source file.
///
/// # Errors
///
/// Fails when ownership metadata cannot be derived from `app`.
pub fn build_config_map(app: &AppConfig, file: &SourceFile) -> Result<ConfigMap, ReconcileError> {
    let name = config_map_name(&app.spec.app_name, &file.file_name);
    Ok(ConfigMap {
        metadata: child_metadata(app, &name)?,
        data: Some(BTreeMap::from([(
            file.file_name.clone(),
            file.content.clone(),
        )])),
        ..ConfigMap::default()
    })
}

/// Fetch the configuration tree and ensure one ConfigMap per file.
///
/// Returns references to the ConfigMaps owned by `app`; foreign ConfigMaps with a
/// clashing name are left alone and not returned.
///
/// # Errors
///
/// Returns an error if the fetch fails or any ConfigMap cannot be written.
pub async fn sync_config_maps<C, F>(
    ctx: &Context<C, F>,
    app: &AppConfig,
) -> Result<Vec<ResourceRef>, ReconcileError>
where
    C: ClusterApi,
    F: SourceFetcher,
{
    let Some(repo) = app.spec.github_repo.as_deref().filter(|r| !r.is_empty()) else {
        debug!(resource = %app.registry_key(), "No githubRepo configured, skipping ConfigMap sync");
        return Ok(Vec::new());
    };
    let namespace = app_namespace(app)?;

    let source = SourceRef {
        repo: repo.to_string(),
        git_ref: app.spec.github_ref.clone().unwrap_or_default(),
        path: app.config_path().to_string(),
    };
    let files = ctx.source_fetcher.fetch(&source).await?;

    let mut owned = Vec::with_capacity(files.len());
    for file in &files {
        let desired = build_config_map(app, file)?;
        let name = config_map_name(&app.spec.app_name, &file.file_name);
        let outcome =
            ensure_resource(&ctx.cluster, &namespace, &desired, UpdateStrategy::Apply).await?;
        if outcome.is_owned() {
            let reference = ResourceRef::new(ResourceKind::ConfigMap, namespace.as_str(), name);
            if !owned.contains(&reference) {
                owned.push(reference);
            }
        }
    }

    info!(
        namespace = %namespace,
        app = %app.spec.app_name,
        files = files.len(),
        "Synchronized ConfigMaps"
    );
    Ok(owned)
}

#[cfg(test)]
#[path = "configmaps_tests.rs"]
mod configmaps_tests;
