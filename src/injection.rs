// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Sidecar injection into newly created pods.
//!
//! The controller registers every `AppConfig` with `sidecarInjection.enabled` in
//! the [`InjectionRegistry`]. Independently, [`run_pod_watcher`] watches pods in all
//! namespaces and, for each pod it sees for the first time, scans the registry in
//! key order and injects the sidecar of the first matching `AppConfig`.
//!
//! Injection is edge-triggered: a pod is considered exactly once, on creation. A
//! failed apply is logged and never retried, and a pod created before its
//! `AppConfig` was registered is never injected.
//!
//! # Matching
//!
//! A pod matches an `AppConfig` when:
//! - both live in the same namespace
//! - every selector label is present on the pod with the same value (an empty
//!   selector matches nothing)
//! - the pod has no container named like the sidecar yet

use crate::cluster::{ClusterApi, KubeCluster};
use crate::crd::AppConfig;
use crate::metrics;
use dashmap::DashMap;
use futures::StreamExt;
use k8s_openapi::api::core::v1::{Container, EmptyDirVolumeSource, EnvVar, Pod, PodSpec, Volume, VolumeMount};
use kube::runtime::watcher::{self, watcher, Event};
use kube::runtime::WatchStreamExt;
use kube::{Api, ResourceExt};
use std::collections::HashSet;
use std::pin::pin;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Concurrent `namespace/name -> AppConfig` map shared by the controller and the
/// pod watcher. Cloning yields a handle to the same map.
#[derive(Clone, Default)]
pub struct InjectionRegistry {
    entries: Arc<DashMap<String, Arc<AppConfig>>>,
}

impl InjectionRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or refresh the entry for `app`.
    pub fn register(&self, app: &AppConfig) {
        let key = app.registry_key();
        let previous = self.entries.insert(key.clone(), Arc::new(app.clone()));
        if previous.is_none() {
            info!(resource = %key, "Registered AppConfig for sidecar injection");
        }
        metrics::set_injection_registry_size(self.entries.len());
    }

    /// Remove the entry for `namespace/name`. Returns `true` if one existed.
    pub fn unregister(&self, namespace: &str, name: &str) -> bool {
        let key = format!("{namespace}/{name}");
        let removed = self.entries.remove(&key).is_some();
        if removed {
            info!(resource = %key, "Unregistered AppConfig from sidecar injection");
        }
        metrics::set_injection_registry_size(self.entries.len());
        removed
    }

    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Point-in-time copy of the entries, sorted by key.
    #[must_use]
    pub fn snapshot(&self) -> Vec<(String, Arc<AppConfig>)> {
        let mut entries: Vec<_> = self
            .entries
            .iter()
            .map(|entry| (entry.key().clone(), Arc::clone(entry.value())))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        entries
    }
}

/// Whether `pod` should receive the sidecar of `app`.
#[must_use]
pub fn should_inject(pod: &Pod, app: &AppConfig) -> bool {
    if pod.namespace() != app.namespace() {
        return false;
    }

    let Some(injection) = app.spec.sidecar_injection.as_ref() else {
        return false;
    };
    if injection.selector_labels.is_empty() {
        return false;
    }
    let labels = pod.labels();
    let selected = injection
        .selector_labels
        .iter()
        .all(|(key, value)| labels.get(key) == Some(value));
    if !selected {
        return false;
    }

    let sidecar_name = app.sidecar_name();
    !pod.spec
        .as_ref()
        .is_some_and(|spec| spec.containers.iter().any(|c| c.name == sidecar_name))
}

/// The sidecar container described by `app`.
#[must_use]
pub fn build_sidecar_container(app: &AppConfig) -> Container {
    let injection = app.spec.sidecar_injection.clone().unwrap_or_default();

    let env: Vec<EnvVar> = injection
        .env
        .iter()
        .map(|(name, value)| EnvVar {
            name: name.clone(),
            value: Some(value.clone()),
            ..EnvVar::default()
        })
        .collect();
    let mounts: Vec<VolumeMount> = injection
        .volume_mounts
        .iter()
        .map(|(name, path)| VolumeMount {
            name: name.clone(),
            mount_path: path.clone(),
            ..VolumeMount::default()
        })
        .collect();

    Container {
        name: app.sidecar_name(),
        image: injection.image,
        env: (!env.is_empty()).then_some(env),
        volume_mounts: (!mounts.is_empty()).then_some(mounts),
        ..Container::default()
    }
}

/// `pod` with the sidecar container and its `emptyDir` volumes appended.
#[must_use]
pub fn build_injected_pod(pod: &Pod, app: &AppConfig) -> Pod {
    let mut injected = pod.clone();
    let spec = injected.spec.get_or_insert_with(PodSpec::default);

    spec.containers.push(build_sidecar_container(app));

    let volume_names = app
        .spec
        .sidecar_injection
        .as_ref()
        .map(|s| s.volumes.clone())
        .unwrap_or_default();
    if !volume_names.is_empty() {
        spec.volumes
            .get_or_insert_with(Vec::new)
            .extend(volume_names.into_iter().map(|name| Volume {
                name,
                empty_dir: Some(EmptyDirVolumeSource::default()),
                ..Volume::default()
            }));
    }

    // Server-side apply rejects bodies carrying these.
    injected.metadata.managed_fields = None;
    injected.metadata.resource_version = None;
    injected.status = None;
    injected
}

/// What happened to a newly created pod.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum InjectionResult {
    /// Sidecar of the `AppConfig` with this registry key was applied.
    Injected(String),
    /// No registered `AppConfig` matched.
    NoMatch,
    /// The pod is already being deleted.
    Terminating,
    /// A matching `AppConfig` was found but the apply failed.
    Failed { app: String, error: String },
}

impl InjectionResult {
    fn label(&self) -> &'static str {
        match self {
            Self::Injected(_) => "injected",
            Self::NoMatch => "no_match",
            Self::Terminating => "terminating",
            Self::Failed { .. } => "failed",
        }
    }
}

/// Inject the first matching sidecar into a newly created pod.
pub async fn handle_pod_created<C: ClusterApi>(
    cluster: &C,
    registry: &InjectionRegistry,
    pod: &Pod,
) -> InjectionResult {
    let namespace = pod.namespace().unwrap_or_default();
    let name = pod.name_any();

    let result = if pod.metadata.deletion_timestamp.is_some() {
        debug!(namespace = %namespace, pod = %name, "Pod is terminating, skipping injection");
        InjectionResult::Terminating
    } else {
        match registry
            .snapshot()
            .into_iter()
            .find(|(_, app)| should_inject(pod, app))
        {
            None => InjectionResult::NoMatch,
            Some((key, app)) => {
                let injected = build_injected_pod(pod, &app);
                match cluster.apply(&namespace, &name, &injected).await {
                    Ok(_) => {
                        info!(namespace = %namespace, pod = %name, app_config = %key, "Injected sidecar");
                        InjectionResult::Injected(key)
                    }
                    Err(e) => {
                        error!(
                            namespace = %namespace,
                            pod = %name,
                            app_config = %key,
                            error = %e,
                            "Failed to inject sidecar"
                        );
                        InjectionResult::Failed {
                            app: key,
                            error: e.to_string(),
                        }
                    }
                }
            }
        }
    };

    metrics::record_sidecar_injection(result.label());
    result
}

/// Turns a pod watch stream into creation events.
///
/// A pod counts as created the first time its UID shows up in an `Apply` or
/// `InitApply` event. Deleted pods are forgotten, and a completed re-list drops
/// every UID it did not contain.
#[derive(Debug, Default)]
pub struct PodCreationTracker {
    seen: HashSet<String>,
    relist: Option<HashSet<String>>,
}

impl PodCreationTracker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one watch event. Returns the pod when the event is its creation.
    pub fn observe(&mut self, event: Event<Pod>) -> Option<Pod> {
        match event {
            Event::Init => {
                self.relist = Some(HashSet::new());
                None
            }
            Event::InitApply(pod) => {
                if let (Some(relist), Some(uid)) = (self.relist.as_mut(), pod.uid()) {
                    relist.insert(uid);
                }
                self.first_sighting(pod)
            }
            Event::InitDone => {
                if let Some(relist) = self.relist.take() {
                    self.seen.retain(|uid| relist.contains(uid));
                }
                None
            }
            Event::Apply(pod) => self.first_sighting(pod),
            Event::Delete(pod) => {
                if let Some(uid) = pod.uid() {
                    self.seen.remove(&uid);
                }
                None
            }
        }
    }

    fn first_sighting(&mut self, pod: Pod) -> Option<Pod> {
        let uid = pod.uid()?;
        self.seen.insert(uid).then_some(pod)
    }

    #[must_use]
    pub fn tracked(&self) -> usize {
        self.seen.len()
    }
}

/// Watch pods in every namespace and inject sidecars on creation.
///
/// Runs until the watch stream ends, which only happens on shutdown. Watch errors
/// are logged and the stream backs off and resumes.
pub async fn run_pod_watcher(cluster: KubeCluster, registry: InjectionRegistry) {
    let pods: Api<Pod> = Api::all(cluster.client().clone());
    let mut events = pin!(watcher(pods, watcher::Config::default()).default_backoff());
    let mut tracker = PodCreationTracker::new();

    info!("Starting pod watcher for sidecar injection");
    while let Some(event) = events.next().await {
        match event {
            Ok(event) => {
                if let Some(pod) = tracker.observe(event) {
                    handle_pod_created(&cluster, &registry, &pod).await;
                }
            }
            Err(e) => warn!(error = %e, "Pod watch error, backing off"),
        }
    }
    info!(tracked_pods = tracker.tracked(), "Pod watcher stopped");
}

#[cfg(test)]
#[path = "injection_tests.rs"]
mod injection_tests;
