// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! In-memory [`ClusterApi`] and [`SourceFetcher`] used by unit tests.
//!
//! Objects are stored as JSON keyed by `(kind, namespace, name)`. Failures can be
//! scripted per `(verb, kind, name)` to exercise retry and error paths, and every
//! call is recorded so tests can assert on what the reconciler did.

use crate::cluster::{ClusterApi, ClusterResource};
use crate::errors::{ClusterError, SourceError};
use crate::source::{SourceFetcher, SourceFile, SourceRef};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

type ObjectKey = (String, String, String);

#[derive(Default)]
pub struct FakeCluster {
    objects: Mutex<BTreeMap<ObjectKey, Value>>,
    failures: Mutex<HashMap<(String, String, String), VecDeque<ClusterError>>>,
    calls: Mutex<Vec<String>>,
}

impl FakeCluster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an object without recording a call.
    pub fn insert<K: ClusterResource>(&self, resource: &K) {
        let meta = resource.meta();
        let key = (
            K::kind(&()).to_string(),
            meta.namespace.clone().unwrap_or_default(),
            meta.name.clone().unwrap_or_default(),
        );
        let value = serde_json::to_value(resource).expect("serializable resource");
        self.objects.lock().unwrap().insert(key, value);
    }

    /// Read back a stored object.
    pub fn stored<K: ClusterResource>(&self, namespace: &str, name: &str) -> Option<K> {
        let key = (K::kind(&()).to_string(), namespace.to_string(), name.to_string());
        self.objects
            .lock()
            .unwrap()
            .get(&key)
            .map(|v| serde_json::from_value(v.clone()).expect("stored object deserializes"))
    }

    /// Number of stored objects of a kind.
    pub fn count(&self, kind: &str) -> usize {
        self.objects
            .lock()
            .unwrap()
            .keys()
            .filter(|(k, _, _)| k == kind)
            .count()
    }

    /// Fail the next `times` calls of `verb` on `kind`/`name` with `err`.
    pub fn fail(&self, verb: &str, kind: &str, name: &str, err: ClusterError, times: usize) {
        let mut failures = self.failures.lock().unwrap();
        let queue = failures
            .entry((verb.to_string(), kind.to_string(), name.to_string()))
            .or_default();
        for _ in 0..times {
            queue.push_back(err.clone());
        }
    }

    /// Recorded calls, formatted as `"<verb> <Kind> <ns>/<name>"`.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    /// Recorded calls whose verb is not `get`.
    pub fn writes(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|c| !c.starts_with("get "))
            .collect()
    }

    fn record<K: ClusterResource>(&self, verb: &str, namespace: &str, name: &str) -> Result<(), ClusterError> {
        let kind = K::kind(&()).to_string();
        self.calls
            .lock()
            .unwrap()
            .push(format!("{verb} {kind} {namespace}/{name}"));
        let mut failures = self.failures.lock().unwrap();
        if let Some(queue) = failures.get_mut(&(verb.to_string(), kind, name.to_string())) {
            if let Some(err) = queue.pop_front() {
                return Err(err);
            }
        }
        Ok(())
    }

    fn key<K: ClusterResource>(namespace: &str, name: &str) -> ObjectKey {
        (K::kind(&()).to_string(), namespace.to_string(), name.to_string())
    }

    fn not_found<K: ClusterResource>(name: &str) -> ClusterError {
        ClusterError::api(404, "NotFound", format!("{} \"{name}\" not found", K::kind(&())))
    }

    fn store<K: ClusterResource>(&self, namespace: &str, name: &str, mut value: Value) -> Result<K, ClusterError> {
        if let Some(meta) = value.get_mut("metadata").and_then(Value::as_object_mut) {
            meta.insert("namespace".into(), Value::String(namespace.to_string()));
            meta.insert("name".into(), Value::String(name.to_string()));
        }
        self.objects
            .lock()
            .unwrap()
            .insert(Self::key::<K>(namespace, name), value.clone());
        Ok(serde_json::from_value(value)?)
    }
}

/// RFC 7386 JSON merge patch.
pub fn merge_json(target: &mut Value, patch: &Value) {
    match patch {
        Value::Object(patch_map) => {
            if !target.is_object() {
                *target = Value::Object(serde_json::Map::new());
            }
            if let Value::Object(target_map) = target {
                for (key, value) in patch_map {
                    if value.is_null() {
                        target_map.remove(key);
                    } else {
                        merge_json(target_map.entry(key.clone()).or_insert(Value::Null), value);
                    }
                }
            }
        }
        other => *target = other.clone(),
    }
}

#[async_trait]
impl ClusterApi for FakeCluster {
    async fn get<K: ClusterResource>(&self, namespace: &str, name: &str) -> Result<Option<K>, ClusterError> {
        self.record::<K>("get", namespace, name)?;
        let value = self
            .objects
            .lock()
            .unwrap()
            .get(&Self::key::<K>(namespace, name))
            .cloned();
        match value {
            Some(v) => Ok(Some(serde_json::from_value(v)?)),
            None => Ok(None),
        }
    }

    async fn create<K: ClusterResource>(&self, namespace: &str, resource: &K) -> Result<K, ClusterError> {
        let name = resource.meta().name.clone().unwrap_or_default();
        self.record::<K>("create", namespace, &name)?;
        if self
            .objects
            .lock()
            .unwrap()
            .contains_key(&Self::key::<K>(namespace, &name))
        {
            return Err(ClusterError::api(409, "AlreadyExists", format!("{name} already exists")));
        }
        self.store(namespace, &name, serde_json::to_value(resource)?)
    }

    async fn replace<K: ClusterResource>(&self, namespace: &str, name: &str, resource: &K) -> Result<K, ClusterError> {
        self.record::<K>("replace", namespace, name)?;
        if !self
            .objects
            .lock()
            .unwrap()
            .contains_key(&Self::key::<K>(namespace, name))
        {
            return Err(Self::not_found::<K>(name));
        }
        self.store(namespace, name, serde_json::to_value(resource)?)
    }

    async fn apply<K: ClusterResource>(&self, namespace: &str, name: &str, resource: &K) -> Result<K, ClusterError> {
        self.record::<K>("apply", namespace, name)?;
        let applied = serde_json::to_value(resource)?;
        let existing = self
            .objects
            .lock()
            .unwrap()
            .get(&Self::key::<K>(namespace, name))
            .cloned();
        let merged = match existing {
            Some(mut current) => {
                merge_json(&mut current, &applied);
                current
            }
            None => applied,
        };
        self.store(namespace, name, merged)
    }

    async fn patch_status<K: ClusterResource>(&self, namespace: &str, name: &str, patch: &Value) -> Result<K, ClusterError> {
        self.record::<K>("patch_status", namespace, name)?;
        let existing = self
            .objects
            .lock()
            .unwrap()
            .get(&Self::key::<K>(namespace, name))
            .cloned();
        let mut current = existing.ok_or_else(|| Self::not_found::<K>(name))?;
        merge_json(&mut current, patch);
        self.store(namespace, name, current)
    }

    async fn delete<K: ClusterResource>(&self, namespace: &str, name: &str) -> Result<(), ClusterError> {
        self.record::<K>("delete", namespace, name)?;
        self.objects
            .lock()
            .unwrap()
            .remove(&Self::key::<K>(namespace, name))
            .map(|_| ())
            .ok_or_else(|| Self::not_found::<K>(name))
    }
}

/// Source fetcher serving a fixed file list.
#[derive(Default)]
pub struct FakeSourceFetcher {
    files: Vec<SourceFile>,
    fail_times: AtomicUsize,
    fetches: AtomicUsize,
}

impl FakeSourceFetcher {
    pub fn with_files(files: &[(&str, &str)]) -> Self {
        Self {
            files: files
                .iter()
                .map(|(name, content)| SourceFile {
                    file_name: (*name).to_string(),
                    content: (*content).to_string(),
                })
                .collect(),
            ..Self::default()
        }
    }

    /// Fail the next `times` fetches.
    pub fn failing(self, times: usize) -> Self {
        self.fail_times.store(times, Ordering::SeqCst);
        self
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SourceFetcher for FakeSourceFetcher {
    async fn fetch(&self, source: &SourceRef) -> Result<Vec<SourceFile>, SourceError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let remaining = self.fail_times.load(Ordering::SeqCst);
        if remaining > 0 {
            self.fail_times.store(remaining - 1, Ordering::SeqCst);
            return Err(SourceError::Git {
                operation: "clone",
                repo: source.repo.clone(),
                stderr: "fatal: unable to access repository".to_string(),
            });
        }
        Ok(self.files.clone())
    }
}

/// `AppConfig` fixture with a uid, ready to own children.
pub fn sample_app(namespace: &str, name: &str, app_name: &str) -> crate::crd::AppConfig {
    let mut app = crate::crd::AppConfig::new(
        name,
        crate::crd::AppConfigSpec {
            app_name: app_name.to_string(),
            ..Default::default()
        },
    );
    app.metadata.namespace = Some(namespace.to_string());
    app.metadata.uid = Some(format!("uid-{namespace}-{name}"));
    app.metadata.generation = Some(1);
    app.metadata.resource_version = Some("1".to_string());
    app
}

/// Same as [`sample_app`] with the finalizer already in place.
pub fn active_app(namespace: &str, name: &str, app_name: &str) -> crate::crd::AppConfig {
    let mut app = sample_app(namespace, name, app_name);
    app.metadata.finalizers = Some(vec![crate::labels::FINALIZER_APP_CONFIG.to_string()]);
    app.metadata.labels = Some(std::collections::BTreeMap::from([(
        crate::labels::LABEL_SCHEMA_VERSION.to_string(),
        crate::constants::CURRENT_SCHEMA_VERSION.to_string(),
    )]));
    app
}

/// Mark an `AppConfig` as deleted.
pub fn mark_deleted(app: &mut crate::crd::AppConfig) {
    app.metadata.deletion_timestamp = Some(
        serde_json::from_value(serde_json::json!("2025-06-01T12:00:00Z"))
            .expect("valid timestamp"),
    );
}

/// Context over the fakes with millisecond retry delays.
pub fn test_context(
    cluster: FakeCluster,
    fetcher: FakeSourceFetcher,
) -> crate::context::Context<FakeCluster, FakeSourceFetcher> {
    use crate::reconcilers::retry::RetryPolicy;
    use std::time::Duration;

    let fast = RetryPolicy::new(2, Duration::from_millis(1), Duration::from_millis(2));
    crate::context::Context::new(
        cluster,
        fetcher,
        crate::context::OperatorSettings {
            api_retry: fast,
            cleanup_retry: fast,
        },
    )
}
