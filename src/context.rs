// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Shared context for the `AppConfig` controller and the pod watcher.
//!
//! The controller receives an `Arc<Context>` on every reconcile. It holds:
//! - the cluster API used for every read and write
//! - the source fetcher used to materialize configuration trees
//! - the injection registry shared with the pod watcher task
//! - retry settings taken from the command line
//!
//! The type is generic over its two seams so unit tests can run the full
//! reconciliation against an in-memory cluster.

use crate::cluster::{ClusterApi, KubeCluster};
use crate::injection::InjectionRegistry;
use crate::reconcilers::retry::RetryPolicy;
use crate::source::{GitSourceFetcher, SourceFetcher};

/// Tunables resolved at startup.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OperatorSettings {
    /// Retry policy for synchronizers and rotation.
    pub api_retry: RetryPolicy,
    /// Retry policy for per-resource deletes during finalization.
    pub cleanup_retry: RetryPolicy,
}

impl Default for OperatorSettings {
    fn default() -> Self {
        Self {
            api_retry: RetryPolicy::api(),
            cleanup_retry: RetryPolicy::cleanup(),
        }
    }
}

/// Shared context passed to the reconciler.
pub struct Context<C = KubeCluster, F = GitSourceFetcher> {
    /// Cluster API for all reads and writes
    pub cluster: C,

    /// Fetches configuration trees for ConfigMap sync
    pub source_fetcher: F,

    /// `namespace/name -> AppConfig` for every resource with injection enabled
    pub registry: InjectionRegistry,

    pub settings: OperatorSettings,
}

impl<C: ClusterApi, F: SourceFetcher> Context<C, F> {
    /// Build a context with a fresh, empty registry.
    #[must_use]
    pub fn new(cluster: C, source_fetcher: F, settings: OperatorSettings) -> Self {
        Self {
            cluster,
            source_fetcher,
            registry: InjectionRegistry::new(),
            settings,
        }
    }

    /// Use an existing registry, typically one shared with the pod watcher.
    #[must_use]
    pub fn with_registry(mut self, registry: InjectionRegistry) -> Self {
        self.registry = registry;
        self
    }
}

#[cfg(test)]
#[path = "context_tests.rs"]
mod context_tests;
