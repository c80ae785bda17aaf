// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Typed access to namespaced cluster objects.
//!
//! Reconcilers never talk to [`kube::Api`] directly. They go through the
//! [`ClusterApi`] trait so the whole reconciliation state machine can be exercised
//! against an in-memory cluster in unit tests. [`KubeCluster`] is the production
//! implementation backed by a [`kube::Client`].
//!
//! # Operations
//!
//! | Method | Kubernetes verb |
//! |--------|-----------------|
//! | [`ClusterApi::get`] | GET, `404` mapped to `Ok(None)` |
//! | [`ClusterApi::create`] | POST |
//! | [`ClusterApi::replace`] | PUT |
//! | [`ClusterApi::apply`] | PATCH (server-side apply, forced) |
//! | [`ClusterApi::patch_status`] | PATCH `/status` (JSON merge patch) |
//! | [`ClusterApi::delete`] | DELETE |

use crate::constants::FIELD_MANAGER;
use crate::errors::ClusterError;
use async_trait::async_trait;
use kube::api::{DeleteParams, Patch, PatchParams, PostParams};
use kube::core::NamespaceResourceScope;
use kube::{Api, Client, Resource};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt::Debug;
use tracing::debug;

/// Bounds shared by every namespaced object the operator reads or writes.
pub trait ClusterResource:
    Resource<DynamicType = (), Scope = NamespaceResourceScope>
    + Clone
    + Debug
    + Serialize
    + DeserializeOwned
    + Send
    + Sync
    + 'static
{
}

impl<T> ClusterResource for T where
    T: Resource<DynamicType = (), Scope = NamespaceResourceScope>
        + Clone
        + Debug
        + Serialize
        + DeserializeOwned
        + Send
        + Sync
        + 'static
{
}

/// CRUD operations over namespaced resources.
#[async_trait]
pub trait ClusterApi: Send + Sync + 'static {
    /// Fetch an object, returning `None` when it does not exist.
    async fn get<K: ClusterResource>(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<K>, ClusterError>;

    async fn create<K: ClusterResource>(
        &self,
        namespace: &str,
        resource: &K,
    ) -> Result<K, ClusterError>;

    /// Replace an existing object. `resource` must carry the current `resourceVersion`.
    async fn replace<K: ClusterResource>(
        &self,
        namespace: &str,
        name: &str,
        resource: &K,
    ) -> Result<K, ClusterError>;

    /// Server-side apply with the operator's field manager.
    async fn apply<K: ClusterResource>(
        &self,
        namespace: &str,
        name: &str,
        resource: &K,
    ) -> Result<K, ClusterError>;

    /// Merge-patch the status subresource.
    async fn patch_status<K: ClusterResource>(
        &self,
        namespace: &str,
        name: &str,
        patch: &serde_json::Value,
    ) -> Result<K, ClusterError>;

    async fn delete<K: ClusterResource>(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<(), ClusterError>;
}

/// [`ClusterApi`] backed by the Kubernetes API server.
#[derive(Clone)]
pub struct KubeCluster {
    client: Client,
}

impl KubeCluster {
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// The underlying client, for watch streams.
    #[must_use]
    pub fn client(&self) -> &Client {
        &self.client
    }

    fn api<K: ClusterResource>(&self, namespace: &str) -> Api<K> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

#[async_trait]
impl ClusterApi for KubeCluster {
    async fn get<K: ClusterResource>(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<K>, ClusterError> {
        Ok(self.api::<K>(namespace).get_opt(name).await?)
    }

    async fn create<K: ClusterResource>(
        &self,
        namespace: &str,
        resource: &K,
    ) -> Result<K, ClusterError> {
        debug!(namespace = %namespace, kind = %K::kind(&()), "Creating resource");
        Ok(self
            .api::<K>(namespace)
            .create(&PostParams::default(), resource)
            .await?)
    }

    async fn replace<K: ClusterResource>(
        &self,
        namespace: &str,
        name: &str,
        resource: &K,
    ) -> Result<K, ClusterError> {
        debug!(namespace = %namespace, name = %name, kind = %K::kind(&()), "Replacing resource");
        Ok(self
            .api::<K>(namespace)
            .replace(name, &PostParams::default(), resource)
            .await?)
    }

    async fn apply<K: ClusterResource>(
        &self,
        namespace: &str,
        name: &str,
        resource: &K,
    ) -> Result<K, ClusterError> {
        debug!(namespace = %namespace, name = %name, kind = %K::kind(&()), "Applying resource");
        Ok(self
            .api::<K>(namespace)
            .patch(
                name,
                &PatchParams::apply(FIELD_MANAGER).force(),
                &Patch::Apply(resource),
            )
            .await?)
    }

    async fn patch_status<K: ClusterResource>(
        &self,
        namespace: &str,
        name: &str,
        patch: &serde_json::Value,
    ) -> Result<K, ClusterError> {
        Ok(self
            .api::<K>(namespace)
            .patch_status(name, &PatchParams::default(), &Patch::Merge(patch))
            .await?)
    }

    async fn delete<K: ClusterResource>(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<(), ClusterError> {
        debug!(namespace = %namespace, name = %name, kind = %K::kind(&()), "Deleting resource");
        self.api::<K>(namespace)
            .delete(name, &DeleteParams::default())
            .await?;
        Ok(())
    }
}
