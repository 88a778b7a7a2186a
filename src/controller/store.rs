//! Resource store seams for BridgeCluster and BridgeTeam objects
//!
//! The reconcilers read and write through [`ClusterStore`] and [`TeamStore`]
//! so they can be driven by in-memory stores in tests. Writes carry the object's
//! `resourceVersion`, so concurrent writers get [`StoreError::Conflict`].

use async_trait::async_trait;
use kube::api::PostParams;
use kube::{Api, Client, Resource};

use crate::controller::error::StoreError;
use crate::crd::{BridgeCluster, BridgeTeam};

#[async_trait]
pub trait ClusterStore: Send + Sync {
    async fn get(&self, namespace: &str, name: &str) -> Result<BridgeCluster, StoreError>;

    /// Replace metadata and spec; used for the finalizer list only
    async fn update(&self, cluster: &BridgeCluster) -> Result<BridgeCluster, StoreError>;

    /// Replace the status subresource
    async fn update_status(&self, cluster: &BridgeCluster) -> Result<BridgeCluster, StoreError>;
}

/// Store backed by the Kubernetes API
#[derive(Clone)]
pub struct KubeClusterStore {
    client: Client,
}

impl KubeClusterStore {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn api(&self, namespace: &str) -> Api<BridgeCluster> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

#[async_trait]
pub trait TeamStore: Send + Sync {
    async fn get(&self, namespace: &str, name: &str) -> Result<BridgeTeam, StoreError>;

    /// Replace the status subresource
    async fn update_status(&self, team: &BridgeTeam) -> Result<BridgeTeam, StoreError>;
}

/// BridgeTeam store backed by the Kubernetes API
#[derive(Clone)]
pub struct KubeTeamStore {
    client: Client,
}

impl KubeTeamStore {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn api(&self, namespace: &str) -> Api<BridgeTeam> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

fn object_key<K: Resource>(object: &K) -> Result<(&str, &str), StoreError> {
    let metadata = object.meta();
    let name = metadata
        .name
        .as_deref()
        .ok_or_else(|| StoreError::NotFound("object has no name".to_string()))?;
    let namespace = metadata.namespace.as_deref().unwrap_or("default");
    Ok((namespace, name))
}

#[async_trait]
impl ClusterStore for KubeClusterStore {
    async fn get(&self, namespace: &str, name: &str) -> Result<BridgeCluster, StoreError> {
        Ok(self.api(namespace).get(name).await?)
    }

    async fn update(&self, cluster: &BridgeCluster) -> Result<BridgeCluster, StoreError> {
        let (namespace, name) = object_key(cluster)?;
        Ok(self
            .api(namespace)
            .replace(name, &PostParams::default(), cluster)
            .await?)
    }

    async fn update_status(&self, cluster: &BridgeCluster) -> Result<BridgeCluster, StoreError> {
        let (namespace, name) = object_key(cluster)?;
        let data = serde_json::to_vec(cluster)
            .map_err(|e| StoreError::Kube(kube::Error::SerdeError(e)))?;
        Ok(self
            .api(namespace)
            .replace_status(name, &PostParams::default(), data)
            .await?)
    }
}

#[async_trait]
impl TeamStore for KubeTeamStore {
    async fn get(&self, namespace: &str, name: &str) -> Result<BridgeTeam, StoreError> {
        Ok(self.api(namespace).get(name).await?)
    }

    async fn update_status(&self, team: &BridgeTeam) -> Result<BridgeTeam, StoreError> {
        let (namespace, name) = object_key(team)?;
        let data =
            serde_json::to_vec(team).map_err(|e| StoreError::Kube(kube::Error::SerdeError(e)))?;
        Ok(self
            .api(namespace)
            .replace_status(name, &PostParams::default(), data)
            .await?)
    }
}
