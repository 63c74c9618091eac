//! `kube::Api`-backed resource client.

use std::fmt::Debug;

use async_trait::async_trait;
use k8s_openapi::NamespaceResourceScope;
use kube::api::{Api, DeleteParams, ListParams, ObjectList, Patch, PatchParams, PostParams};
use kube::{Client, Resource};
use serde::de::DeserializeOwned;
use serde::Serialize;

use super::ResourceClient;
use crate::error::Result;

/// Resource client over `kube::Api<K>`.
#[derive(Clone)]
pub struct KubeResources<K> {
    api: Api<K>,
}

impl<K> KubeResources<K>
where
    K: Resource,
    K::DynamicType: Default,
{
    /// Client for `K` objects in `namespace`.
    pub fn namespaced(client: Client, namespace: &str) -> Self
    where
        K: Resource<Scope = NamespaceResourceScope>,
    {
        Self::new(Api::namespaced(client, namespace))
    }

    /// Client for `K` across the cluster.
    ///
    /// For namespaced kinds, reads span every namespace.
    pub fn all(client: Client) -> Self {
        Self::new(Api::all(client))
    }
}

impl<K> KubeResources<K> {
    pub fn new(api: Api<K>) -> Self {
        Self { api }
    }
}

#[async_trait]
impl<K> ResourceClient for KubeResources<K>
where
    K: Resource + Clone + DeserializeOwned + Serialize + Debug + Send + Sync + 'static,
{
    type Resource = K;

    async fn create(&self, params: &PostParams, object: &K) -> Result<K> {
        Ok(self.api.create(params, object).await?)
    }

    async fn update(&self, name: &str, params: &PostParams, object: &K) -> Result<K> {
        Ok(self.api.replace(name, params, object).await?)
    }

    async fn update_status(&self, name: &str, params: &PostParams, object: &K) -> Result<K> {
        let body = serde_json::to_vec(object)?;
        Ok(self.api.replace_status(name, params, body).await?)
    }

    async fn delete(&self, name: &str, params: &DeleteParams) -> Result<Option<K>> {
        Ok(self.api.delete(name, params).await?.left())
    }

    async fn delete_collection(
        &self,
        params: &DeleteParams,
        list_params: &ListParams,
    ) -> Result<Option<ObjectList<K>>> {
        Ok(self.api.delete_collection(params, list_params).await?.left())
    }

    async fn get(&self, name: &str) -> Result<K> {
        Ok(self.api.get(name).await?)
    }

    async fn list(&self, params: &ListParams) -> Result<ObjectList<K>> {
        Ok(self.api.list(params).await?)
    }

    async fn patch(
        &self,
        name: &str,
        params: &PatchParams,
        patch: &Patch<serde_json::Value>,
    ) -> Result<K> {
        Ok(self.api.patch(name, params, patch).await?)
    }
}
