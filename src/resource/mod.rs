//! Typed resource clients.
//!
//! [`ResourceClient`] is the CRUD capability set for one resource kind,
//! scoped to a namespace or to the whole cluster. [`KubeResources`] serves
//! it from `kube::Api`; the advice wrappers instrument it the same way as
//! discovery.

use async_trait::async_trait;
use kube::api::{DeleteParams, ListParams, ObjectList, Patch, PatchParams, PostParams};

use crate::advice::instrument_client;
use crate::error::Result;

mod kube_resources;

pub use kube_resources::KubeResources;

/// Operations on one resource kind.
///
/// Deletions return `Some` while the object is still terminating (for
/// example, held by finalizers) and `None` once the server reports it gone.
#[async_trait]
pub trait ResourceClient: Send + Sync {
    /// The resource kind served by this client.
    type Resource: Clone + Send + Sync;

    async fn create(&self, params: &PostParams, object: &Self::Resource) -> Result<Self::Resource>;

    /// Replace the whole object.
    async fn update(
        &self,
        name: &str,
        params: &PostParams,
        object: &Self::Resource,
    ) -> Result<Self::Resource>;

    /// Replace the status subresource.
    async fn update_status(
        &self,
        name: &str,
        params: &PostParams,
        object: &Self::Resource,
    ) -> Result<Self::Resource>;

    async fn delete(&self, name: &str, params: &DeleteParams) -> Result<Option<Self::Resource>>;

    async fn delete_collection(
        &self,
        params: &DeleteParams,
        list_params: &ListParams,
    ) -> Result<Option<ObjectList<Self::Resource>>>;

    async fn get(&self, name: &str) -> Result<Self::Resource>;

    async fn list(&self, params: &ListParams) -> Result<ObjectList<Self::Resource>>;

    async fn patch(
        &self,
        name: &str,
        params: &PatchParams,
        patch: &Patch<serde_json::Value>,
    ) -> Result<Self::Resource>;
}

instrument_client! {
    trait ResourceClient {
        type Resource;
        async {
            fn create(&self, params: &PostParams, object: &Self::Resource) -> Result<Self::Resource>
                => "Create";
            fn update(&self, name: &str, params: &PostParams, object: &Self::Resource) -> Result<Self::Resource>
                => "Update";
            fn update_status(&self, name: &str, params: &PostParams, object: &Self::Resource) -> Result<Self::Resource>
                => "UpdateStatus";
            fn delete(&self, name: &str, params: &DeleteParams) -> Result<Option<Self::Resource>>
                => "Delete";
            fn delete_collection(&self, params: &DeleteParams, list_params: &ListParams) -> Result<Option<ObjectList<Self::Resource>>>
                => "DeleteCollection";
            fn get(&self, name: &str) -> Result<Self::Resource> => "Get";
            fn list(&self, params: &ListParams) -> Result<ObjectList<Self::Resource>> => "List";
            fn patch(&self, name: &str, params: &PatchParams, patch: &Patch<serde_json::Value>) -> Result<Self::Resource>
                => "Patch";
        }
        sync {}
    }
}
