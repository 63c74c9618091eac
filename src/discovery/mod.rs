//! Server discovery.
//!
//! [`DiscoveryClient`] is the discovery capability set: what the API server
//! serves (version, groups, resources, OpenAPI documents). It is implemented
//! by:
//! - [`KubeDiscovery`] - Queries the API server through `kube::Client`
//! - [`WithMetrics`](crate::advice::WithMetrics) /
//!   [`WithTracing`](crate::advice::WithTracing) - Instrumented wrappers
//! - `Arc<D>` - Shared clients, including `Arc<dyn DiscoveryClient>`

use async_trait::async_trait;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{APIGroup, APIGroupList, APIResourceList};
use k8s_openapi::apimachinery::pkg::version::Info;
use kube::Client;

use crate::advice::instrument_client;
use crate::error::Result;
use crate::spans::infallible_outcome;

mod kube_discovery;
mod openapi;

pub use kube_discovery::KubeDiscovery;
pub use openapi::OpenApiV3;

/// Discovery operations against an API server.
#[async_trait]
pub trait DiscoveryClient: Send + Sync {
    /// Version of the API server.
    async fn server_version(&self) -> Result<Info>;

    /// Every API group served, the legacy core group first.
    async fn server_groups(&self) -> Result<APIGroupList>;

    /// Every API group together with the resource lists of all its versions.
    async fn server_groups_and_resources(&self) -> Result<(Vec<APIGroup>, Vec<APIResourceList>)>;

    /// Resources of each group's preferred version, without subresources.
    async fn server_preferred_resources(&self) -> Result<Vec<APIResourceList>>;

    /// Namespaced subset of [`server_preferred_resources`](Self::server_preferred_resources).
    async fn server_preferred_namespaced_resources(&self) -> Result<Vec<APIResourceList>>;

    /// Resources served for one group version (`"v1"`, `"apps/v1"`).
    async fn server_resources_for_group_version(&self, group_version: &str)
        -> Result<APIResourceList>;

    /// The OpenAPI v2 document.
    async fn open_api_schema(&self) -> Result<serde_json::Value>;

    /// Client for the OpenAPI v3 endpoints.
    fn open_api_v3(&self) -> OpenApiV3;

    /// The underlying REST client.
    fn rest_client(&self) -> Client;
}

infallible_outcome!(Client, OpenApiV3);

instrument_client! {
    trait DiscoveryClient {
        async {
            fn server_version(&self) -> Result<Info> => "ServerVersion";
            fn server_groups(&self) -> Result<APIGroupList> => "ServerGroups";
            fn server_groups_and_resources(&self) -> Result<(Vec<APIGroup>, Vec<APIResourceList>)>
                => "ServerGroupsAndResources";
            fn server_preferred_resources(&self) -> Result<Vec<APIResourceList>>
                => "ServerPreferredResources";
            fn server_preferred_namespaced_resources(&self) -> Result<Vec<APIResourceList>>
                => "ServerPreferredNamespacedResources";
            fn server_resources_for_group_version(&self, group_version: &str) -> Result<APIResourceList>
                => "ServerResourcesForGroupVersion";
            fn open_api_schema(&self) -> Result<serde_json::Value> => "OpenAPISchema";
        }
        sync {
            fn open_api_v3(&self) -> OpenApiV3 => "OpenAPIV3" as "open_apiv3";
            fn rest_client(&self) -> Client => "RESTClient";
        }
    }
}
