//! Discovery backed by `kube::Client`.

use async_trait::async_trait;
use futures::future::try_join_all;
use http::header::ACCEPT;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{
    APIGroup, APIGroupList, APIResourceList, APIVersions, GroupVersionForDiscovery,
};
use k8s_openapi::apimachinery::pkg::version::Info;
use kube::Client;
use tracing::debug;

use super::{DiscoveryClient, OpenApiV3};
use crate::error::{ClientError, Result};

/// Path of the OpenAPI v2 document.
const OPENAPI_V2_PATH: &str = "/openapi/v2";

/// Discovery client that talks to the API server.
#[derive(Clone)]
pub struct KubeDiscovery {
    client: Client,
}

impl KubeDiscovery {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

/// Where a group version's resources are served.
#[derive(Debug, PartialEq, Eq)]
enum GroupVersion<'a> {
    /// Legacy core group, served under `/api/<version>`.
    Core(&'a str),
    /// Named group, served under `/apis/<group>/<version>`.
    Named(&'a str),
}

fn parse_group_version(group_version: &str) -> Result<GroupVersion<'_>> {
    match group_version.split_once('/') {
        None if !group_version.is_empty() => Ok(GroupVersion::Core(group_version)),
        Some((group, version))
            if !group.is_empty() && !version.is_empty() && !version.contains('/') =>
        {
            Ok(GroupVersion::Named(group_version))
        }
        _ => Err(ClientError::InvalidGroupVersion(group_version.to_string())),
    }
}

/// The legacy core group as advertised under `/api`.
fn legacy_group(core: &APIVersions) -> Option<APIGroup> {
    let versions: Vec<GroupVersionForDiscovery> = core
        .versions
        .iter()
        .map(|version| GroupVersionForDiscovery {
            group_version: version.clone(),
            version: version.clone(),
        })
        .collect();
    let preferred_version = versions.first().cloned()?;
    Some(APIGroup {
        name: String::new(),
        preferred_version: Some(preferred_version),
        server_address_by_client_cidrs: None,
        versions,
    })
}

/// Preferred group version, falling back to the first advertised one.
fn preferred_group_version(group: &APIGroup) -> Option<&str> {
    group
        .preferred_version
        .as_ref()
        .or_else(|| group.versions.first())
        .map(|v| v.group_version.as_str())
}

fn without_subresources(mut list: APIResourceList) -> APIResourceList {
    list.resources.retain(|r| !r.name.contains('/'));
    list
}

#[async_trait]
impl DiscoveryClient for KubeDiscovery {
    async fn server_version(&self) -> Result<Info> {
        Ok(self.client.apiserver_version().await?)
    }

    async fn server_groups(&self) -> Result<APIGroupList> {
        let core = self.client.list_core_api_versions().await?;
        let mut groups = self.client.list_api_groups().await?;
        if let Some(legacy) = legacy_group(&core) {
            groups.groups.insert(0, legacy);
        }
        Ok(groups)
    }

    async fn server_groups_and_resources(&self) -> Result<(Vec<APIGroup>, Vec<APIResourceList>)> {
        let groups = self.server_groups().await?.groups;
        let requests = groups
            .iter()
            .flat_map(|group| group.versions.iter())
            .map(|version| self.server_resources_for_group_version(&version.group_version));
        let resources = try_join_all(requests).await?;
        Ok((groups, resources))
    }

    async fn server_preferred_resources(&self) -> Result<Vec<APIResourceList>> {
        let groups = self.server_groups().await?.groups;
        let requests = groups
            .iter()
            .filter_map(preferred_group_version)
            .map(|group_version| self.server_resources_for_group_version(group_version));
        let lists = try_join_all(requests).await?;
        Ok(lists.into_iter().map(without_subresources).collect())
    }

    async fn server_preferred_namespaced_resources(&self) -> Result<Vec<APIResourceList>> {
        let lists = self.server_preferred_resources().await?;
        Ok(lists
            .into_iter()
            .filter_map(|mut list| {
                list.resources.retain(|r| r.namespaced);
                (!list.resources.is_empty()).then_some(list)
            })
            .collect())
    }

    async fn server_resources_for_group_version(
        &self,
        group_version: &str,
    ) -> Result<APIResourceList> {
        debug!(group_version, "Listing server resources");
        let list = match parse_group_version(group_version)? {
            GroupVersion::Core(version) => self.client.list_core_api_resources(version).await?,
            GroupVersion::Named(gv) => self.client.list_api_group_resources(gv).await?,
        };
        Ok(list)
    }

    async fn open_api_schema(&self) -> Result<serde_json::Value> {
        let request = http::Request::get(OPENAPI_V2_PATH)
            .header(ACCEPT, "application/json")
            .body(Vec::new())?;
        Ok(self.client.request(request).await?)
    }

    fn open_api_v3(&self) -> OpenApiV3 {
        OpenApiV3::new(self.client.clone())
    }

    fn rest_client(&self) -> Client {
        self.client.clone()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::test_utils::{mock_client, serve};

    fn api_versions() -> serde_json::Value {
        json!({
            "kind": "APIVersions",
            "apiVersion": "v1",
            "versions": ["v1"],
            "serverAddressByClientCIDRs": [{"clientCIDR": "0.0.0.0/0", "serverAddress": "10.0.0.1:6443"}]
        })
    }

    fn api_groups() -> serde_json::Value {
        json!({
            "kind": "APIGroupList",
            "apiVersion": "v1",
            "groups": [{
                "name": "apps",
                "versions": [{"groupVersion": "apps/v1", "version": "v1"}],
                "preferredVersion": {"groupVersion": "apps/v1", "version": "v1"}
            }, {
                "name": "kyverno.io",
                "versions": [
                    {"groupVersion": "kyverno.io/v1", "version": "v1"},
                    {"groupVersion": "kyverno.io/v2beta1", "version": "v2beta1"}
                ]
            }]
        })
    }

    fn resources(group_version: &str, entries: &[(&str, bool)]) -> serde_json::Value {
        let api_resources: Vec<_> = entries
            .iter()
            .map(|(name, namespaced)| {
                json!({
                    "name": name,
                    "singularName": "",
                    "namespaced": namespaced,
                    "kind": "Thing",
                    "verbs": ["get", "list"]
                })
            })
            .collect();
        json!({
            "kind": "APIResourceList",
            "apiVersion": "v1",
            "groupVersion": group_version,
            "resources": api_resources
        })
    }

    fn cluster_routes() -> Vec<(&'static str, serde_json::Value)> {
        vec![
            ("/api", api_versions()),
            ("/apis", api_groups()),
            (
                "/api/v1",
                resources("v1", &[("pods", true), ("pods/log", true), ("nodes", false)]),
            ),
            (
                "/apis/apps/v1",
                resources("apps/v1", &[("deployments", true), ("deployments/scale", true)]),
            ),
            (
                "/apis/kyverno.io/v1",
                resources("kyverno.io/v1", &[("clusterpolicies", false)]),
            ),
            (
                "/apis/kyverno.io/v2beta1",
                resources("kyverno.io/v2beta1", &[("policyexceptions", true)]),
            ),
        ]
    }

    #[test]
    fn test_parse_group_version() {
        assert_eq!(parse_group_version("v1").unwrap(), GroupVersion::Core("v1"));
        assert_eq!(
            parse_group_version("apps/v1").unwrap(),
            GroupVersion::Named("apps/v1")
        );
        for invalid in ["", "/", "apps/", "/v1", "a/b/c"] {
            assert!(
                matches!(parse_group_version(invalid), Err(ClientError::InvalidGroupVersion(ref gv)) if gv == invalid),
                "{invalid:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_legacy_group_prefers_first_version() {
        let core = APIVersions {
            server_address_by_client_cidrs: vec![],
            versions: vec!["v1".to_string()],
        };
        let group = legacy_group(&core).unwrap();
        assert_eq!(group.name, "");
        assert_eq!(group.preferred_version.unwrap().group_version, "v1");
    }

    #[test]
    fn test_legacy_group_absent_without_versions() {
        let core = APIVersions {
            server_address_by_client_cidrs: vec![],
            versions: vec![],
        };
        assert!(legacy_group(&core).is_none());
    }

    #[tokio::test]
    async fn test_server_version() {
        let (client, handle) = mock_client();
        let server = serve(
            handle,
            vec![(
                "/version",
                json!({
                    "major": "1", "minor": "29", "gitVersion": "v1.29.2",
                    "gitCommit": "abc", "gitTreeState": "clean",
                    "buildDate": "2024-02-14T00:00:00Z", "goVersion": "go1.21.7",
                    "compiler": "gc", "platform": "linux/amd64"
                }),
            )],
        );

        let version = KubeDiscovery::new(client).server_version().await.unwrap();
        assert_eq!(version.git_version, "v1.29.2");
        assert_eq!(version.minor, "29");
        server.abort();
    }

    #[tokio::test]
    async fn test_server_groups_puts_core_first() {
        let (client, handle) = mock_client();
        let server = serve(handle, cluster_routes());

        let groups = KubeDiscovery::new(client).server_groups().await.unwrap();
        let names: Vec<_> = groups.groups.iter().map(|g| g.name.as_str()).collect();
        assert_eq!(names, vec!["", "apps", "kyverno.io"]);
        server.abort();
    }

    #[tokio::test]
    async fn test_server_groups_and_resources_covers_every_version() {
        let (client, handle) = mock_client();
        let server = serve(handle, cluster_routes());

        let (groups, resources) = KubeDiscovery::new(client)
            .server_groups_and_resources()
            .await
            .unwrap();
        assert_eq!(groups.len(), 3);
        let versions: Vec<_> = resources.iter().map(|r| r.group_version.as_str()).collect();
        assert_eq!(
            versions,
            vec!["v1", "apps/v1", "kyverno.io/v1", "kyverno.io/v2beta1"]
        );
        server.abort();
    }

    #[tokio::test]
    async fn test_server_preferred_resources() {
        let (client, handle) = mock_client();
        let server = serve(handle, cluster_routes());

        let lists = KubeDiscovery::new(client)
            .server_preferred_resources()
            .await
            .unwrap();
        let versions: Vec<_> = lists.iter().map(|r| r.group_version.as_str()).collect();
        // kyverno.io has no preferred version, so its first one is used
        assert_eq!(versions, vec!["v1", "apps/v1", "kyverno.io/v1"]);
        let core: Vec<_> = lists[0].resources.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(core, vec!["pods", "nodes"]);
        server.abort();
    }

    #[tokio::test]
    async fn test_server_preferred_namespaced_resources() {
        let (client, handle) = mock_client();
        let server = serve(handle, cluster_routes());

        let lists = KubeDiscovery::new(client)
            .server_preferred_namespaced_resources()
            .await
            .unwrap();
        let names: Vec<_> = lists
            .iter()
            .flat_map(|l| l.resources.iter().map(|r| r.name.as_str()))
            .collect();
        assert_eq!(names, vec!["pods", "deployments"]);
        assert!(lists.iter().all(|l| l.group_version != "kyverno.io/v1"));
        server.abort();
    }

    #[tokio::test]
    async fn test_resources_for_unknown_group_version() {
        let (client, handle) = mock_client();
        let server = serve(handle, cluster_routes());

        let err = KubeDiscovery::new(client)
            .server_resources_for_group_version("batch/v1")
            .await
            .unwrap_err();
        assert!(err.is_not_found());
        server.abort();
    }

    #[tokio::test]
    async fn test_resources_for_malformed_group_version() {
        let (client, _handle) = mock_client();
        let err = KubeDiscovery::new(client)
            .server_resources_for_group_version("apps/v1/extra")
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::InvalidGroupVersion(_)));
    }

    #[tokio::test]
    async fn test_open_api_schema() {
        let (client, handle) = mock_client();
        let server = serve(
            handle,
            vec![("/openapi/v2", json!({"swagger": "2.0", "paths": {}}))],
        );

        let schema = KubeDiscovery::new(client).open_api_schema().await.unwrap();
        assert_eq!(schema["swagger"], "2.0");
        server.abort();
    }

    #[tokio::test]
    async fn test_rest_client_shares_namespace() {
        let (client, _handle) = mock_client();
        let discovery = KubeDiscovery::new(client);
        assert_eq!(discovery.rest_client().default_namespace(), "fake");
    }
}
