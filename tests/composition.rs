//! Decorator composition through shared trait objects.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{APIGroup, APIGroupList, APIResourceList};
use k8s_openapi::apimachinery::pkg::version::Info;
use kube::Client;

use kube_advice::discovery::OpenApiV3;
use kube_advice::test_utils::{mock_client, CountingRecorder, FakeDiscovery, SpanCapture};
use kube_advice::{with_metrics, with_tracing, DiscoveryClient, Result};

/// How `FaultyDiscovery::server_version` misbehaves.
enum Fault {
    Panic,
    Hang,
}

/// Discovery client whose `server_version` never returns normally.
struct FaultyDiscovery {
    inner: FakeDiscovery,
    fault: Fault,
}

impl FaultyDiscovery {
    fn new(client: Client, fault: Fault) -> Self {
        Self {
            inner: FakeDiscovery::new(client),
            fault,
        }
    }
}

#[async_trait]
impl DiscoveryClient for FaultyDiscovery {
    async fn server_version(&self) -> Result<Info> {
        match self.fault {
            Fault::Panic => panic!("inner client panicked"),
            Fault::Hang => futures::future::pending().await,
        }
    }

    async fn server_groups(&self) -> Result<APIGroupList> {
        self.inner.server_groups().await
    }

    async fn server_groups_and_resources(&self) -> Result<(Vec<APIGroup>, Vec<APIResourceList>)> {
        self.inner.server_groups_and_resources().await
    }

    async fn server_preferred_resources(&self) -> Result<Vec<APIResourceList>> {
        self.inner.server_preferred_resources().await
    }

    async fn server_preferred_namespaced_resources(&self) -> Result<Vec<APIResourceList>> {
        self.inner.server_preferred_namespaced_resources().await
    }

    async fn server_resources_for_group_version(
        &self,
        group_version: &str,
    ) -> Result<APIResourceList> {
        self.inner.server_resources_for_group_version(group_version).await
    }

    async fn open_api_schema(&self) -> Result<serde_json::Value> {
        self.inner.open_api_schema().await
    }

    fn open_api_v3(&self) -> OpenApiV3 {
        self.inner.open_api_v3()
    }

    fn rest_client(&self) -> Client {
        self.inner.rest_client()
    }
}

#[tokio::test]
async fn test_tracing_over_metrics() {
    let capture = SpanCapture::new();
    let _guard = capture.set_default();
    let (client, _handle) = mock_client();
    let fake = Arc::new(FakeDiscovery::new(client));
    let recorder = Arc::new(CountingRecorder::new());

    let shared: Arc<dyn DiscoveryClient> = fake.clone();
    let wrapped = with_tracing(with_metrics(shared, recorder.clone()), "Discovery", "");

    let expected = fake.server_groups().await.unwrap();
    let groups = wrapped.server_groups().await.unwrap();

    assert_eq!(groups, expected);
    assert_eq!(fake.calls("server_groups"), 2);
    assert_eq!(recorder.begun(), vec!["server_groups"]);
    assert_eq!(recorder.observed(), vec!["server_groups"]);
    let spans = capture.spans();
    assert_eq!(spans.len(), 1);
    assert_eq!(spans[0].field("otel.name"), Some("KUBE Discovery//ServerGroups"));
    assert!(spans[0].closed);
}

#[tokio::test]
async fn test_metrics_over_tracing() {
    let capture = SpanCapture::new();
    let _guard = capture.set_default();
    let (client, _handle) = mock_client();
    let fake = Arc::new(FakeDiscovery::new(client).failing("server_preferred_resources"));
    let recorder = Arc::new(CountingRecorder::new());

    let shared: Arc<dyn DiscoveryClient> = fake.clone();
    let wrapped = with_metrics(with_tracing(shared, "Discovery", ""), recorder.clone());

    let err = wrapped.server_preferred_resources().await.unwrap_err();

    assert_eq!(err.status_code(), Some(503));
    assert_eq!(fake.calls("server_preferred_resources"), 1);
    assert_eq!(recorder.observed(), vec!["server_preferred_resources"]);
    let spans = capture.spans();
    assert_eq!(spans.len(), 1);
    assert_eq!(spans[0].field("otel.status_code"), Some("error"));
    assert_eq!(spans[0].errors, vec![err.to_string()]);
}

#[tokio::test]
async fn test_rewrapping_trait_objects() {
    let capture = SpanCapture::new();
    let _guard = capture.set_default();
    let (client, _handle) = mock_client();
    let fake = Arc::new(FakeDiscovery::new(client));
    let recorder = Arc::new(CountingRecorder::new());

    let inner: Arc<dyn DiscoveryClient> = fake.clone();
    let metered: Arc<dyn DiscoveryClient> = Arc::new(with_metrics(inner, recorder.clone()));
    let traced: Arc<dyn DiscoveryClient> = Arc::new(with_tracing(metered, "Discovery", ""));

    let list = traced
        .server_resources_for_group_version("apps/v1")
        .await
        .unwrap();

    assert_eq!(list.group_version, "apps/v1");
    assert_eq!(fake.requested_group_versions(), vec!["apps/v1".to_string()]);
    assert_eq!(recorder.observed(), vec!["server_resources_for_group_version"]);
    assert_eq!(capture.spans().len(), 1);
}

#[tokio::test]
async fn test_panicking_inner_releases_recording_and_span() {
    let capture = SpanCapture::new();
    let _guard = capture.set_default();
    let (client, _handle) = mock_client();
    let recorder = Arc::new(CountingRecorder::new());
    let wrapped = with_tracing(
        with_metrics(FaultyDiscovery::new(client, Fault::Panic), recorder.clone()),
        "Discovery",
        "",
    );

    let outcome = AssertUnwindSafe(wrapped.server_version())
        .catch_unwind()
        .await;

    assert!(outcome.is_err());
    assert_eq!(recorder.begun(), vec!["server_version"]);
    assert_eq!(recorder.observed(), vec!["server_version"]);
    let spans = capture.spans();
    assert_eq!(spans.len(), 1);
    assert!(spans[0].closed);
}

#[tokio::test]
async fn test_cancelled_call_releases_recording_and_span() {
    let capture = SpanCapture::new();
    let _guard = capture.set_default();
    let (client, _handle) = mock_client();
    let recorder = Arc::new(CountingRecorder::new());
    let wrapped = with_tracing(
        with_metrics(FaultyDiscovery::new(client, Fault::Hang), recorder.clone()),
        "Discovery",
        "",
    );

    let mut call = wrapped.server_version();
    assert!(futures::poll!(call.as_mut()).is_pending());
    assert_eq!(recorder.begun(), vec!["server_version"]);
    assert!(recorder.observed().is_empty());
    assert!(!capture.spans()[0].closed);

    drop(call);

    assert_eq!(recorder.observed(), vec!["server_version"]);
    let spans = capture.spans();
    assert_eq!(spans.len(), 1);
    assert!(spans[0].closed);
    assert_eq!(spans[0].field("otel.status_code"), None);
}
