//! Test utilities and mock implementations.
//!
//! Fakes for the client capability sets, a recorder that counts calls, a
//! `tracing` layer that captures client spans, and a `kube::Client` over a
//! `tower-test` mock service. None of these need a cluster.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use http::{Request, Response, StatusCode};
use k8s_openapi::api::core::v1::ConfigMap;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{
    APIGroup, APIGroupList, APIResource, APIResourceList, GroupVersionForDiscovery, ListMeta,
    ObjectMeta,
};
use k8s_openapi::apimachinery::pkg::version::Info;
use kube::api::{DeleteParams, ListParams, ObjectList, Patch, PatchParams, PostParams};
use kube::client::Body;
use kube::core::TypeMeta;
use kube::error::ErrorResponse;
use kube::Client;
use serde_json::json;
use tokio::task::JoinHandle;
use tracing::field::{Field, Visit};
use tracing::span::{Attributes, Id, Record};
use tracing::subscriber::DefaultGuard;
use tracing::{Event, Subscriber};
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::Layer;

use crate::discovery::{DiscoveryClient, OpenApiV3};
use crate::error::{ClientError, Result};
use crate::metrics::{Measurement, RecordError, Recorder};
use crate::resource::ResourceClient;

/// Target prefix of every span this crate emits.
const CRATE_TARGET: &str = "kube_advice";
/// Target of client span events.
const CLIENT_TARGET: &str = "kube_advice::client";

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn api_error(code: u16, reason: &str, message: impl Into<String>) -> ClientError {
    ClientError::Kube(kube::Error::Api(ErrorResponse {
        status: "Failure".to_string(),
        message: message.into(),
        reason: reason.to_string(),
        code,
    }))
}

// ============================================================================
// Mock API server
// ============================================================================

/// Server side of a [`mock_client`].
pub type MockHandle = tower_test::mock::Handle<Request<Body>, Response<Body>>;

/// A `kube::Client` whose requests arrive on the returned handle.
///
/// The client's default namespace is `fake`. Must be called inside a tokio
/// runtime.
pub fn mock_client() -> (Client, MockHandle) {
    let (service, handle) = tower_test::mock::pair::<Request<Body>, Response<Body>>();
    (Client::new(service, "fake"), handle)
}

/// Answer requests on `handle` from a fixed route table.
///
/// Routes match on the request path alone; the method and query string are
/// ignored. Unknown paths get a `404` Status body.
pub fn serve(
    mut handle: MockHandle,
    routes: Vec<(&'static str, serde_json::Value)>,
) -> JoinHandle<()> {
    let routes: HashMap<&'static str, serde_json::Value> = routes.into_iter().collect();
    tokio::spawn(async move {
        while let Some((request, send)) = handle.next_request().await {
            let path = request.uri().path().to_string();
            let (status, body) = match routes.get(path.as_str()) {
                Some(body) => (StatusCode::OK, body.clone()),
                None => (
                    StatusCode::NOT_FOUND,
                    json!({
                        "kind": "Status",
                        "apiVersion": "v1",
                        "metadata": {},
                        "status": "Failure",
                        "message": format!("the server could not find the requested resource ({path})"),
                        "reason": "NotFound",
                        "code": 404
                    }),
                ),
            };
            let bytes = serde_json::to_vec(&body).unwrap_or_default();
            let response = Response::builder()
                .status(status)
                .header(http::header::CONTENT_TYPE, "application/json")
                .body(Body::from(bytes))
                .unwrap_or_else(|_| Response::new(Body::empty()));
            send.send_response(response);
        }
    })
}

// ============================================================================
// Fake clients
// ============================================================================

fn group(name: &str, versions: &[&str]) -> APIGroup {
    let versions: Vec<_> = versions
        .iter()
        .map(|version| GroupVersionForDiscovery {
            group_version: if name.is_empty() {
                version.to_string()
            } else {
                format!("{name}/{version}")
            },
            version: version.to_string(),
        })
        .collect();
    APIGroup {
        name: name.to_string(),
        preferred_version: versions.first().cloned(),
        versions,
        ..Default::default()
    }
}

fn resource_list(group_version: &str, resources: &[(&str, &str, bool)]) -> APIResourceList {
    APIResourceList {
        group_version: group_version.to_string(),
        resources: resources
            .iter()
            .map(|(name, kind, namespaced)| APIResource {
                name: name.to_string(),
                kind: kind.to_string(),
                namespaced: *namespaced,
                verbs: vec!["get".to_string(), "list".to_string()],
                ..Default::default()
            })
            .collect(),
    }
}

/// In-memory discovery client.
///
/// Serves a fixed two-group cluster (core `v1` and `apps/v1`), counts calls
/// per operation, and can be told to fail one operation with a `503`.
pub struct FakeDiscovery {
    client: Client,
    failing: Option<&'static str>,
    calls: Mutex<HashMap<&'static str, usize>>,
    group_versions: Mutex<Vec<String>>,
}

impl FakeDiscovery {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            failing: None,
            calls: Mutex::new(HashMap::new()),
            group_versions: Mutex::new(Vec::new()),
        }
    }

    /// Make `operation` (snake_case method name) return an API error.
    pub fn failing(mut self, operation: &'static str) -> Self {
        self.failing = Some(operation);
        self
    }

    /// Number of calls to `operation` so far.
    pub fn calls(&self, operation: &str) -> usize {
        lock(&self.calls).get(operation).copied().unwrap_or(0)
    }

    /// Arguments received by `server_resources_for_group_version`, in order.
    pub fn requested_group_versions(&self) -> Vec<String> {
        lock(&self.group_versions).clone()
    }

    fn call(&self, operation: &'static str) -> Result<()> {
        *lock(&self.calls).entry(operation).or_default() += 1;
        if self.failing == Some(operation) {
            return Err(api_error(
                503,
                "ServiceUnavailable",
                "the server is currently unable to handle the request",
            ));
        }
        Ok(())
    }

    fn groups() -> Vec<APIGroup> {
        vec![group("", &["v1"]), group("apps", &["v1"])]
    }

    fn resource_lists() -> Vec<APIResourceList> {
        vec![
            resource_list("v1", &[("pods", "Pod", true), ("nodes", "Node", false)]),
            resource_list("apps/v1", &[("deployments", "Deployment", true)]),
        ]
    }
}

#[async_trait]
impl DiscoveryClient for FakeDiscovery {
    async fn server_version(&self) -> Result<Info> {
        self.call("server_version")?;
        Ok(Info {
            major: "1".to_string(),
            minor: "29".to_string(),
            git_version: "v1.29.0".to_string(),
            platform: "linux/amd64".to_string(),
            ..Default::default()
        })
    }

    async fn server_groups(&self) -> Result<APIGroupList> {
        self.call("server_groups")?;
        Ok(APIGroupList {
            groups: Self::groups(),
        })
    }

    async fn server_groups_and_resources(&self) -> Result<(Vec<APIGroup>, Vec<APIResourceList>)> {
        self.call("server_groups_and_resources")?;
        Ok((Self::groups(), Self::resource_lists()))
    }

    async fn server_preferred_resources(&self) -> Result<Vec<APIResourceList>> {
        self.call("server_preferred_resources")?;
        Ok(Self::resource_lists())
    }

    async fn server_preferred_namespaced_resources(&self) -> Result<Vec<APIResourceList>> {
        self.call("server_preferred_namespaced_resources")?;
        Ok(vec![
            resource_list("v1", &[("pods", "Pod", true)]),
            resource_list("apps/v1", &[("deployments", "Deployment", true)]),
        ])
    }

    async fn server_resources_for_group_version(
        &self,
        group_version: &str,
    ) -> Result<APIResourceList> {
        self.call("server_resources_for_group_version")?;
        lock(&self.group_versions).push(group_version.to_string());
        Ok(resource_list(group_version, &[]))
    }

    async fn open_api_schema(&self) -> Result<serde_json::Value> {
        self.call("open_api_schema")?;
        Ok(json!({"swagger": "2.0", "info": {"title": "Kubernetes"}}))
    }

    fn open_api_v3(&self) -> OpenApiV3 {
        *lock(&self.calls).entry("open_api_v3").or_default() += 1;
        OpenApiV3::new(self.client.clone())
    }

    fn rest_client(&self) -> Client {
        *lock(&self.calls).entry("rest_client").or_default() += 1;
        self.client.clone()
    }
}

/// A `ConfigMap` named `name` in namespace `default`.
pub fn config_map(name: &str) -> ConfigMap {
    ConfigMap {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some("default".to_string()),
            ..Default::default()
        },
        data: Some(BTreeMap::from([("mode".to_string(), "strict".to_string())])),
        ..Default::default()
    }
}

/// In-memory `ConfigMap` store.
///
/// Deletes complete immediately, so they return `None`. Reads of missing
/// objects return a `404`.
pub struct FakeResources {
    objects: Mutex<BTreeMap<String, ConfigMap>>,
}

impl FakeResources {
    pub fn new(objects: Vec<ConfigMap>) -> Self {
        let objects = objects
            .into_iter()
            .map(|object| (object.metadata.name.clone().unwrap_or_default(), object))
            .collect();
        Self {
            objects: Mutex::new(objects),
        }
    }

    fn not_found(name: &str) -> ClientError {
        api_error(404, "NotFound", format!("configmaps \"{name}\" not found"))
    }

    fn store(&self, object: &ConfigMap) -> ConfigMap {
        let name = object.metadata.name.clone().unwrap_or_default();
        lock(&self.objects).insert(name, object.clone());
        object.clone()
    }
}

#[async_trait]
impl ResourceClient for FakeResources {
    type Resource = ConfigMap;

    async fn create(&self, _params: &PostParams, object: &ConfigMap) -> Result<ConfigMap> {
        Ok(self.store(object))
    }

    async fn update(
        &self,
        _name: &str,
        _params: &PostParams,
        object: &ConfigMap,
    ) -> Result<ConfigMap> {
        Ok(self.store(object))
    }

    async fn update_status(
        &self,
        _name: &str,
        _params: &PostParams,
        object: &ConfigMap,
    ) -> Result<ConfigMap> {
        Ok(self.store(object))
    }

    async fn delete(&self, name: &str, _params: &DeleteParams) -> Result<Option<ConfigMap>> {
        match lock(&self.objects).remove(name) {
            Some(_) => Ok(None),
            None => Err(Self::not_found(name)),
        }
    }

    async fn delete_collection(
        &self,
        _params: &DeleteParams,
        _list_params: &ListParams,
    ) -> Result<Option<ObjectList<ConfigMap>>> {
        lock(&self.objects).clear();
        Ok(None)
    }

    async fn get(&self, name: &str) -> Result<ConfigMap> {
        lock(&self.objects)
            .get(name)
            .cloned()
            .ok_or_else(|| Self::not_found(name))
    }

    async fn list(&self, _params: &ListParams) -> Result<ObjectList<ConfigMap>> {
        Ok(ObjectList {
            types: TypeMeta {
                api_version: "v1".to_string(),
                kind: "ConfigMapList".to_string(),
            },
            metadata: ListMeta::default(),
            items: lock(&self.objects).values().cloned().collect(),
        })
    }

    async fn patch(
        &self,
        name: &str,
        _params: &PatchParams,
        _patch: &Patch<serde_json::Value>,
    ) -> Result<ConfigMap> {
        self.get(name).await
    }
}

// ============================================================================
// Recorder
// ============================================================================

/// Recorder that logs operation names instead of exporting them.
#[derive(Default)]
pub struct CountingRecorder {
    begun: Mutex<Vec<&'static str>>,
    observed: Mutex<Vec<&'static str>>,
    fail: bool,
}

impl CountingRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every `observe` return an error.
    pub fn failing(mut self) -> Self {
        self.fail = true;
        self
    }

    /// Operations started, in order.
    pub fn begun(&self) -> Vec<&'static str> {
        lock(&self.begun).clone()
    }

    /// Operations observed, in order.
    pub fn observed(&self) -> Vec<&'static str> {
        lock(&self.observed).clone()
    }
}

impl Recorder for CountingRecorder {
    fn begin(&self, operation: &'static str) {
        lock(&self.begun).push(operation);
    }

    fn observe(&self, measurement: &Measurement) -> std::result::Result<(), RecordError> {
        lock(&self.observed).push(measurement.operation);
        if self.fail {
            return Err(RecordError::Unavailable("collector offline".to_string()));
        }
        Ok(())
    }
}

// ============================================================================
// Span capture
// ============================================================================

/// A span seen by [`SpanCapture`].
#[derive(Debug, Clone, Default)]
pub struct CapturedSpan {
    pub name: &'static str,
    pub fields: BTreeMap<String, String>,
    /// `error` field of each event emitted inside the span.
    pub errors: Vec<String>,
    pub closed: bool,
}

impl CapturedSpan {
    /// Recorded value of `name`, if any.
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }
}

struct SpanIndex(usize);

#[derive(Default)]
struct FieldVisitor(BTreeMap<String, String>);

impl Visit for FieldVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        self.0.insert(field.name().to_string(), value.to_string());
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        self.0.insert(field.name().to_string(), format!("{value:?}"));
    }

    fn record_error(&mut self, field: &Field, value: &(dyn std::error::Error + 'static)) {
        self.0.insert(field.name().to_string(), value.to_string());
    }
}

/// `tracing` layer that records this crate's spans in creation order.
#[derive(Clone, Default)]
pub struct SpanCapture {
    spans: Arc<Mutex<Vec<CapturedSpan>>>,
}

impl SpanCapture {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install as the thread's default subscriber until the guard drops.
    pub fn set_default(&self) -> DefaultGuard {
        tracing::subscriber::set_default(tracing_subscriber::registry().with(self.clone()))
    }

    /// Snapshot of the spans seen so far.
    pub fn spans(&self) -> Vec<CapturedSpan> {
        lock(&self.spans).clone()
    }

    fn update<S>(&self, id: &Id, ctx: &Context<'_, S>, f: impl FnOnce(&mut CapturedSpan))
    where
        S: Subscriber + for<'a> LookupSpan<'a>,
    {
        let Some(span) = ctx.span(id) else { return };
        let extensions = span.extensions();
        if let Some(SpanIndex(index)) = extensions.get::<SpanIndex>() {
            if let Some(captured) = lock(&self.spans).get_mut(*index) {
                f(captured);
            }
        }
    }
}

impl<S> Layer<S> for SpanCapture
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_new_span(&self, attrs: &Attributes<'_>, id: &Id, ctx: Context<'_, S>) {
        if !attrs.metadata().target().starts_with(CRATE_TARGET) {
            return;
        }
        let mut visitor = FieldVisitor::default();
        attrs.record(&mut visitor);
        let index = {
            let mut spans = lock(&self.spans);
            spans.push(CapturedSpan {
                name: attrs.metadata().name(),
                fields: visitor.0,
                ..Default::default()
            });
            spans.len() - 1
        };
        if let Some(span) = ctx.span(id) {
            span.extensions_mut().insert(SpanIndex(index));
        }
    }

    fn on_record(&self, id: &Id, values: &Record<'_>, ctx: Context<'_, S>) {
        let mut visitor = FieldVisitor::default();
        values.record(&mut visitor);
        self.update(id, &ctx, |span| span.fields.extend(visitor.0));
    }

    fn on_event(&self, event: &Event<'_>, ctx: Context<'_, S>) {
        if event.metadata().target() != CLIENT_TARGET {
            return;
        }
        let Some(span) = ctx.event_span(event) else {
            return;
        };
        let mut visitor = FieldVisitor::default();
        event.record(&mut visitor);
        if let Some(error) = visitor.0.remove("error") {
            self.update(&span.id(), &ctx, |captured| captured.errors.push(error));
        }
    }

    fn on_close(&self, id: Id, ctx: Context<'_, S>) {
        self.update(&id, &ctx, |span| span.closed = true);
    }
}
