//! Instrumented clients on one connection.
//!
//! [`Instrumentation`] decides which advice a client gets, from [`Config`].
//! [`Clientset`] hands out discovery and resource clients over a shared
//! `kube::Client`, each wrapped with metrics then tracing.

use std::fmt::Debug;
use std::sync::Arc;

use k8s_openapi::NamespaceResourceScope;
use kube::{Client, Resource};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use crate::advice::{with_metrics, with_tracing};
use crate::config::Config;
use crate::discovery::{DiscoveryClient, KubeDiscovery};
use crate::error::Result;
use crate::metrics::{ClientQueryRecorder, ClientType, NamespaceFilter};
use crate::resource::{KubeResources, ResourceClient};

/// Client label of the discovery client.
pub const DISCOVERY_CLIENT: &str = "Discovery";

/// Client label for a group version, client-go style.
///
/// The first DNS label of the group, capitalized, followed by the
/// capitalized version. The legacy core group is `Core`.
///
/// ```
/// use kube_advice::clientset::client_label;
///
/// assert_eq!(client_label("", "v1"), "CoreV1");
/// assert_eq!(client_label("apps", "v1"), "AppsV1");
/// assert_eq!(client_label("kyverno.io", "v1beta1"), "KyvernoV1beta1");
/// ```
pub fn client_label(group: &str, version: &str) -> String {
    let name = match group.split('.').next() {
        Some(name) if !name.is_empty() => name,
        _ => "core",
    };
    let name: String = name.chars().filter(|c| c.is_ascii_alphanumeric()).collect();
    format!("{}{}", capitalize(&name), capitalize(version))
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Client and kind labels of resource type `K`.
fn labels<K>() -> (String, String)
where
    K: Resource,
    K::DynamicType: Default,
{
    let dt = K::DynamicType::default();
    (
        client_label(&K::group(&dt), &K::version(&dt)),
        K::kind(&dt).into_owned(),
    )
}

/// Metric settings shared by every recorder a [`Instrumentation`] builds.
#[derive(Debug, Clone, Default)]
struct MetricsSettings {
    client_type: ClientType,
    namespaces: NamespaceFilter,
}

/// Advice applied to clients.
#[derive(Debug, Clone)]
pub struct Instrumentation {
    metrics: Option<MetricsSettings>,
    tracing: bool,
}

impl Default for Instrumentation {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

impl Instrumentation {
    pub fn from_config(config: &Config) -> Self {
        let metrics = config.metrics.enabled.then(|| MetricsSettings {
            client_type: config.metrics.client_type,
            namespaces: config.metrics.namespaces.clone(),
        });
        Self {
            metrics,
            tracing: config.tracing.enabled,
        }
    }

    /// No advice: clients are returned unwrapped.
    pub fn none() -> Self {
        Self {
            metrics: None,
            tracing: false,
        }
    }

    pub fn metrics_enabled(&self) -> bool {
        self.metrics.is_some()
    }

    pub fn tracing_enabled(&self) -> bool {
        self.tracing
    }

    /// Recorder for clients of `kind`, scoped to `namespace` when given.
    ///
    /// `None` when metrics are disabled.
    pub fn recorder(&self, kind: &str, namespace: Option<&str>) -> Option<ClientQueryRecorder> {
        let settings = self.metrics.as_ref()?;
        Some(match namespace {
            Some(namespace) => ClientQueryRecorder::namespaced(
                settings.client_type,
                kind,
                namespace,
                settings.namespaces.clone(),
            ),
            None => ClientQueryRecorder::clustered(settings.client_type, kind),
        })
    }

    /// Wrap a discovery client.
    pub fn discovery<D>(&self, inner: D) -> Arc<dyn DiscoveryClient>
    where
        D: DiscoveryClient + 'static,
    {
        let mut client: Arc<dyn DiscoveryClient> = Arc::new(inner);
        if let Some(recorder) = self.recorder(DISCOVERY_CLIENT, None) {
            client = Arc::new(with_metrics(client, Arc::new(recorder)));
        }
        if self.tracing {
            client = Arc::new(with_tracing(client, DISCOVERY_CLIENT, ""));
        }
        client
    }

    /// Wrap a resource client labelled `client` / `kind`.
    pub fn resources<R>(
        &self,
        inner: R,
        client: &str,
        kind: &str,
        namespace: Option<&str>,
    ) -> Arc<dyn ResourceClient<Resource = R::Resource>>
    where
        R: ResourceClient + 'static,
        R::Resource: 'static,
    {
        let mut wrapped: Arc<dyn ResourceClient<Resource = R::Resource>> = Arc::new(inner);
        if let Some(recorder) = self.recorder(kind, namespace) {
            wrapped = Arc::new(with_metrics(wrapped, Arc::new(recorder)));
        }
        if self.tracing {
            wrapped = Arc::new(with_tracing(wrapped, client, kind));
        }
        wrapped
    }
}

/// Instrumented clients over one `kube::Client`.
#[derive(Clone)]
pub struct Clientset {
    client: Client,
    instrumentation: Instrumentation,
    discovery: Arc<dyn DiscoveryClient>,
}

impl Clientset {
    pub fn new(client: Client, instrumentation: Instrumentation) -> Self {
        let discovery = instrumentation.discovery(KubeDiscovery::new(client.clone()));
        Self {
            client,
            instrumentation,
            discovery,
        }
    }

    /// Connect using the ambient kubeconfig or in-cluster environment.
    pub async fn try_default(instrumentation: Instrumentation) -> Result<Self> {
        let client = Client::try_default().await?;
        debug!(
            namespace = client.default_namespace(),
            metrics = instrumentation.metrics_enabled(),
            tracing = instrumentation.tracing_enabled(),
            "Connected clientset"
        );
        Ok(Self::new(client, instrumentation))
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    pub fn instrumentation(&self) -> &Instrumentation {
        &self.instrumentation
    }

    /// The instrumented discovery client.
    pub fn discovery(&self) -> Arc<dyn DiscoveryClient> {
        Arc::clone(&self.discovery)
    }

    /// Instrumented client for `K` objects in `namespace`.
    pub fn namespaced<K>(&self, namespace: &str) -> Arc<dyn ResourceClient<Resource = K>>
    where
        K: Resource<Scope = NamespaceResourceScope>
            + Clone
            + DeserializeOwned
            + Serialize
            + Debug
            + Send
            + Sync
            + 'static,
        K::DynamicType: Default,
    {
        let (client, kind) = labels::<K>();
        self.instrumentation.resources(
            KubeResources::<K>::namespaced(self.client.clone(), namespace),
            &client,
            &kind,
            Some(namespace),
        )
    }

    /// Instrumented client for `K` across the cluster.
    pub fn cluster<K>(&self) -> Arc<dyn ResourceClient<Resource = K>>
    where
        K: Resource + Clone + DeserializeOwned + Serialize + Debug + Send + Sync + 'static,
        K::DynamicType: Default,
    {
        let (client, kind) = labels::<K>();
        self.instrumentation
            .resources(KubeResources::<K>::all(self.client.clone()), &client, &kind, None)
    }
}
