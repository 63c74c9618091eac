//! Aspect-oriented advice for Kubernetes clients.
//!
//! This module provides wrapper types that add orthogonal behavior
//! (metrics, tracing) without touching the clients they wrap.
//!
//! # Architecture
//!
//! Advice is applied at client construction time, not in implementations:
//!
//! ```ignore
//! // Core implementation - plain API calls
//! let discovery = KubeDiscovery::new(client);
//!
//! // Apply advice layers
//! let discovery = with_metrics(discovery, recorder);
//! let discovery = with_tracing(discovery, "Discovery", "");
//!
//! // Use as normal - instrumentation is transparent
//! let version = discovery.server_version().await?;
//! ```
//!
//! Each capability set gets its decorator impls from [`instrument_client!`],
//! which expands one entry per operation into the metrics impl, the tracing
//! impl and an `Arc<D>` forwarding impl.
//!
//! # Available Advice
//!
//! - [`WithMetrics`] - One [`Recording`](crate::metrics::Recording) per call
//! - [`WithTracing`] - One [`ClientSpan`](crate::spans::ClientSpan) per call

use std::sync::Arc;

use crate::metrics::Recorder;

mod macros;

pub(crate) use macros::instrument_client;

/// Wrapper that records a metric for every call on the inner client.
pub struct WithMetrics<D> {
    pub(crate) inner: D,
    pub(crate) recorder: Arc<dyn Recorder>,
}

impl<D> WithMetrics<D> {
    /// Wrap a client with metrics instrumentation.
    ///
    /// # Arguments
    /// * `inner` - The client to wrap
    /// * `recorder` - Sink for per-call measurements, shared with other clients
    pub fn new(inner: D, recorder: Arc<dyn Recorder>) -> Self {
        Self { inner, recorder }
    }

    /// Get a reference to the inner client.
    pub fn inner(&self) -> &D {
        &self.inner
    }

    /// Consume the wrapper and return the inner client.
    pub fn into_inner(self) -> D {
        self.inner
    }
}

/// Wrapper that opens a span around every call on the inner client.
pub struct WithTracing<D> {
    pub(crate) inner: D,
    pub(crate) client: String,
    pub(crate) kind: String,
}

impl<D> WithTracing<D> {
    /// Wrap a client with tracing instrumentation.
    ///
    /// # Arguments
    /// * `inner` - The client to wrap
    /// * `client` - Client label (e.g., "Discovery", "CoreV1")
    /// * `kind` - Resource kind label, empty for kind-less clients
    pub fn new(inner: D, client: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            inner,
            client: client.into(),
            kind: kind.into(),
        }
    }

    pub fn client(&self) -> &str {
        &self.client
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// Get a reference to the inner client.
    pub fn inner(&self) -> &D {
        &self.inner
    }

    /// Consume the wrapper and return the inner client.
    pub fn into_inner(self) -> D {
        self.inner
    }
}

/// Wrap `inner` so every call is measured by `recorder`.
pub fn with_metrics<D>(inner: D, recorder: Arc<dyn Recorder>) -> WithMetrics<D> {
    WithMetrics::new(inner, recorder)
}

/// Wrap `inner` so every call runs in a span labelled `client` / `kind`.
pub fn with_tracing<D>(
    inner: D,
    client: impl Into<String>,
    kind: impl Into<String>,
) -> WithTracing<D> {
    WithTracing::new(inner, client, kind)
}
