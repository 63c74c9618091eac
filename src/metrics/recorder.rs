//! OpenTelemetry-backed client query recorder.

use std::fmt;

use opentelemetry::KeyValue;
use serde::Deserialize;

use super::instruments::{
    client_kind_attr, client_namespace_attr, client_type_attr, operation_attr,
    CLIENT_QUERIES_TOTAL, CLIENT_QUERY_DURATION,
};
use super::{Measurement, RecordError, Recorder};

/// Which client family issued a query.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClientType {
    /// Typed clients for built-in and custom resources.
    #[default]
    Kube,
    /// Dynamic (untyped) clients.
    Dynamic,
    /// Metadata-only clients.
    Metadata,
    /// API aggregation clients.
    Aggregator,
}

impl ClientType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClientType::Kube => "kube",
            ClientType::Dynamic => "dynamic",
            ClientType::Metadata => "metadata",
            ClientType::Aggregator => "aggregator",
        }
    }
}

impl fmt::Display for ClientType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Namespaces for which namespaced queries are recorded.
///
/// Exclusion wins over inclusion. An empty include list admits every
/// namespace that is not excluded.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct NamespaceFilter {
    pub include: Vec<String>,
    pub exclude: Vec<String>,
}

impl NamespaceFilter {
    pub fn allows(&self, namespace: &str) -> bool {
        if self.exclude.iter().any(|ns| ns == namespace) {
            return false;
        }
        self.include.is_empty() || self.include.iter().any(|ns| ns == namespace)
    }
}

/// Records client queries into the `kube.client.*` instruments.
///
/// Emits per call:
/// - `kube.client.queries` - Query count
/// - `kube.client.query.duration` - Query latency in seconds
///
/// Labelled by `client_type`, `client_kind`, `operation` and, for
/// namespaced clients, `client_namespace`.
#[derive(Debug, Clone)]
pub struct ClientQueryRecorder {
    client_type: ClientType,
    kind: String,
    namespace: Option<String>,
    filter: NamespaceFilter,
}

impl ClientQueryRecorder {
    /// Recorder for a cluster-scoped client (or one with no namespace).
    pub fn clustered(client_type: ClientType, kind: impl Into<String>) -> Self {
        Self {
            client_type,
            kind: kind.into(),
            namespace: None,
            filter: NamespaceFilter::default(),
        }
    }

    /// Recorder for a client bound to `namespace`.
    ///
    /// Queries are skipped when `filter` rejects the namespace.
    pub fn namespaced(
        client_type: ClientType,
        kind: impl Into<String>,
        namespace: impl Into<String>,
        filter: NamespaceFilter,
    ) -> Self {
        Self {
            client_type,
            kind: kind.into(),
            namespace: Some(namespace.into()),
            filter,
        }
    }

    pub fn client_type(&self) -> ClientType {
        self.client_type
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    /// Whether queries from this recorder are recorded at all.
    pub fn is_recording(&self) -> bool {
        self.namespace
            .as_deref()
            .map_or(true, |ns| self.filter.allows(ns))
    }

    /// Labels attached to a measurement of `operation`.
    pub fn attributes(&self, operation: &'static str) -> Vec<KeyValue> {
        let mut attrs = vec![
            client_type_attr(self.client_type.as_str()),
            client_kind_attr(&self.kind),
            operation_attr(operation),
        ];
        if let Some(namespace) = &self.namespace {
            attrs.push(client_namespace_attr(namespace));
        }
        attrs
    }
}

impl Recorder for ClientQueryRecorder {
    fn observe(&self, measurement: &Measurement) -> Result<(), RecordError> {
        if !self.is_recording() {
            return Ok(());
        }
        let attrs = self.attributes(measurement.operation);
        CLIENT_QUERIES_TOTAL.add(1, &attrs);
        CLIENT_QUERY_DURATION.record(measurement.elapsed.as_secs_f64(), &attrs);
        Ok(())
    }
}
