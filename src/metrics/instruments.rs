//! OTel-native metrics instruments.
//!
//! Instruments are created lazily from the global meter, so they bind to
//! whatever meter provider is installed before the first client call.
//! Without one, the global no-op provider swallows every measurement.
//!
//! Naming follows OTel semantic conventions (dot-separated).
//! The OTel Collector / Prometheus exporter converts dots to underscores.

use std::sync::LazyLock;

use opentelemetry::metrics::{Counter, Histogram, Meter};
use opentelemetry::{global, KeyValue};

static METER: LazyLock<Meter> = LazyLock::new(|| global::meter("kube-advice"));

// ============================================================================
// Client Queries
// ============================================================================

/// Total client queries issued against the API server.
pub static CLIENT_QUERIES_TOTAL: LazyLock<Counter<u64>> = LazyLock::new(|| {
    METER
        .u64_counter("kube.client.queries")
        .with_description("Total Kubernetes client queries")
        .build()
});

/// Duration of client queries.
pub static CLIENT_QUERY_DURATION: LazyLock<Histogram<f64>> = LazyLock::new(|| {
    METER
        .f64_histogram("kube.client.query.duration")
        .with_description("Kubernetes client query duration")
        .with_unit("s")
        .build()
});

// ============================================================================
// Helper
// ============================================================================

/// Create a client_type label.
pub fn client_type_attr(client_type: &str) -> KeyValue {
    KeyValue::new("client_type", client_type.to_string())
}

/// Create a client_kind label.
pub fn client_kind_attr(kind: &str) -> KeyValue {
    KeyValue::new("client_kind", kind.to_string())
}

/// Create a client_namespace label.
pub fn client_namespace_attr(namespace: &str) -> KeyValue {
    KeyValue::new("client_namespace", namespace.to_string())
}

/// Create an operation label.
pub fn operation_attr(operation: &'static str) -> KeyValue {
    KeyValue::new("operation", operation)
}
