//! kube-advice - Instrumented Kubernetes clients
//!
//! Metrics and tracing decorators for Kubernetes API clients. Each client
//! capability set ([`DiscoveryClient`], [`ResourceClient`]) can be wrapped
//! with [`WithMetrics`] and [`WithTracing`] in any order without changing
//! what the client returns.

pub mod advice;
pub mod bootstrap;
pub mod clientset;
pub mod config;
pub mod discovery;
pub mod error;
pub mod metrics;
pub mod resource;
pub mod spans;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use advice::{with_metrics, with_tracing, WithMetrics, WithTracing};
pub use clientset::{Clientset, Instrumentation};
pub use config::Config;
pub use discovery::{DiscoveryClient, KubeDiscovery};
pub use error::{ClientError, Result};
pub use resource::{KubeResources, ResourceClient};
