//! Bootstrap utilities for binaries using instrumented clients.
//!
//! Installs the global `tracing` subscriber and, with the `otel` feature,
//! the OpenTelemetry exporters that client spans and query metrics flow to.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::LOG_ENV_VAR;

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV_VAR).unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Initialize tracing with KUBE_ADVICE_LOG environment variable.
///
/// Defaults to "info" level if KUBE_ADVICE_LOG is not set.
pub fn init_tracing() {
    tracing_subscriber::registry()
        .with(env_filter())
        .with(tracing_subscriber::fmt::layer())
        .init();
}

#[cfg(feature = "otel")]
pub use self::otel::{init_telemetry, TelemetryError, TelemetryGuard};

#[cfg(feature = "otel")]
mod otel {
    use opentelemetry::trace::TracerProvider as _;
    use opentelemetry::{global, KeyValue};
    use opentelemetry_otlp::WithExportConfig;
    use opentelemetry_sdk::metrics::{PeriodicReader, SdkMeterProvider};
    use opentelemetry_sdk::{runtime, trace as sdktrace, Resource};
    use tracing::warn;
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    use super::env_filter;
    use crate::config::TelemetryConfig;

    /// Name of the tracer client spans are exported under.
    const TRACER_NAME: &str = "kube-advice";

    #[derive(Debug, thiserror::Error)]
    pub enum TelemetryError {
        #[error("failed to build OTLP span exporter: {0}")]
        SpanExporter(String),

        #[error("failed to build OTLP metric exporter: {0}")]
        MetricExporter(String),
    }

    /// Keeps the telemetry providers alive. Flushes and shuts them down on drop.
    pub struct TelemetryGuard {
        tracer_provider: Option<sdktrace::TracerProvider>,
        meter_provider: Option<SdkMeterProvider>,
    }

    impl Drop for TelemetryGuard {
        fn drop(&mut self) {
            if let Some(provider) = self.tracer_provider.take() {
                if let Err(e) = provider.shutdown() {
                    warn!(
                        target: "kube_advice::telemetry",
                        error = %e,
                        "Failed to shut down tracer provider"
                    );
                }
            }
            if let Some(provider) = self.meter_provider.take() {
                if let Err(e) = provider.shutdown() {
                    warn!(
                        target: "kube_advice::telemetry",
                        error = %e,
                        "Failed to shut down meter provider"
                    );
                }
            }
        }
    }

    fn resource(config: &TelemetryConfig) -> Resource {
        Resource::new(vec![KeyValue::new(
            "service.name",
            config.service_name.clone(),
        )])
    }

    fn tracer_provider(
        config: &TelemetryConfig,
    ) -> Result<sdktrace::TracerProvider, TelemetryError> {
        let mut builder = opentelemetry_otlp::SpanExporter::builder().with_tonic();
        if let Some(endpoint) = &config.otlp_endpoint {
            builder = builder.with_endpoint(endpoint);
        }
        let exporter = builder
            .build()
            .map_err(|e| TelemetryError::SpanExporter(e.to_string()))?;

        Ok(sdktrace::TracerProvider::builder()
            .with_batch_exporter(exporter, runtime::Tokio)
            .with_resource(resource(config))
            .build())
    }

    fn meter_provider(config: &TelemetryConfig) -> Result<SdkMeterProvider, TelemetryError> {
        let mut builder = opentelemetry_otlp::MetricExporter::builder().with_tonic();
        if let Some(endpoint) = &config.otlp_endpoint {
            builder = builder.with_endpoint(endpoint);
        }
        let exporter = builder
            .build()
            .map_err(|e| TelemetryError::MetricExporter(e.to_string()))?;

        let reader = PeriodicReader::builder(exporter, runtime::Tokio).build();
        Ok(SdkMeterProvider::builder()
            .with_reader(reader)
            .with_resource(resource(config))
            .build())
    }

    /// Initialize tracing and OTLP export of client spans and query metrics.
    ///
    /// Installs the global subscriber (filtered by `KUBE_ADVICE_LOG`) with a
    /// `fmt` layer and a `tracing-opentelemetry` layer, and sets the global
    /// meter provider read by [`instruments`](crate::metrics::instruments).
    /// Must be called inside a tokio runtime.
    pub fn init_telemetry(config: &TelemetryConfig) -> Result<TelemetryGuard, TelemetryError> {
        let tracer_provider = tracer_provider(config)?;
        let meter_provider = meter_provider(config)?;

        let tracer = tracer_provider.tracer(TRACER_NAME);
        global::set_tracer_provider(tracer_provider.clone());
        global::set_meter_provider(meter_provider.clone());

        tracing_subscriber::registry()
            .with(env_filter())
            .with(tracing_subscriber::fmt::layer())
            .with(tracing_opentelemetry::layer().with_tracer(tracer))
            .init();

        Ok(TelemetryGuard {
            tracer_provider: Some(tracer_provider),
            meter_provider: Some(meter_provider),
        })
    }
}
