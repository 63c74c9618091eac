//! Application configuration.
//!
//! Controls which advice is applied to the clients a
//! [`Clientset`](crate::clientset::Clientset) hands out, and where telemetry
//! is exported. Loaded from YAML files and environment variables.

use serde::Deserialize;

use crate::metrics::{ClientType, NamespaceFilter};

/// Default configuration file name.
pub const DEFAULT_CONFIG_FILE: &str = "kube-advice.yaml";
/// Environment variable for configuration file path.
pub const CONFIG_ENV_VAR: &str = "KUBE_ADVICE_CONFIG";
/// Prefix for configuration environment variables.
pub const CONFIG_ENV_PREFIX: &str = "KUBE_ADVICE";
/// Environment variable for logging configuration.
pub const LOG_ENV_VAR: &str = "KUBE_ADVICE_LOG";

/// Default OpenTelemetry service name.
pub const DEFAULT_SERVICE_NAME: &str = "kube-advice";

/// Main application configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Client query metrics.
    pub metrics: MetricsConfig,
    /// Client call spans.
    pub tracing: TracingConfig,
    /// Telemetry export.
    pub telemetry: TelemetryConfig,
}

/// Client query metrics configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    pub enabled: bool,
    /// Client family reported in the `client_type` attribute.
    pub client_type: ClientType,
    /// Namespaces recorded by namespaced clients.
    pub namespaces: NamespaceFilter,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            client_type: ClientType::default(),
            namespaces: NamespaceFilter::default(),
        }
    }
}

/// Client span configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TracingConfig {
    pub enabled: bool,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

/// OpenTelemetry export configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    /// `service.name` resource attribute.
    pub service_name: String,
    /// OTLP gRPC endpoint. Falls back to the exporter's defaults
    /// (`OTEL_EXPORTER_OTLP_ENDPOINT`, then `http://localhost:4317`) when unset.
    pub otlp_endpoint: Option<String>,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: DEFAULT_SERVICE_NAME.to_string(),
            otlp_endpoint: None,
        }
    }
}

impl Config {
    /// Load configuration from file and environment.
    ///
    /// Configuration sources (in order of priority, later overrides earlier):
    /// 1. `kube-advice.yaml` in current directory (if exists)
    /// 2. File specified by `path` argument (if provided)
    /// 3. File specified by `CONFIG_ENV_VAR` environment variable (if set)
    /// 4. Environment variables with `CONFIG_ENV_PREFIX` prefix, `__` separated
    ///    (e.g. `KUBE_ADVICE__METRICS__ENABLED=false`)
    pub fn load(path: Option<&str>) -> Result<Self, ::config::ConfigError> {
        use ::config::{Config as ConfigLib, Environment, File, FileFormat};

        let mut builder = ConfigLib::builder()
            .add_source(File::new(DEFAULT_CONFIG_FILE, FileFormat::Yaml).required(false));

        if let Some(config_path) = path {
            builder = builder.add_source(File::new(config_path, FileFormat::Yaml).required(true));
        }

        if let Ok(config_path) = std::env::var(CONFIG_ENV_VAR) {
            builder = builder.add_source(File::new(&config_path, FileFormat::Yaml).required(true));
        }

        builder
            .add_source(
                Environment::with_prefix(CONFIG_ENV_PREFIX)
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("metrics.namespaces.include")
                    .with_list_parse_key("metrics.namespaces.exclude")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }
}
