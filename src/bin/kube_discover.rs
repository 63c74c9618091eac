//! kube-discover: Instrumented discovery check
//!
//! Connects to the cluster from the ambient kubeconfig (or in-cluster
//! service account), asks the API server what it serves, and prints a YAML
//! summary to stdout. Every call goes through the instrumented discovery
//! client, so spans and query metrics are exported like any other client.
//!
//! ## Usage
//! ```text
//! kube-discover [CONFIG_PATH]
//! ```
//!
//! ## Configuration
//! - KUBE_ADVICE_CONFIG: Path to a YAML config file (optional)
//! - KUBE_ADVICE__*: Config overrides (e.g. KUBE_ADVICE__TRACING__ENABLED=false)
//! - KUBE_ADVICE_LOG: Log filter (default: info)

use serde::Serialize;
use tracing::info;

use kube_advice::config::Config;
use kube_advice::{Clientset, Instrumentation};

#[derive(Serialize)]
struct GroupSummary {
    name: String,
    preferred: Option<String>,
    versions: Vec<String>,
}

#[derive(Serialize)]
struct Summary {
    version: String,
    platform: String,
    groups: Vec<GroupSummary>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config_path = std::env::args().nth(1);
    let config = Config::load(config_path.as_deref())?;

    #[cfg(feature = "otel")]
    let _telemetry = kube_advice::bootstrap::init_telemetry(&config.telemetry)?;
    #[cfg(not(feature = "otel"))]
    kube_advice::bootstrap::init_tracing();

    let clientset = Clientset::try_default(Instrumentation::from_config(&config)).await?;
    let discovery = clientset.discovery();

    let version = discovery.server_version().await?;
    let groups = discovery.server_groups().await?.groups;
    info!(
        version = %version.git_version,
        groups = groups.len(),
        "Discovered API server"
    );

    let summary = Summary {
        version: version.git_version,
        platform: version.platform,
        groups: groups
            .into_iter()
            .map(|group| GroupSummary {
                name: if group.name.is_empty() {
                    "core".to_string()
                } else {
                    group.name
                },
                preferred: group.preferred_version.map(|v| v.group_version),
                versions: group.versions.into_iter().map(|v| v.group_version).collect(),
            })
            .collect(),
    };
    print!("{}", serde_yaml::to_string(&summary)?);

    Ok(())
}
