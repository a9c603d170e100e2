//! cidrscout - discover a Kubernetes cluster's Pod and Service CIDRs.
//!
//! This is the entry point for the `cidrscout` binary. It runs a single
//! discovery pass against the cluster from the local kubeconfig (or the
//! in-cluster service account) and prints the result to stdout. Logs go to
//! stderr.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, ValueEnum};
use cidrscout_discovery::{DiscoveryConfig, KubeClusterApi, NetworkDiscovery};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Output format for the discovered network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Output {
    /// Human readable summary.
    Text,
    /// JSON document.
    Json,
}

/// Discover the Pod and Service CIDRs of a Kubernetes cluster.
#[derive(Parser, Debug)]
#[command(name = "cidrscout")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Namespace to create the probe Service in (overrides `WATCH_NAMESPACE`).
    #[arg(long, short)]
    namespace: Option<String>,

    /// Give up on discovery after this many seconds.
    #[arg(long)]
    timeout_secs: Option<u64>,

    /// Output format.
    #[arg(long, short, value_enum, default_value = "text")]
    output: Output,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,cidrscout=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let mut config = DiscoveryConfig::from_env();
    if let Some(namespace) = args.namespace {
        config.probe_namespace = namespace;
    }
    if let Some(secs) = args.timeout_secs {
        config.timeout = Some(Duration::from_secs(secs));
    }
    config.validate()?;

    tracing::info!(
        namespace = %config.probe_namespace,
        mesh_config = %config.mesh_config_name,
        timeout = ?config.timeout,
        "Loaded discovery configuration"
    );

    let api = KubeClusterApi::try_default()
        .await
        .context("failed to connect to the Kubernetes cluster")?;
    let timeout = config.timeout;
    let discovery = NetworkDiscovery::new(Arc::new(api), config);

    let network = match timeout {
        Some(deadline) => discovery.discover_within(deadline).await,
        None => discovery.discover().await,
    }
    .context("network discovery failed")?;

    match (args.output, network) {
        (Output::Json, network) => {
            println!("{}", serde_json::to_string_pretty(&network)?);
        }
        (Output::Text, Some(network)) => {
            network.log();
            println!("{network}");
        }
        (Output::Text, None) => {
            println!("No network details discovered");
        }
    }

    Ok(())
}
