//! Peering operator entry point.
//!
//! Connects to the cluster (in-cluster service account when available,
//! local kubeconfig otherwise) and runs the PeeringServer controller.

use std::sync::Arc;
use std::time::Duration;

use peering_operator::{controller, Error, Result};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing; LOG_LEVEL carries the filter directives.
    let directives = std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true))
        .with(EnvFilter::builder().parse_lossy(directives))
        .init();

    info!("Starting peering operator v{}", env!("CARGO_PKG_VERSION"));

    // Initialize Kubernetes client with a bounded per-request deadline.
    let mut config = kube::Config::infer()
        .await
        .map_err(|e| Error::ConfigError(format!("failed to load Kubernetes config: {e}")))?;
    config.connect_timeout = Some(Duration::from_secs(30));
    config.read_timeout = Some(Duration::from_secs(30));
    let client = kube::Client::try_from(config)?;

    info!("Connected to Kubernetes cluster");

    let namespace = std::env::var("WATCH_NAMESPACE").unwrap_or_else(|_| "default".to_string());
    let state = Arc::new(controller::ControllerState { client, namespace });

    controller::run_controller(state).await
}
