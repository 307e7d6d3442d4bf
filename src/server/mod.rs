//! The managed peering server.
//!
//! One instance runs in every pod of a cohort: it serves `/health`, `/ping`,
//! and `/config`, pings the whole cohort on a timer, and hot-reloads its peer
//! list when the operator republishes the mounted ConfigMap.

pub mod config;
pub mod http;
pub mod pinger;
pub mod watcher;

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::sync::{broadcast, watch};
use tracing::{error, info};

use crate::error::Result;

pub use config::Settings;

/// Run the server until a termination signal arrives.
pub async fn run(settings: Settings) -> Result<()> {
    let initial = config::load_or_default(&settings.config_path);
    let (config_tx, config_rx) = watch::channel(Arc::new(initial));
    let (shutdown_tx, _) = broadcast::channel(1);

    let state = Arc::new(http::ServerState {
        server_name: settings.server_name.clone(),
        config: config_rx.clone(),
    });

    let watcher_task = tokio::spawn(watcher::run(
        settings.config_path.clone(),
        config_tx,
        shutdown_tx.subscribe(),
    ));
    let pinger_task = tokio::spawn(pinger::run(
        settings.server_name.clone(),
        config_rx,
        shutdown_tx.subscribe(),
    ));

    let addr = SocketAddr::from(([0, 0, 0, 0], settings.port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, server = %settings.server_name, "peering server listening");

    // Inflight requests drain; the listener stops accepting immediately.
    axum::serve(listener, http::router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    let _ = shutdown_tx.send(());
    if let Err(err) = pinger_task.await {
        error!(error = %err, "ping task ended abnormally");
    }
    match watcher_task.await {
        Ok(Err(err)) => error!(error = %err, "configuration watcher failed"),
        Err(err) => error!(error = %err, "configuration watcher ended abnormally"),
        Ok(Ok(())) => {}
    }

    info!("peering server stopped");
    Ok(())
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(err) => {
                error!(error = %err, "failed to install SIGTERM handler");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
    info!("shutdown signal received");
}
