//! Configuration hot-reload.
//!
//! Watches the directory holding `config.json` (the kubelet updates mounted
//! ConfigMaps through symlink swaps, so the file itself is not a stable
//! inotify target), debounces bursts of events, then re-parses the document
//! and publishes it through the watch channel. A document that fails to
//! parse is ignored and the prior configuration stays live.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use notify::{Event, RecursiveMode, Watcher};
use tokio::sync::{broadcast, mpsc, watch};
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::peering::PeeringConfig;
use crate::server::config;

/// Quiescence window; a change is accepted once events stop arriving for
/// this long.
pub const DEBOUNCE_WINDOW: std::time::Duration = std::time::Duration::from_millis(500);

/// Watch the configuration file until shutdown, publishing reloads.
pub async fn run(
    path: PathBuf,
    config_tx: watch::Sender<Arc<PeeringConfig>>,
    mut shutdown: broadcast::Receiver<()>,
) -> Result<()> {
    let (event_tx, mut event_rx) = mpsc::unbounded_channel();

    let mut watcher = notify::recommended_watcher(move |res: Result<Event, notify::Error>| {
        if let Ok(event) = res {
            if event.kind.is_modify() || event.kind.is_create() || event.kind.is_remove() {
                let _ = event_tx.send(());
            }
        }
    })?;

    let watch_root = path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| path.clone());
    watcher.watch(&watch_root, RecursiveMode::Recursive)?;
    debug!(path = %watch_root.display(), "watching for configuration changes");

    'watch: loop {
        tokio::select! {
            event = event_rx.recv() => {
                if event.is_none() {
                    break 'watch;
                }
            }
            _ = shutdown.recv() => break 'watch,
        }

        // Absorb the burst: kubelet projection and editors both touch the
        // directory several times per update.
        loop {
            match tokio::time::timeout(DEBOUNCE_WINDOW, event_rx.recv()).await {
                Ok(Some(())) => continue,
                Ok(None) => break 'watch,
                Err(_) => break,
            }
        }

        match config::load_config(&path) {
            Ok(config) => {
                info!(
                    peers = config.peers.len(),
                    interval_ms = config.ping_interval,
                    "peer configuration reloaded"
                );
                config_tx.send_replace(Arc::new(config));
            }
            Err(err) => {
                warn!(error = %err, "ignoring configuration change that failed to parse");
            }
        }
    }

    debug!("configuration watcher stopped");
    Ok(())
}
