//! Periodic peer pinging.
//!
//! One task owns the schedule: every `pingInterval` it fires a concurrent
//! round of `GET /ping` against the whole cohort (self included) and waits
//! for every outcome before the next tick. A configuration change tears the
//! interval down and rebuilds it from the new document.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::sync::{broadcast, watch};
use tracing::{debug, error, info, instrument, warn};

use crate::peering::{PeerEndpoint, PeeringConfig};

/// Per-request deadline for a single peer ping.
pub const PING_TIMEOUT: Duration = Duration::from_secs(5);

/// Classified result of one peer ping.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PingOutcome {
    Success,
    Timeout,
    ConnectionRefused,
    Failed,
}

/// Drive the ping schedule until shutdown.
#[instrument(skip_all, fields(server = %server_name))]
pub async fn run(
    server_name: String,
    mut config_rx: watch::Receiver<Arc<PeeringConfig>>,
    mut shutdown: broadcast::Receiver<()>,
) {
    let client = reqwest::Client::new();

    'schedule: loop {
        let config = config_rx.borrow_and_update().clone();
        let period = Duration::from_millis(config.ping_interval.max(1) as u64);
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        info!(
            interval_ms = config.ping_interval,
            peers = config.peers.len(),
            "ping schedule started"
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    ping_all(&client, &config.peers, PING_TIMEOUT).await;
                }
                changed = config_rx.changed() => {
                    if changed.is_err() {
                        break 'schedule;
                    }
                    info!("peer configuration changed, restarting ping schedule");
                    continue 'schedule;
                }
                _ = shutdown.recv() => break 'schedule,
            }
        }
    }

    debug!("ping schedule stopped");
}

/// Ping every peer concurrently; one failure never cancels the others.
pub async fn ping_all(
    client: &reqwest::Client,
    peers: &[PeerEndpoint],
    timeout: Duration,
) -> Vec<PingOutcome> {
    join_all(peers.iter().map(|peer| ping_peer(client, peer, timeout))).await
}

async fn ping_peer(
    client: &reqwest::Client,
    peer: &PeerEndpoint,
    timeout: Duration,
) -> PingOutcome {
    let url = format!("http://{}:{}/ping", peer.host, peer.port);

    match client.get(&url).timeout(timeout).send().await {
        Ok(response) if response.status().is_success() => {
            info!(peer = %peer.host, port = peer.port, "ping ok");
            PingOutcome::Success
        }
        Ok(response) => {
            error!(
                peer = %peer.host,
                port = peer.port,
                status = %response.status(),
                "ping answered with non-success status"
            );
            PingOutcome::Failed
        }
        Err(err) if err.is_timeout() => {
            warn!(peer = %peer.host, port = peer.port, "ping timed out");
            PingOutcome::Timeout
        }
        Err(err) if err.is_connect() => {
            warn!(peer = %peer.host, port = peer.port, "connection refused");
            PingOutcome::ConnectionRefused
        }
        Err(err) => {
            error!(peer = %peer.host, port = peer.port, error = %err, "ping failed");
            PingOutcome::Failed
        }
    }
}
