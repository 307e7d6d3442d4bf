//! Axum HTTP surface of the managed server.
//!
//! Plain-text `/health` and `/ping` for probes and peers, JSON `/config` for
//! debugging what a pod currently believes its cohort looks like.

use std::sync::Arc;

use axum::extract::State;
use axum::{routing::get, Json, Router};
use serde::Serialize;
use tokio::sync::watch;
use tower_http::trace::TraceLayer;

use crate::peering::PeeringConfig;

/// Shared state for the HTTP handlers.
pub struct ServerState {
    pub server_name: String,
    /// Read side of the live configuration; replaced atomically on reload.
    pub config: watch::Receiver<Arc<PeeringConfig>>,
}

pub fn router(state: Arc<ServerState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/ping", get(ping))
        .route("/config", get(current_config))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}

async fn ping() -> &'static str {
    "pong"
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ConfigResponse {
    server_name: String,
    config: PeeringConfig,
}

async fn current_config(State(state): State<Arc<ServerState>>) -> Json<ConfigResponse> {
    let config = state.config.borrow().as_ref().clone();
    Json(ConfigResponse {
        server_name: state.server_name.clone(),
        config,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::peering::{PeerEndpoint, PeeringConfig};

    async fn serve(state: Arc<ServerState>) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router(state)).await.unwrap();
        });
        format!("http://{addr}")
    }

    fn test_state(config: PeeringConfig) -> Arc<ServerState> {
        let (_tx, rx) = watch::channel(Arc::new(config));
        Arc::new(ServerState {
            server_name: "peering-0".to_string(),
            config: rx,
        })
    }

    #[tokio::test]
    async fn health_and_ping_answer_plain_text() {
        let base = serve(test_state(PeeringConfig::default())).await;

        let health = reqwest::get(format!("{base}/health")).await.unwrap();
        assert_eq!(health.status(), 200);
        assert_eq!(health.text().await.unwrap(), "ok");

        let ping = reqwest::get(format!("{base}/ping")).await.unwrap();
        assert_eq!(ping.status(), 200);
        assert_eq!(ping.text().await.unwrap(), "pong");
    }

    #[tokio::test]
    async fn config_reports_server_name_and_live_peers() {
        let config = PeeringConfig {
            peers: vec![PeerEndpoint {
                host: "peer-1.cohort-headless.default.svc.cluster.local".to_string(),
                port: 8080,
            }],
            ping_interval: 15_000,
        };
        let base = serve(test_state(config)).await;

        let body: serde_json::Value = reqwest::get(format!("{base}/config"))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();

        assert_eq!(body["serverName"], "peering-0");
        assert_eq!(body["config"]["pingInterval"], 15_000);
        assert_eq!(
            body["config"]["peers"][0]["host"],
            "peer-1.cohort-headless.default.svc.cluster.local"
        );
    }
}
