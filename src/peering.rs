//! Peer-list wire format shared by the operator and the managed server.
//!
//! The operator serializes a [`PeeringConfig`] into the `config.json` key of
//! each cohort's ConfigMap; every server in the cohort parses the same
//! document from its mounted copy.

use serde::{Deserialize, Serialize};

/// ConfigMap key carrying the serialized peer configuration.
pub const CONFIG_KEY: &str = "config.json";

/// Ping interval used by a server that starts without a configuration file.
pub const DEFAULT_PING_INTERVAL_MS: i64 = 60_000;

/// One peer address in the cohort.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct PeerEndpoint {
    pub host: String,
    pub port: i32,
}

/// The `config.json` document: who to ping, and how often (milliseconds).
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PeeringConfig {
    pub peers: Vec<PeerEndpoint>,
    pub ping_interval: i64,
}

impl Default for PeeringConfig {
    fn default() -> Self {
        Self {
            peers: Vec::new(),
            ping_interval: DEFAULT_PING_INTERVAL_MS,
        }
    }
}

/// Enumerate the stable DNS identities of a cohort, own ordinal included.
///
/// Hosts follow the StatefulSet ordinal scheme
/// `<name>-<i>.<name>-headless.<namespace>.svc.cluster.local`. Every member
/// pings itself along with its peers; the self-ping doubles as a local HTTP
/// liveness check.
pub fn peer_endpoints(name: &str, namespace: &str, replicas: i32, port: i32) -> Vec<PeerEndpoint> {
    (0..replicas.max(0))
        .map(|ordinal| PeerEndpoint {
            host: format!("{name}-{ordinal}.{name}-headless.{namespace}.svc.cluster.local"),
            port,
        })
        .collect()
}
