//! Environment settings and peer-configuration loading for the managed
//! server.

use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::peering::PeeringConfig;

/// Runtime settings resolved from the pod environment.
#[derive(Clone, Debug)]
pub struct Settings {
    /// HTTP port for health checks and peer pings.
    pub port: u16,
    /// Location of the mounted `config.json`.
    pub config_path: PathBuf,
    /// Identity used in logs and the `/config` response.
    pub server_name: String,
}

impl Settings {
    pub fn from_env() -> Self {
        let port = std::env::var("PORT")
            .ok()
            .and_then(|raw| raw.parse().ok())
            .unwrap_or(8080);
        let config_path = std::env::var("CONFIG_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/etc/peering/config.json"));
        let server_name = std::env::var("POD_NAME")
            .or_else(|_| std::env::var("HOSTNAME"))
            .unwrap_or_else(|_| "peering-server".to_string());

        Self {
            port,
            config_path,
            server_name,
        }
    }
}

/// Read and parse the peer configuration file.
pub fn load_config(path: &Path) -> Result<PeeringConfig> {
    let raw = std::fs::read_to_string(path)?;
    let config = serde_json::from_str(&raw)?;
    Ok(config)
}

/// Load the configuration at startup, falling back to built-in defaults.
///
/// A missing or malformed file must never prevent the server from starting;
/// the operator will eventually project a valid document into the pod.
pub fn load_or_default(path: &Path) -> PeeringConfig {
    match load_config(path) {
        Ok(config) => {
            info!(
                path = %path.display(),
                peers = config.peers.len(),
                interval_ms = config.ping_interval,
                "loaded peer configuration"
            );
            config
        }
        Err(Error::IoError(err)) if err.kind() == std::io::ErrorKind::NotFound => {
            info!(
                path = %path.display(),
                "no peer configuration present, starting with defaults"
            );
            PeeringConfig::default()
        }
        Err(err) => {
            warn!(
                path = %path.display(),
                error = %err,
                "unusable peer configuration, starting with defaults"
            );
            PeeringConfig::default()
        }
    }
}
