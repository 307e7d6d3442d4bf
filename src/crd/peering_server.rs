//! PeeringServer Custom Resource Definition
//!
//! A PeeringServer declares a cohort of identically-configured HTTP servers
//! that periodically ping one another over the cohort's headless Service.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::types::ResourceRequirements;

#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "luxor.io",
    version = "v1",
    kind = "PeeringServer",
    plural = "peeringservers",
    namespaced,
    status = "PeeringServerStatus",
    shortname = "ps",
    printcolumn = r#"{"name":"Phase","type":"string","jsonPath":".status.phase"}"#,
    printcolumn = r#"{"name":"Replicas","type":"integer","jsonPath":".status.replicas"}"#,
    printcolumn = r#"{"name":"Ready","type":"integer","jsonPath":".status.readyReplicas"}"#,
    printcolumn = r#"{"name":"Updated","type":"string","jsonPath":".status.lastUpdated"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct PeeringServerSpec {
    /// Number of server pods in the cohort.
    pub replicas: i32,

    /// Interval between ping rounds, in milliseconds.
    pub ping_interval: i64,

    /// HTTP port every member serves, used for health checks and pings.
    #[serde(default = "default_port")]
    pub port: i32,

    /// Container image for the managed servers.
    #[serde(default = "default_image")]
    pub image: String,

    #[serde(default)]
    pub resources: ResourceRequirements,
}

fn default_port() -> i32 {
    8080
}

fn default_image() -> String {
    "peering-server:latest".to_string()
}

impl PeeringServerSpec {
    /// Validate the spec before any cluster object is written.
    ///
    /// # Errors
    ///
    /// Returns a human-readable reason when the spec cannot be materialized.
    pub fn validate(&self) -> Result<(), String> {
        if self.replicas < 0 {
            return Err(format!(
                "spec.replicas must not be negative (got {})",
                self.replicas
            ));
        }
        if self.ping_interval <= 0 {
            return Err(format!(
                "spec.pingInterval must be positive (got {})",
                self.ping_interval
            ));
        }
        Ok(())
    }
}

/// Observed state, written only by the operator through the status
/// subresource.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PeeringServerStatus {
    /// Replicas reported by the owned StatefulSet.
    #[serde(default)]
    pub replicas: i32,

    /// Ready replicas reported by the owned StatefulSet.
    #[serde(default)]
    pub ready_replicas: i32,

    #[serde(default)]
    pub phase: PeeringPhase,

    /// RFC3339 timestamp of the last status publication.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<String>,
}

/// Coarse outcome of the most recent reconcile attempt.
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum PeeringPhase {
    #[default]
    Running,
    Failed,
}

impl std::fmt::Display for PeeringPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PeeringPhase::Running => write!(f, "Running"),
            PeeringPhase::Failed => write!(f, "Failed"),
        }
    }
}
