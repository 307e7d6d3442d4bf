//! Shared types for PeeringServer specifications.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Kubernetes-style resource requirements
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ResourceRequirements {
    pub requests: ResourceSpec,
    pub limits: ResourceSpec,
}

impl Default for ResourceRequirements {
    fn default() -> Self {
        Self {
            requests: ResourceSpec {
                cpu: "100m".to_string(),
                memory: "128Mi".to_string(),
            },
            limits: ResourceSpec {
                cpu: "200m".to_string(),
                memory: "256Mi".to_string(),
            },
        }
    }
}

/// Resource specification for CPU and memory
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
pub struct ResourceSpec {
    pub cpu: String,
    pub memory: String,
}

impl Default for ResourceSpec {
    fn default() -> Self {
        Self {
            cpu: "100m".to_string(),
            memory: "128Mi".to_string(),
        }
    }
}
