//! Peering-Operator: Kubernetes operator for cohorts of mutually-pinging
//! HTTP peering servers.
//!
//! A `PeeringServer` custom resource declares a cohort size and ping cadence;
//! the operator materializes a peer-list ConfigMap, a headless Service, and a
//! StatefulSet, and keeps them converged with the declared state. The
//! `peering-server` binary is the workload that runs inside each pod.

pub mod controller;
pub mod crd;
pub mod error;
pub mod peering;
pub mod server;

pub use crate::error::{Error, Result};
