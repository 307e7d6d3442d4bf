//! Custom Resource Definitions for the peering operator.

mod peering_server;
pub mod types;


pub use peering_server::{PeeringPhase, PeeringServer, PeeringServerSpec, PeeringServerStatus};
pub use types::*;
