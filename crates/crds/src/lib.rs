//! Edge provider CRD definitions
//!
//! Kubernetes Custom Resource Definitions for the edge machine provider,
//! plus the owner resources it reads from the generic cluster lifecycle API.

pub mod capi;
pub mod conditions;
pub mod edge_cluster;
pub mod edge_machine;
pub mod edge_machine_template;
pub mod machine_binding;
pub mod metadata;
pub mod tunnel_connection;

pub use capi::*;
pub use conditions::{Condition, ConditionSeverity, ConditionStatus};
pub use edge_cluster::*;
pub use edge_machine::*;
pub use edge_machine_template::*;
pub use machine_binding::*;
pub use tunnel_connection::*;
