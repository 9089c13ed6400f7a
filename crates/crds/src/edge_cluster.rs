//! EdgeCluster CRD
//!
//! Infrastructure side of a managed cluster: the inventory workload holding
//! its instances and the control plane endpoint exposed through a tunnel.

use crate::conditions::{self, Condition};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Condition: the control plane endpoint has been populated
pub const CONTROL_PLANE_ENDPOINT_READY_CONDITION: &str = "ControlPlaneEndpointReady";

/// Condition: the inventory workload exists
pub const WORKLOAD_CREATED_READY_CONDITION: &str = "WorkloadCreatedReady";

/// Conditions folded into the cluster `Ready` summary
pub const CLUSTER_SUMMARY_CONDITIONS: &[&str] = &[CONTROL_PLANE_ENDPOINT_READY_CONDITION, WORKLOAD_CREATED_READY_CONDITION];

pub const WAITING_FOR_ENDPOINT_REASON: &str = "WaitingForEndpoint";
pub const INVALID_ENDPOINT_REASON: &str = "InvalidEndpoint";
pub const WORKLOAD_CREATE_FAILED_REASON: &str = "WorkloadCreateFailed";
pub const INVALID_WORKLOAD_REASON: &str = "InvalidWorkload";

#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
#[kube(
    group = "infrastructure.edge.microscaler.io",
    version = "v1alpha1",
    kind = "EdgeCluster",
    namespaced,
    status = "EdgeClusterStatus",
    derive = "PartialEq"
)]
#[serde(rename_all = "camelCase")]
pub struct EdgeClusterSpec {
    /// Endpoint of the cluster API server, set once a valid one is known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub control_plane_endpoint: Option<ApiEndpoint>,

    /// Inventory workload id, set once after the workload is created
    #[serde(default, rename = "providerID", skip_serializing_if = "Option::is_none")]
    pub provider_id: Option<String>,
}

/// Host and port of an API server
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ApiEndpoint {
    /// Hostname or IP address
    pub host: String,

    /// TCP port
    pub port: i32,
}

impl ApiEndpoint {
    /// Non-empty host and a port in the TCP range
    pub fn is_valid(&self) -> bool {
        !self.host.trim().is_empty() && self.port > 0 && self.port <= 65535
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EdgeClusterStatus {
    /// Set once both endpoint and workload are in place; never reset
    #[serde(default)]
    pub ready: bool,

    /// Observed conditions
    #[serde(default)]
    pub conditions: Vec<Condition>,
}

impl EdgeCluster {
    /// Workload id, if created
    pub fn workload_id(&self) -> Option<&str> {
        self.spec.provider_id.as_deref().filter(|s| !s.is_empty())
    }

    /// Whether the stored endpoint is usable
    pub fn has_valid_endpoint(&self) -> bool {
        self.spec.control_plane_endpoint.as_ref().is_some_and(ApiEndpoint::is_valid)
    }

    /// Whether deletion has been requested
    pub fn is_deleting(&self) -> bool {
        self.metadata.deletion_timestamp.is_some()
    }

    /// Status, created on first access
    pub fn status_mut(&mut self) -> &mut EdgeClusterStatus {
        self.status.get_or_insert_with(EdgeClusterStatus::default)
    }

    /// Whether the cluster has ever become ready
    pub fn is_ready(&self) -> bool {
        self.status.as_ref().is_some_and(|s| s.ready)
    }

    /// Look up one condition
    pub fn condition(&self, type_: &str) -> Option<&Condition> {
        self.status.as_ref().and_then(|s| conditions::get(&s.conditions, type_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_validity() {
        assert!(ApiEndpoint { host: "10.0.0.1".to_string(), port: 6443 }.is_valid());
        assert!(!ApiEndpoint { host: String::new(), port: 6443 }.is_valid());
        assert!(!ApiEndpoint { host: "10.0.0.1".to_string(), port: 0 }.is_valid());
        assert!(!ApiEndpoint { host: "10.0.0.1".to_string(), port: 70000 }.is_valid());
    }
}
