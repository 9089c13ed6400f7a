//! TunnelConnection CRD
//!
//! Secure tunnel exposing a cluster's API server. The provider creates it;
//! a separate tunnel controller fills in the endpoint and readiness.

use crate::edge_cluster::ApiEndpoint;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
#[kube(
    group = "infrastructure.edge.microscaler.io",
    version = "v1alpha1",
    kind = "TunnelConnection",
    namespaced,
    status = "TunnelConnectionStatus",
    derive = "PartialEq"
)]
#[serde(rename_all = "camelCase")]
pub struct TunnelConnectionSpec {
    /// Cluster the tunnel serves
    pub cluster_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TunnelConnectionStatus {
    /// Tunnel is established
    #[serde(default)]
    pub ready: bool,

    /// Endpoint clients should use
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub control_plane_endpoint: Option<ApiEndpoint>,
}

/// Deterministic tunnel name for a cluster
pub fn tunnel_connection_name(namespace: &str, cluster_name: &str) -> String {
    format!("{}-{}", namespace, cluster_name)
}

impl TunnelConnection {
    /// Whether the tunnel controller reported ready
    pub fn is_ready(&self) -> bool {
        self.status.as_ref().is_some_and(|s| s.ready)
    }

    /// Reported endpoint, if any
    pub fn endpoint(&self) -> Option<&ApiEndpoint> {
        self.status.as_ref().and_then(|s| s.control_plane_endpoint.as_ref())
    }
}
