//! Owner resources from the generic cluster lifecycle API
//!
//! Only the fields this provider reads are modelled. These objects are owned
//! and written by the upstream cluster controllers.

use crate::conditions::{self, Condition};
use crate::metadata::{self, CONTROL_PLANE_LABEL};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Condition set on the owner cluster once the first control plane node is up
pub const CONTROL_PLANE_INITIALIZED_CONDITION: &str = "ControlPlaneInitialized";

/// Bootstrap config kind for kubeadm based clusters
pub const KUBEADM_CONFIG_KIND: &str = "KubeadmConfig";

/// Bootstrap config kind for RKE2 based clusters
pub const RKE2_CONFIG_KIND: &str = "RKE2Config";

/// Typed reference to another object in the same namespace
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ConfigReference {
    /// API version of the referent
    #[serde(default)]
    pub api_version: String,

    /// Kind of the referent
    pub kind: String,

    /// Name of the referent
    pub name: String,
}

#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
#[kube(
    group = "cluster.x-k8s.io",
    version = "v1beta1",
    kind = "Machine",
    namespaced,
    status = "MachineStatus",
    derive = "PartialEq"
)]
#[serde(rename_all = "camelCase")]
pub struct MachineSpec {
    /// Cluster this machine belongs to
    pub cluster_name: String,

    /// Bootstrap configuration
    #[serde(default)]
    pub bootstrap: Bootstrap,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Bootstrap {
    /// Bootstrap config object (its kind selects the bootstrap flavour)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config_ref: Option<ConfigReference>,

    /// Secret holding the generated bootstrap payload
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_secret_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MachineStatus {
    /// Upstream lifecycle phase
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<String>,
}

impl Machine {
    /// Whether this machine is part of the control plane
    pub fn is_control_plane(&self) -> bool {
        metadata::label(&self.metadata, CONTROL_PLANE_LABEL).is_some()
    }

    /// Name of the bootstrap data secret, once generated
    pub fn bootstrap_data_secret(&self) -> Option<&str> {
        self.spec.bootstrap.data_secret_name.as_deref().filter(|s| !s.is_empty())
    }

    /// Kind of the bootstrap config, if referenced
    pub fn bootstrap_kind(&self) -> Option<&str> {
        self.spec.bootstrap.config_ref.as_ref().map(|r| r.kind.as_str())
    }
}

#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
#[kube(
    group = "cluster.x-k8s.io",
    version = "v1beta1",
    kind = "Cluster",
    namespaced,
    status = "ClusterStatus",
    derive = "PartialEq"
)]
#[serde(rename_all = "camelCase")]
pub struct ClusterSpec {
    /// Infrastructure cluster (an EdgeCluster for this provider)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub infrastructure_ref: Option<ConfigReference>,

    /// Reconciliation paused
    #[serde(default)]
    pub paused: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ClusterStatus {
    /// Infrastructure provider reported ready
    #[serde(default)]
    pub infrastructure_ready: bool,

    /// Control plane provider reported ready
    #[serde(default)]
    pub control_plane_ready: bool,

    /// Observed conditions
    #[serde(default)]
    pub conditions: Vec<Condition>,
}

impl Cluster {
    /// Whether the infrastructure cluster is ready
    pub fn infrastructure_ready(&self) -> bool {
        self.status.as_ref().is_some_and(|s| s.infrastructure_ready)
    }

    /// Whether the first control plane node has come up
    pub fn control_plane_initialized(&self) -> bool {
        self.status.as_ref().is_some_and(|s| {
            s.control_plane_ready || conditions::is_true(&s.conditions, CONTROL_PLANE_INITIALIZED_CONDITION)
        })
    }

    /// Name of the infrastructure cluster, defaulting to the cluster's own name
    pub fn infrastructure_name(&self) -> Option<&str> {
        self.spec
            .infrastructure_ref
            .as_ref()
            .map(|r| r.name.as_str())
            .or(self.metadata.name.as_deref())
    }
}
