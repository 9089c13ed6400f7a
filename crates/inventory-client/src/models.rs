//! Inventory API models
//!
//! These models match the inventory service's compute and workload
//! resources. Every payload crossing the wire is checked with [`Validate`]
//! before it is sent or handed back to a caller.

use crate::error::InventoryError;
use serde::{Deserialize, Serialize};

/// Resource id prefixes used by the inventory service
pub const HOST_ID_PREFIX: &str = "host-";
pub const INSTANCE_ID_PREFIX: &str = "inst-";
pub const WORKLOAD_ID_PREFIX: &str = "workload-";
pub const WORKLOAD_MEMBER_ID_PREFIX: &str = "workloadmember-";

/// Note recorded on hosts deauthorized by the provider
pub const DEAUTHORIZE_NOTE: &str = "host deauthorized by edge machine provider on machine deletion";

/// Schema check applied to outbound requests and inbound responses
pub trait Validate {
    fn validate(&self) -> Result<(), InventoryError>;
}

/// Desired trust state of a host
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum HostDesiredState {
    #[serde(rename = "HOST_STATE_ONBOARDED")]
    Onboarded,
    #[serde(rename = "HOST_STATE_UNTRUSTED")]
    Untrusted,
    #[default]
    #[serde(rename = "HOST_STATE_UNSPECIFIED", other)]
    Unspecified,
}

/// Kind of a workload
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum WorkloadKind {
    #[serde(rename = "WORKLOAD_KIND_CLUSTER")]
    Cluster,
    #[default]
    #[serde(rename = "WORKLOAD_KIND_UNSPECIFIED", other)]
    Unspecified,
}

/// Kind of a workload membership
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum WorkloadMemberKind {
    #[serde(rename = "WORKLOAD_MEMBER_KIND_CLUSTER_NODE")]
    ClusterNode,
    #[default]
    #[serde(rename = "WORKLOAD_MEMBER_KIND_UNSPECIFIED", other)]
    Unspecified,
}

/// Host model
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "snake_case")]
pub struct Host {
    pub resource_id: String,
    pub uuid: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub desired_state: HostDesiredState,
    #[serde(default)]
    pub note: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instance: Option<Instance>,
}

/// Instance model
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "snake_case")]
pub struct Instance {
    pub resource_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub workload_members: Vec<WorkloadMember>,
}

/// Link between an instance and a workload
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "snake_case")]
pub struct WorkloadMember {
    pub resource_id: String,
    #[serde(default)]
    pub kind: WorkloadMemberKind,
    pub workload_id: String,
    #[serde(default)]
    pub instance_id: String,
}

/// Workload model
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "snake_case")]
pub struct Workload {
    pub resource_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub kind: WorkloadKind,
    #[serde(default)]
    pub external_id: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub members: Vec<WorkloadMember>,
}

/// Response of the host list endpoint
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub struct ListHostsResponse {
    #[serde(default)]
    pub hosts: Vec<Host>,
    #[serde(default)]
    pub total_elements: u64,
    #[serde(default)]
    pub has_next: bool,
}

/// Request body for creating a workload
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct CreateWorkloadRequest {
    pub kind: WorkloadKind,
    pub name: String,
    pub external_id: String,
    pub status: String,
}

impl CreateWorkloadRequest {
    /// Cluster workload named after the cluster
    pub fn for_cluster(cluster_name: &str) -> Self {
        Self {
            kind: WorkloadKind::Cluster,
            name: cluster_name.to_string(),
            external_id: cluster_name.to_string(),
            status: "Creating".to_string(),
        }
    }
}

/// Request body for adding an instance to a workload
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct CreateWorkloadMemberRequest {
    pub kind: WorkloadMemberKind,
    pub workload_id: String,
    pub instance_id: String,
}

/// Partial host update restricted by field mask
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct HostStatePatch {
    pub desired_state: HostDesiredState,
    pub note: String,
}

impl HostStatePatch {
    /// Patch marking a host untrusted
    pub fn untrusted() -> Self {
        Self {
            desired_state: HostDesiredState::Untrusted,
            note: DEAUTHORIZE_NOTE.to_string(),
        }
    }
}

/// Find the cluster-node membership linking `instance` to `workload_id`.
///
/// Instances may carry memberships this provider does not manage; those are
/// never returned.
pub fn find_cluster_membership<'a>(instance: &'a Instance, workload_id: &str) -> Option<&'a WorkloadMember> {
    instance
        .workload_members
        .iter()
        .find(|m| m.workload_id == workload_id && m.kind == WorkloadMemberKind::ClusterNode)
}

fn check_resource_id(id: &str, prefix: &str, what: &str) -> Result<(), String> {
    if id.is_empty() {
        return Err(format!("{} has an empty resource id", what));
    }
    if !id.starts_with(prefix) || id.len() == prefix.len() {
        return Err(format!("{} resource id {:?} does not match {}*", what, id, prefix));
    }
    Ok(())
}

/// Reject empty keys before a request is built
pub fn require_input(value: &str, field: &str) -> Result<(), InventoryError> {
    if value.trim().is_empty() {
        return Err(InventoryError::InvalidInput(format!("{} must not be empty", field)));
    }
    Ok(())
}

impl Validate for Host {
    fn validate(&self) -> Result<(), InventoryError> {
        check_resource_id(&self.resource_id, HOST_ID_PREFIX, "host").map_err(InventoryError::InvalidHost)?;
        if self.uuid.is_empty() {
            return Err(InventoryError::InvalidHost(format!("host {} has no uuid", self.resource_id)));
        }
        if let Some(instance) = &self.instance {
            instance.validate()?;
        }
        Ok(())
    }
}

impl Validate for Instance {
    fn validate(&self) -> Result<(), InventoryError> {
        check_resource_id(&self.resource_id, INSTANCE_ID_PREFIX, "instance").map_err(InventoryError::InvalidInstance)?;
        for member in &self.workload_members {
            member.validate()?;
        }
        Ok(())
    }
}

impl Validate for WorkloadMember {
    fn validate(&self) -> Result<(), InventoryError> {
        check_resource_id(&self.resource_id, WORKLOAD_MEMBER_ID_PREFIX, "workload member")
            .map_err(InventoryError::InvalidResource)?;
        check_resource_id(&self.workload_id, WORKLOAD_ID_PREFIX, "workload member workload")
            .map_err(InventoryError::InvalidResource)
    }
}

impl Validate for Workload {
    fn validate(&self) -> Result<(), InventoryError> {
        check_resource_id(&self.resource_id, WORKLOAD_ID_PREFIX, "workload").map_err(InventoryError::InvalidWorkload)
    }
}

impl Validate for CreateWorkloadRequest {
    fn validate(&self) -> Result<(), InventoryError> {
        require_input(&self.name, "workload name")?;
        if self.kind != WorkloadKind::Cluster {
            return Err(InventoryError::InvalidInput("workload kind must be cluster".to_string()));
        }
        Ok(())
    }
}

impl Validate for CreateWorkloadMemberRequest {
    fn validate(&self) -> Result<(), InventoryError> {
        require_input(&self.workload_id, "workload id")?;
        require_input(&self.instance_id, "instance id")?;
        if self.kind != WorkloadMemberKind::ClusterNode {
            return Err(InventoryError::InvalidInput("membership kind must be cluster node".to_string()));
        }
        Ok(())
    }
}
