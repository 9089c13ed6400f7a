//! EdgeMachine CRD
//!
//! Tracks provisioning of one node joining a cluster: the binding it was
//! allocated, the inventory instance it reserved, and what the node agent
//! reports back while bootstrapping.

use crate::conditions::{self, Condition};
use crate::metadata::{self, NODE_GUID_LABEL};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Condition: a host has been reserved in inventory for this machine
pub const HOST_PROVISIONED_CONDITION: &str = "HostProvisioned";

/// Condition: the node agent finished running the bootstrap commands
pub const BOOTSTRAP_EXEC_SUCCEEDED_CONDITION: &str = "BootstrapExecSucceeded";

/// Conditions folded into the machine `Ready` summary
pub const MACHINE_SUMMARY_CONDITIONS: &[&str] = &[HOST_PROVISIONED_CONDITION, BOOTSTRAP_EXEC_SUCCEEDED_CONDITION];

// HostProvisioned reasons
pub const WAITING_FOR_CLUSTER_INFRASTRUCTURE_REASON: &str = "WaitingForClusterInfrastructure";
pub const WAITING_FOR_CONTROL_PLANE_REASON: &str = "WaitingForControlPlane";
pub const WAITING_FOR_BOOTSTRAP_DATA_REASON: &str = "WaitingForBootstrapData";
pub const WAITING_FOR_MACHINE_BINDING_REASON: &str = "WaitingForMachineBinding";
pub const HOST_PROVISIONING_FAILED_REASON: &str = "HostProvisioningFailed";
pub const DELETING_REASON: &str = "Deleting";

// BootstrapExecSucceeded reasons
pub const BOOTSTRAPPING_REASON: &str = "Bootstrapping";
pub const BOOTSTRAP_FAILED_REASON: &str = "BootstrapFailed";
pub const BOOTSTRAP_WAITING_REASON: &str = "BootstrapWaiting";

#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
#[kube(
    group = "infrastructure.edge.microscaler.io",
    version = "v1alpha1",
    kind = "EdgeMachine",
    namespaced,
    status = "EdgeMachineStatus",
    derive = "PartialEq",
    printcolumn = r#"{"name":"ProviderID","type":"string","jsonPath":".spec.providerID"}"#,
    printcolumn = r#"{"name":"Ready","type":"boolean","jsonPath":".status.ready"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct EdgeMachineSpec {
    /// Inventory instance id, set once the host is reserved and never changed
    #[serde(default, rename = "providerID", skip_serializing_if = "Option::is_none")]
    pub provider_id: Option<String>,

    /// Node identity taken from the allocated MachineBinding
    #[serde(default, rename = "nodeGUID", skip_serializing_if = "Option::is_none")]
    pub node_guid: Option<String>,
}

/// State reported by the node agent
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum HostState {
    /// Cluster software installed and running
    Active,
    /// Installation failed on the node
    Error,
    /// Install or uninstall running
    InProgress,
    /// Agent idle, nothing installed
    Inactive,
    /// Value written by something newer than this controller
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EdgeMachineStatus {
    /// Set once the node reports active; never reset
    #[serde(default)]
    pub ready: bool,

    /// Last state reported by the node agent; absent until the first report
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host_state: Option<HostState>,

    /// Inventory host resource id, cached at reservation time
    #[serde(default, rename = "hostID", skip_serializing_if = "Option::is_none")]
    pub host_id: Option<String>,

    /// Observed conditions
    #[serde(default)]
    pub conditions: Vec<Condition>,
}

impl EdgeMachine {
    /// Node GUID, if allocated
    pub fn node_guid(&self) -> Option<&str> {
        self.spec.node_guid.as_deref().filter(|s| !s.is_empty())
    }

    /// Provider id, if a host has been reserved
    pub fn provider_id(&self) -> Option<&str> {
        self.spec.provider_id.as_deref().filter(|s| !s.is_empty())
    }

    /// Record the node GUID on the spec and as an index label
    pub fn set_node_guid(&mut self, node_guid: &str) {
        self.spec.node_guid = Some(node_guid.to_string());
        metadata::set_label(&mut self.metadata, NODE_GUID_LABEL, node_guid);
    }

    /// Whether deletion has been requested
    pub fn is_deleting(&self) -> bool {
        self.metadata.deletion_timestamp.is_some()
    }

    /// Status, created on first access
    pub fn status_mut(&mut self) -> &mut EdgeMachineStatus {
        self.status.get_or_insert_with(EdgeMachineStatus::default)
    }

    /// Reported host state
    pub fn host_state(&self) -> Option<HostState> {
        self.status.as_ref().and_then(|s| s.host_state)
    }

    /// Whether the machine has ever become ready
    pub fn is_ready(&self) -> bool {
        self.status.as_ref().is_some_and(|s| s.ready)
    }

    /// Current conditions
    pub fn conditions(&self) -> &[Condition] {
        self.status.as_ref().map_or(&[], |s| s.conditions.as_slice())
    }

    /// Look up one condition
    pub fn condition(&self, type_: &str) -> Option<&Condition> {
        conditions::get(self.conditions(), type_)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_host_state_deserializes() {
        let state: HostState = serde_json::from_str("\"rebooting\"").unwrap();
        assert_eq!(state, HostState::Unknown);
        let state: HostState = serde_json::from_str("\"in-progress\"").unwrap();
        assert_eq!(state, HostState::InProgress);
    }

    #[test]
    fn test_set_node_guid_labels_machine() {
        let mut machine = EdgeMachine::new("m1", EdgeMachineSpec::default());
        machine.set_node_guid("4c4c4544-0044-3010-8030-b4c04f4e3333");
        assert_eq!(machine.node_guid(), Some("4c4c4544-0044-3010-8030-b4c04f4e3333"));
        assert_eq!(
            metadata::label(&machine.metadata, NODE_GUID_LABEL),
            Some("4c4c4544-0044-3010-8030-b4c04f4e3333")
        );
    }

    #[test]
    fn test_spec_field_names() {
        let spec = EdgeMachineSpec {
            provider_id: Some("inst-1".to_string()),
            node_guid: Some("guid".to_string()),
        };
        let json = serde_json::to_value(&spec).unwrap();
        assert_eq!(json["providerID"], "inst-1");
        assert_eq!(json["nodeGUID"], "guid");
    }
}
