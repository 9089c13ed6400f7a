//! RecordStore trait for mocking
//!
//! All async methods must be `Send` to work with Tokio's work-stealing runtime.
//! Lookups return `Ok(None)` for absent records; updates fail with
//! `StoreError::Conflict` when the record changed since it was read.

use crate::error::StoreError;
use crds::{Cluster, EdgeCluster, EdgeMachine, EdgeMachineTemplate, Machine, MachineBinding, TunnelConnection};
use k8s_openapi::api::core::v1::Secret;

/// Trait for record store operations
#[async_trait::async_trait]
pub trait RecordStore: Send + Sync {
    // Machines
    async fn get_edge_machine(&self, namespace: &str, name: &str) -> Result<Option<EdgeMachine>, StoreError>;
    /// Machines in `namespace` labelled with `node_guid`
    async fn list_edge_machines_by_node_guid(
        &self,
        namespace: &str,
        node_guid: &str,
    ) -> Result<Vec<EdgeMachine>, StoreError>;
    /// Persist metadata (labels, finalizers), spec and status in one save
    async fn update_edge_machine(&self, machine: &EdgeMachine) -> Result<EdgeMachine, StoreError>;

    // Clusters
    async fn get_edge_cluster(&self, namespace: &str, name: &str) -> Result<Option<EdgeCluster>, StoreError>;
    async fn update_edge_cluster(&self, cluster: &EdgeCluster) -> Result<EdgeCluster, StoreError>;

    // Owner records
    async fn get_machine(&self, namespace: &str, name: &str) -> Result<Option<Machine>, StoreError>;
    async fn get_cluster(&self, namespace: &str, name: &str) -> Result<Option<Cluster>, StoreError>;

    // Binding pool
    /// Entries of the (cluster, template) pool, in list order
    async fn list_bindings(
        &self,
        namespace: &str,
        cluster_name: &str,
        template_name: &str,
    ) -> Result<Vec<MachineBinding>, StoreError>;
    async fn update_binding(&self, binding: &MachineBinding) -> Result<MachineBinding, StoreError>;

    // Templates
    async fn get_machine_template(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<EdgeMachineTemplate>, StoreError>;

    // Tunnels
    async fn get_tunnel(&self, namespace: &str, name: &str) -> Result<Option<TunnelConnection>, StoreError>;
    async fn create_tunnel(&self, tunnel: &TunnelConnection) -> Result<TunnelConnection, StoreError>;
    /// Fails with `StoreError::NotFound` when absent
    async fn delete_tunnel(&self, namespace: &str, name: &str) -> Result<(), StoreError>;

    // Secrets
    async fn get_secret(&self, namespace: &str, name: &str) -> Result<Option<Secret>, StoreError>;
}

/// `namespace/name` key of a record, for logs and errors
pub fn record_key(meta: &k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta) -> String {
    format!(
        "{}/{}",
        meta.namespace.as_deref().unwrap_or_default(),
        meta.name.as_deref().unwrap_or_default()
    )
}
