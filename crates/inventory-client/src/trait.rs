//! InventoryClient trait for mocking
//!
//! This trait abstracts the InventoryClient so the lifecycles can be driven
//! against an in-memory implementation in unit tests.

use crate::error::InventoryError;
use crate::models::*;

/// Trait for inventory API client operations
///
/// Every operation is scoped to a tenant. All async methods must be `Send`
/// to work with Tokio's work-stealing runtime.
#[async_trait::async_trait]
pub trait InventoryClientTrait: Send + Sync {
    /// Get the base URL
    fn base_url(&self) -> &str;

    /// Validate the API token
    async fn validate_token(&self) -> Result<(), InventoryError>;

    // Compute
    async fn get_host(&self, tenant: &str, host_uuid: &str) -> Result<Host, InventoryError>;
    async fn get_instance(&self, tenant: &str, instance_id: &str) -> Result<Instance, InventoryError>;
    async fn deauthorize_host(&self, tenant: &str, host_uuid: &str) -> Result<(), InventoryError>;

    // Workloads
    /// Create a cluster workload, returning its resource id
    async fn create_workload(&self, tenant: &str, cluster_name: &str) -> Result<String, InventoryError>;
    async fn get_workload(&self, tenant: &str, workload_id: &str) -> Result<Workload, InventoryError>;
    async fn delete_workload(&self, tenant: &str, workload_id: &str) -> Result<(), InventoryError>;
    async fn add_instance_to_workload(
        &self,
        tenant: &str,
        workload_id: &str,
        instance_id: &str,
    ) -> Result<WorkloadMember, InventoryError>;
    /// Remove the cluster-node membership linking the instance to the workload.
    ///
    /// Returns `NotFound` when no such membership exists.
    async fn delete_instance_from_workload(
        &self,
        tenant: &str,
        workload_id: &str,
        instance_id: &str,
    ) -> Result<(), InventoryError>;
}
