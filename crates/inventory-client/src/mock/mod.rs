//! Mock InventoryClient for unit testing
//!
//! This module provides an in-memory implementation of InventoryClientTrait
//! that can be used in unit tests without a running inventory service.
//!
//! The mock is organized into domain-specific modules:
//! - `compute.rs` - hosts and instances
//! - `workloads.rs` - workloads and workload memberships
//!
//! Every trait call is counted per operation name, and a one-shot error can be
//! injected for any operation.

mod compute;
mod workloads;

use crate::error::InventoryError;
use crate::inventory_trait::InventoryClientTrait;
use crate::models::*;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Mock InventoryClient for testing
///
/// Resources are not partitioned by tenant.
#[derive(Clone)]
pub struct MockInventoryClient {
    pub(crate) base_url: String,
    // Hosts keyed by uuid
    pub(crate) hosts: Arc<Mutex<HashMap<String, Host>>>,
    pub(crate) instances: Arc<Mutex<HashMap<String, Instance>>>,
    pub(crate) workloads: Arc<Mutex<HashMap<String, Workload>>>,
    pub(crate) calls: Arc<Mutex<HashMap<String, usize>>>,
    pub(crate) failures: Arc<Mutex<HashMap<String, InventoryError>>>,
    pub(crate) next_id: Arc<Mutex<u64>>,
}

impl MockInventoryClient {
    /// Create a new mock client
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            hosts: Arc::new(Mutex::new(HashMap::new())),
            instances: Arc::new(Mutex::new(HashMap::new())),
            workloads: Arc::new(Mutex::new(HashMap::new())),
            calls: Arc::new(Mutex::new(HashMap::new())),
            failures: Arc::new(Mutex::new(HashMap::new())),
            next_id: Arc::new(Mutex::new(1)),
        }
    }

    /// Add a host (and its instance, if any) to the mock store
    pub fn add_host(&self, host: Host) {
        if let Some(instance) = &host.instance {
            self.add_instance(instance.clone());
        }
        self.hosts.lock().unwrap().insert(host.uuid.clone(), host);
    }

    /// Add a host with a fresh instance for `host_uuid`, returning the instance id
    pub fn add_host_with_instance(&self, host_uuid: &str) -> String {
        let id = self.next_id();
        let instance = Instance {
            resource_id: format!("inst-{:08x}", id),
            name: format!("instance-{}", id),
            workload_members: Vec::new(),
        };
        let instance_id = instance.resource_id.clone();
        self.add_host(Host {
            resource_id: format!("host-{:08x}", id),
            uuid: host_uuid.to_string(),
            name: format!("host-{}", id),
            desired_state: HostDesiredState::Onboarded,
            note: String::new(),
            instance: Some(instance),
        });
        instance_id
    }

    /// Add an instance to the mock store
    pub fn add_instance(&self, instance: Instance) {
        self.instances.lock().unwrap().insert(instance.resource_id.clone(), instance);
    }

    /// Add a workload to the mock store
    pub fn add_workload(&self, workload: Workload) {
        self.workloads.lock().unwrap().insert(workload.resource_id.clone(), workload);
    }

    /// Current view of a host
    pub fn host(&self, host_uuid: &str) -> Option<Host> {
        self.hosts.lock().unwrap().get(host_uuid).cloned()
    }

    /// Current view of an instance
    pub fn instance(&self, instance_id: &str) -> Option<Instance> {
        self.instances.lock().unwrap().get(instance_id).cloned()
    }

    /// Current view of a workload
    pub fn workload(&self, workload_id: &str) -> Option<Workload> {
        self.workloads.lock().unwrap().get(workload_id).cloned()
    }

    /// Number of workloads in the store
    pub fn workload_count(&self) -> usize {
        self.workloads.lock().unwrap().len()
    }

    /// Number of times an operation was invoked
    pub fn calls(&self, op: &str) -> usize {
        self.calls.lock().unwrap().get(op).copied().unwrap_or(0)
    }

    /// Fail the next call of `op` with `error`
    pub fn inject_error(&self, op: &str, error: InventoryError) {
        self.failures.lock().unwrap().insert(op.to_string(), error);
    }

    /// Count the call and return an injected failure, if any
    pub(crate) fn record(&self, op: &str) -> Result<(), InventoryError> {
        *self.calls.lock().unwrap().entry(op.to_string()).or_insert(0) += 1;
        match self.failures.lock().unwrap().remove(op) {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    /// Generate next ID
    pub(crate) fn next_id(&self) -> u64 {
        let mut id = self.next_id.lock().unwrap();
        let current = *id;
        *id += 1;
        current
    }
}

#[async_trait::async_trait]
impl InventoryClientTrait for MockInventoryClient {
    fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn validate_token(&self) -> Result<(), InventoryError> {
        self.record("validate_token")
    }

    // Compute - delegated to compute module
    async fn get_host(&self, tenant: &str, host_uuid: &str) -> Result<Host, InventoryError> {
        self.record("get_host")?;
        compute::get_host(self, tenant, host_uuid).await
    }

    async fn get_instance(&self, tenant: &str, instance_id: &str) -> Result<Instance, InventoryError> {
        self.record("get_instance")?;
        compute::get_instance(self, tenant, instance_id).await
    }

    async fn deauthorize_host(&self, tenant: &str, host_uuid: &str) -> Result<(), InventoryError> {
        self.record("deauthorize_host")?;
        compute::deauthorize_host(self, tenant, host_uuid).await
    }

    // Workloads - delegated to workloads module
    async fn create_workload(&self, tenant: &str, cluster_name: &str) -> Result<String, InventoryError> {
        self.record("create_workload")?;
        workloads::create_workload(self, tenant, cluster_name).await
    }

    async fn get_workload(&self, tenant: &str, workload_id: &str) -> Result<Workload, InventoryError> {
        self.record("get_workload")?;
        workloads::get_workload(self, tenant, workload_id).await
    }

    async fn delete_workload(&self, tenant: &str, workload_id: &str) -> Result<(), InventoryError> {
        self.record("delete_workload")?;
        workloads::delete_workload(self, tenant, workload_id).await
    }

    async fn add_instance_to_workload(
        &self,
        tenant: &str,
        workload_id: &str,
        instance_id: &str,
    ) -> Result<WorkloadMember, InventoryError> {
        self.record("add_instance_to_workload")?;
        workloads::add_instance_to_workload(self, tenant, workload_id, instance_id).await
    }

    async fn delete_instance_from_workload(
        &self,
        tenant: &str,
        workload_id: &str,
        instance_id: &str,
    ) -> Result<(), InventoryError> {
        self.record("delete_instance_from_workload")?;
        workloads::delete_instance_from_workload(self, tenant, workload_id, instance_id).await
    }
}
