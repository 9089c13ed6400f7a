//! Compute operations for MockInventoryClient
//!
//! Handles hosts and instances

use super::MockInventoryClient;
use crate::error::InventoryError;
use crate::models::*;

pub async fn get_host(client: &MockInventoryClient, tenant: &str, host_uuid: &str) -> Result<Host, InventoryError> {
    require_input(tenant, "tenant")?;
    require_input(host_uuid, "host uuid")?;

    let mut host = client
        .hosts
        .lock()
        .unwrap()
        .get(host_uuid)
        .cloned()
        .ok_or_else(|| InventoryError::NotFound(format!("Host {} not found", host_uuid)))?;

    // Instances are the source of truth for memberships
    if let Some(instance) = host.instance.as_mut() {
        if let Some(current) = client.instances.lock().unwrap().get(&instance.resource_id) {
            *instance = current.clone();
        }
    }
    host.validate()?;
    Ok(host)
}

pub async fn get_instance(
    client: &MockInventoryClient,
    tenant: &str,
    instance_id: &str,
) -> Result<Instance, InventoryError> {
    require_input(tenant, "tenant")?;
    require_input(instance_id, "instance id")?;

    client
        .instances
        .lock()
        .unwrap()
        .get(instance_id)
        .cloned()
        .ok_or_else(|| InventoryError::NotFound(format!("Instance {} not found", instance_id)))
}

pub async fn deauthorize_host(client: &MockInventoryClient, tenant: &str, host_uuid: &str) -> Result<(), InventoryError> {
    get_host(client, tenant, host_uuid).await?;

    let mut hosts = client.hosts.lock().unwrap();
    let host = hosts
        .get_mut(host_uuid)
        .ok_or_else(|| InventoryError::NotFound(format!("Host {} not found", host_uuid)))?;
    let patch = HostStatePatch::untrusted();
    host.desired_state = patch.desired_state;
    host.note = patch.note;
    Ok(())
}
