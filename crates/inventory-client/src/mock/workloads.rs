//! Workload operations for MockInventoryClient
//!
//! Handles workloads and workload memberships. Adding the same instance twice
//! creates two memberships, like the real service does.

use super::MockInventoryClient;
use crate::error::InventoryError;
use crate::models::*;

pub async fn create_workload(
    client: &MockInventoryClient,
    tenant: &str,
    cluster_name: &str,
) -> Result<String, InventoryError> {
    require_input(tenant, "tenant")?;
    let request = CreateWorkloadRequest::for_cluster(cluster_name);
    request.validate()?;

    let id = client.next_id();
    let workload = Workload {
        resource_id: format!("workload-{:08x}", id),
        name: request.name,
        kind: request.kind,
        external_id: request.external_id,
        status: request.status,
        members: Vec::new(),
    };
    let workload_id = workload.resource_id.clone();
    client.add_workload(workload);
    Ok(workload_id)
}

pub async fn get_workload(
    client: &MockInventoryClient,
    tenant: &str,
    workload_id: &str,
) -> Result<Workload, InventoryError> {
    require_input(tenant, "tenant")?;
    require_input(workload_id, "workload id")?;

    client
        .workloads
        .lock()
        .unwrap()
        .get(workload_id)
        .cloned()
        .ok_or_else(|| InventoryError::NotFound(format!("Workload {} not found", workload_id)))
}

pub async fn delete_workload(client: &MockInventoryClient, tenant: &str, workload_id: &str) -> Result<(), InventoryError> {
    require_input(tenant, "tenant")?;
    require_input(workload_id, "workload id")?;

    client
        .workloads
        .lock()
        .unwrap()
        .remove(workload_id)
        .map(|_| ())
        .ok_or_else(|| InventoryError::NotFound(format!("Workload {} not found", workload_id)))
}

pub async fn add_instance_to_workload(
    client: &MockInventoryClient,
    tenant: &str,
    workload_id: &str,
    instance_id: &str,
) -> Result<WorkloadMember, InventoryError> {
    require_input(tenant, "tenant")?;
    let request = CreateWorkloadMemberRequest {
        kind: WorkloadMemberKind::ClusterNode,
        workload_id: workload_id.to_string(),
        instance_id: instance_id.to_string(),
    };
    request.validate()?;

    let id = client.next_id();
    let member = WorkloadMember {
        resource_id: format!("workloadmember-{:08x}", id),
        kind: request.kind,
        workload_id: request.workload_id,
        instance_id: request.instance_id,
    };

    let mut workloads = client.workloads.lock().unwrap();
    let workload = workloads
        .get_mut(workload_id)
        .ok_or_else(|| InventoryError::NotFound(format!("Workload {} not found", workload_id)))?;
    let mut instances = client.instances.lock().unwrap();
    let instance = instances
        .get_mut(instance_id)
        .ok_or_else(|| InventoryError::NotFound(format!("Instance {} not found", instance_id)))?;

    workload.members.push(member.clone());
    instance.workload_members.push(member.clone());
    Ok(member)
}

pub async fn delete_instance_from_workload(
    client: &MockInventoryClient,
    tenant: &str,
    workload_id: &str,
    instance_id: &str,
) -> Result<(), InventoryError> {
    require_input(workload_id, "workload id")?;
    let instance = super::compute::get_instance(client, tenant, instance_id).await?;

    let member_id = find_cluster_membership(&instance, workload_id)
        .map(|m| m.resource_id.clone())
        .ok_or_else(|| {
            InventoryError::NotFound(format!(
                "instance {} is not a member of workload {}",
                instance_id, workload_id
            ))
        })?;

    if let Some(instance) = client.instances.lock().unwrap().get_mut(instance_id) {
        instance.workload_members.retain(|m| m.resource_id != member_id);
    }
    if let Some(workload) = client.workloads.lock().unwrap().get_mut(workload_id) {
        workload.members.retain(|m| m.resource_id != member_id);
    }
    Ok(())
}
