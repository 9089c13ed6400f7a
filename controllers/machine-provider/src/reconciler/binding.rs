//! MachineBinding allocation
//!
//! Bindings of one (cluster, template) pool are fungible. A machine that
//! already owns one gets it back, so a retry after a partial failure never
//! takes a second entry.

use crate::error::AllocationError;
use crds::metadata::{self, CLONED_FROM_NAME_ANNOTATION};
use crds::{EdgeMachine, MachineBinding, pool_key};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use record_store::RecordStore;
use tracing::{debug, info};

/// Take a binding from the `<cluster>/<template>` pool for `requester`.
///
/// Ownership and the allocated flag are persisted in one save; if it fails
/// nothing is considered allocated.
pub async fn allocate_binding(
    store: &dyn RecordStore,
    namespace: &str,
    cluster_name: &str,
    template_name: &str,
    requester: &OwnerReference,
) -> Result<MachineBinding, AllocationError> {
    let key = pool_key(cluster_name, template_name);
    let bindings = store.list_bindings(namespace, cluster_name, template_name).await?;

    if let Some(owned) = bindings.iter().find(|b| b.is_owned_by(requester)) {
        debug!(pool = %key, requester = %requester.name, "Requester already owns a binding");
        if owned.is_allocated() {
            return Ok(owned.clone());
        }
        // Owner landed but the allocated flag did not
        let mut owned = owned.clone();
        owned.allocate_to(requester.clone());
        return Ok(store.update_binding(&owned).await?);
    }

    let Some(free) = bindings.iter().find(|b| !b.is_allocated()) else {
        return Err(AllocationError::NoAvailableBinding(key));
    };

    let mut binding = free.clone();
    binding.allocate_to(requester.clone());
    let saved = store.update_binding(&binding).await?;
    info!(
        pool = %key,
        binding = %saved.metadata.name.as_deref().unwrap_or_default(),
        requester = %requester.name,
        "Allocated machine binding"
    );
    Ok(saved)
}

/// Template name the machine's binding pool is keyed by.
///
/// Templates cloned per cluster point back to their origin; the origin name
/// is used so clones share one pool.
pub async fn resolve_template_name(
    store: &dyn RecordStore,
    machine: &EdgeMachine,
) -> Result<String, AllocationError> {
    let machine_name = machine.metadata.name.clone().unwrap_or_default();
    let Some(template_name) = metadata::annotation(&machine.metadata, CLONED_FROM_NAME_ANNOTATION) else {
        return Err(AllocationError::MissingTemplate(machine_name));
    };
    let namespace = machine.metadata.namespace.as_deref().unwrap_or_default();

    let origin = store
        .get_machine_template(namespace, template_name)
        .await?
        .and_then(|t| t.cloned_from().map(str::to_string));

    Ok(origin.unwrap_or_else(|| template_name.to_string()))
}

/// Owner reference naming an edge machine
pub fn machine_owner_reference(machine: &EdgeMachine) -> OwnerReference {
    OwnerReference {
        api_version: crds::metadata::API_VERSION.to_string(),
        kind: "EdgeMachine".to_string(),
        name: machine.metadata.name.clone().unwrap_or_default(),
        uid: machine.metadata.uid.clone().unwrap_or_default(),
        controller: Some(true),
        block_owner_deletion: None,
    }
}
