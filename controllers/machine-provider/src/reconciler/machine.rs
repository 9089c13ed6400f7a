//! EdgeMachine reconciliation
//!
//! Provisioning runs through these stages, derived from the record on every
//! invocation:
//!
//! 1. wait for the cluster infrastructure
//! 2. once reserved, project the agent-reported host state onto conditions
//! 3. wait for bootstrap data
//! 4. allocate a node GUID from the binding pool
//! 5. reserve the node's instance into the cluster workload
//!
//! Teardown releases the workload membership and deauthorizes the host, each
//! guarded by its own finalizer so a failed step is retried alone.

use super::binding::{allocate_binding, machine_owner_reference, resolve_template_name};
use super::{Reconciled, Reconciler};
use crate::error::{ControllerError, ScopeError};
use crds::conditions::{self, ConditionSeverity};
use crds::metadata::{self, DEAUTH_HOST_FINALIZER, FREE_INSTANCE_FINALIZER, LEGACY_MACHINE_FINALIZER};
use crds::{
    BOOTSTRAP_EXEC_SUCCEEDED_CONDITION, BOOTSTRAP_FAILED_REASON, BOOTSTRAP_WAITING_REASON, BOOTSTRAPPING_REASON,
    Cluster, DELETING_REASON, EdgeCluster, EdgeMachine, HOST_PROVISIONED_CONDITION, HOST_PROVISIONING_FAILED_REASON,
    HostState, MACHINE_SUMMARY_CONDITIONS, Machine, WAITING_FOR_BOOTSTRAP_DATA_REASON,
    WAITING_FOR_CLUSTER_INFRASTRUCTURE_REASON, WAITING_FOR_CONTROL_PLANE_REASON, WAITING_FOR_MACHINE_BINDING_REASON,
};
use inventory_client::find_cluster_membership;
use record_store::RecordStore;
use tracing::{debug, info, warn};

/// Records a machine reconciliation needs
#[derive(Debug, Default)]
pub struct MachineScopeParams {
    pub edge_machine: Option<EdgeMachine>,
    pub machine: Option<Machine>,
    pub cluster: Option<Cluster>,
    pub edge_cluster: Option<EdgeCluster>,
}

/// A machine together with its owners
#[derive(Debug)]
pub struct MachineScope {
    pub edge_machine: EdgeMachine,
    pub machine: Machine,
    pub cluster: Cluster,
    pub edge_cluster: EdgeCluster,
    namespace: String,
}

impl MachineScope {
    pub fn new(params: MachineScopeParams) -> Result<Self, ScopeError> {
        let edge_machine = params.edge_machine.ok_or(ScopeError::MissingEdgeMachine)?;
        let namespace = edge_machine
            .metadata
            .namespace
            .clone()
            .ok_or_else(|| ScopeError::MissingNamespace(edge_machine.metadata.name.clone().unwrap_or_default()))?;
        Ok(Self {
            machine: params.machine.ok_or(ScopeError::MissingMachine)?,
            cluster: params.cluster.ok_or(ScopeError::MissingCluster)?,
            edge_cluster: params.edge_cluster.ok_or(ScopeError::MissingEdgeCluster)?,
            edge_machine,
            namespace,
        })
    }

    /// Namespace of the machine, which is also its inventory tenant
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn name(&self) -> &str {
        self.edge_machine.metadata.name.as_deref().unwrap_or_default()
    }

    fn conditions_mut(&mut self) -> &mut Vec<crds::Condition> {
        &mut self.edge_machine.status_mut().conditions
    }

    fn mark_host_provisioned_false(&mut self, reason: &str, severity: ConditionSeverity, message: impl Into<String>) {
        conditions::mark_false(self.conditions_mut(), HOST_PROVISIONED_CONDITION, reason, severity, message);
    }

    fn mark_bootstrap_false(&mut self, reason: &str, severity: ConditionSeverity) {
        conditions::mark_false(self.conditions_mut(), BOOTSTRAP_EXEC_SUCCEEDED_CONDITION, reason, severity, "");
    }

    /// Recompute the summary and persist the machine
    pub async fn save(&mut self, store: &dyn RecordStore) -> Result<(), ControllerError> {
        save_edge_machine(store, &mut self.edge_machine).await
    }
}

async fn save_edge_machine(store: &dyn RecordStore, edge_machine: &mut EdgeMachine) -> Result<(), ControllerError> {
    conditions::set_summary(&mut edge_machine.status_mut().conditions, MACHINE_SUMMARY_CONDITIONS);
    *edge_machine = store.update_edge_machine(edge_machine).await?;
    Ok(())
}

impl Reconciler {
    /// Assemble the scope of an edge machine from the store
    pub async fn load_machine_scope(&self, edge_machine: &EdgeMachine) -> Result<MachineScope, ControllerError> {
        let params = self.load_scope_params(edge_machine).await?;
        Ok(MachineScope::new(params)?)
    }

    /// Look up whichever owners of the machine still exist
    async fn load_scope_params(&self, edge_machine: &EdgeMachine) -> Result<MachineScopeParams, ControllerError> {
        let namespace = edge_machine.metadata.namespace.clone().unwrap_or_default();
        let mut params = MachineScopeParams {
            edge_machine: Some(edge_machine.clone()),
            ..Default::default()
        };

        if let Some(owner) = metadata::owner_of_kind(&edge_machine.metadata, "Machine") {
            params.machine = self.store.get_machine(&namespace, &owner.name).await?;
        }
        if let Some(machine) = &params.machine {
            params.cluster = self.store.get_cluster(&namespace, &machine.spec.cluster_name).await?;
        }
        if let Some(name) = params.cluster.as_ref().and_then(Cluster::infrastructure_name) {
            params.edge_cluster = self.store.get_edge_cluster(&namespace, name).await?;
        }

        Ok(params)
    }

    /// Reconcile one edge machine
    pub async fn reconcile_edge_machine(&self, edge_machine: &EdgeMachine) -> Result<Reconciled, ControllerError> {
        // Teardown must not depend on owners that may already be gone
        if edge_machine.is_deleting() {
            return self.reconcile_machine_delete(edge_machine).await;
        }

        let name = edge_machine.metadata.name.as_deref().unwrap_or_default();
        if metadata::owner_of_kind(&edge_machine.metadata, "Machine").is_none() {
            debug!("EdgeMachine {} has no owner Machine yet", name);
            return Ok(Reconciled::Done);
        }

        let mut scope = self.load_machine_scope(edge_machine).await?;
        self.reconcile_machine_normal(&mut scope).await
    }

    pub async fn reconcile_machine_normal(&self, scope: &mut MachineScope) -> Result<Reconciled, ControllerError> {
        let store = self.store.as_ref();

        if !scope.cluster.infrastructure_ready() {
            info!("EdgeMachine {}/{}: waiting for cluster infrastructure", scope.namespace(), scope.name());
            scope.mark_host_provisioned_false(WAITING_FOR_CLUSTER_INFRASTRUCTURE_REASON, ConditionSeverity::Info, "");
            scope.save(store).await?;
            return Ok(Reconciled::Requeue);
        }

        if scope.edge_machine.provider_id().is_some() {
            self.project_host_state(scope);
            scope.save(store).await?;
            return Ok(Reconciled::Done);
        }

        if scope.machine.bootstrap_data_secret().is_none() {
            let reason = if !scope.machine.is_control_plane() && !scope.cluster.control_plane_initialized() {
                WAITING_FOR_CONTROL_PLANE_REASON
            } else {
                WAITING_FOR_BOOTSTRAP_DATA_REASON
            };
            info!("EdgeMachine {}/{}: {}", scope.namespace(), scope.name(), reason);
            scope.mark_host_provisioned_false(reason, ConditionSeverity::Info, "");
            scope.save(store).await?;
            return Ok(Reconciled::Requeue);
        }

        if scope.edge_machine.node_guid().is_none() {
            match self.allocate_node_guid(scope).await {
                Ok(node_guid) => {
                    info!("EdgeMachine {}/{}: allocated node {}", scope.namespace(), scope.name(), node_guid);
                    scope.edge_machine.set_node_guid(&node_guid);
                    scope.save(store).await?;
                }
                Err(e) => {
                    warn!("EdgeMachine {}/{}: binding allocation failed: {}", scope.namespace(), scope.name(), e);
                    scope.mark_host_provisioned_false(
                        WAITING_FOR_MACHINE_BINDING_REASON,
                        ConditionSeverity::Warning,
                        e.to_string(),
                    );
                    scope.save(store).await?;
                    return Ok(Reconciled::Requeue);
                }
            }
        }

        self.reserve_host(scope).await
    }

    async fn allocate_node_guid(&self, scope: &MachineScope) -> Result<String, crate::error::AllocationError> {
        let store = self.store.as_ref();
        let template_name = resolve_template_name(store, &scope.edge_machine).await?;
        let requester = machine_owner_reference(&scope.edge_machine);
        let binding = allocate_binding(
            store,
            scope.namespace(),
            &scope.machine.spec.cluster_name,
            &template_name,
            &requester,
        )
        .await?;
        Ok(binding.spec.node_guid)
    }

    /// Map the agent-reported host state onto the bootstrap condition
    fn project_host_state(&self, scope: &mut MachineScope) {
        conditions::mark_true(scope.conditions_mut(), HOST_PROVISIONED_CONDITION);

        match scope.edge_machine.host_state() {
            None | Some(HostState::InProgress) => scope.mark_bootstrap_false(BOOTSTRAPPING_REASON, ConditionSeverity::Info),
            Some(HostState::Active) => {
                conditions::mark_true(scope.conditions_mut(), BOOTSTRAP_EXEC_SUCCEEDED_CONDITION);
                scope.edge_machine.status_mut().ready = true;
            }
            Some(HostState::Error) => scope.mark_bootstrap_false(BOOTSTRAP_FAILED_REASON, ConditionSeverity::Error),
            Some(HostState::Inactive) => scope.mark_bootstrap_false(BOOTSTRAP_WAITING_REASON, ConditionSeverity::Info),
            Some(HostState::Unknown) => {
                warn!("EdgeMachine {}/{}: unrecognized host state, leaving conditions", scope.namespace(), scope.name());
            }
        }
    }

    /// Reserve the node's instance into the cluster workload
    async fn reserve_host(&self, scope: &mut MachineScope) -> Result<Reconciled, ControllerError> {
        let store = self.store.as_ref();
        let namespace = scope.namespace().to_string();
        let node_guid = scope.edge_machine.node_guid().unwrap_or_default().to_string();

        let Some(workload_id) = scope.edge_cluster.workload_id().map(str::to_string) else {
            scope.mark_host_provisioned_false(
                HOST_PROVISIONING_FAILED_REASON,
                ConditionSeverity::Warning,
                "cluster workload has not been created",
            );
            scope.save(store).await?;
            return Ok(Reconciled::Requeue);
        };

        let host = match self.inventory.get_host(&namespace, &node_guid).await {
            Ok(host) => host,
            Err(e) => {
                warn!("EdgeMachine {}/{}: host lookup for {} failed: {}", namespace, scope.name(), node_guid, e);
                scope.mark_host_provisioned_false(HOST_PROVISIONING_FAILED_REASON, ConditionSeverity::Warning, e.to_string());
                scope.save(store).await?;
                return Ok(Reconciled::Requeue);
            }
        };
        let Some(instance) = host.instance.as_ref() else {
            scope.mark_host_provisioned_false(
                HOST_PROVISIONING_FAILED_REASON,
                ConditionSeverity::Warning,
                format!("host {} has no instance", host.resource_id),
            );
            scope.save(store).await?;
            return Ok(Reconciled::Requeue);
        };

        // A previous cycle may have added the membership without saving
        if find_cluster_membership(instance, &workload_id).is_some() {
            debug!("Instance {} already a member of workload {}", instance.resource_id, workload_id);
        } else if let Err(e) = self
            .inventory
            .add_instance_to_workload(&namespace, &workload_id, &instance.resource_id)
            .await
        {
            warn!("EdgeMachine {}/{}: reservation failed: {}", namespace, scope.name(), e);
            scope.mark_host_provisioned_false(HOST_PROVISIONING_FAILED_REASON, ConditionSeverity::Warning, e.to_string());
            scope.save(store).await?;
            return Ok(Reconciled::Requeue);
        }

        scope.edge_machine.spec.provider_id = Some(instance.resource_id.clone());
        scope.edge_machine.status_mut().host_id = Some(host.resource_id.clone());
        metadata::add_finalizer(&mut scope.edge_machine.metadata, FREE_INSTANCE_FINALIZER);
        metadata::add_finalizer(&mut scope.edge_machine.metadata, DEAUTH_HOST_FINALIZER);
        conditions::mark_true(scope.conditions_mut(), HOST_PROVISIONED_CONDITION);
        scope.save(store).await?;
        info!(
            "EdgeMachine {}/{}: reserved instance {} into workload {}",
            namespace,
            scope.name(),
            instance.resource_id,
            workload_id
        );
        Ok(Reconciled::Done)
    }

    /// Release what the machine holds in the inventory, one finalizer at a time
    ///
    /// Only the cluster workload id is taken from the owners. When the
    /// EdgeCluster is gone the membership cannot be addressed and its
    /// finalizer is released with a warning.
    pub async fn reconcile_machine_delete(&self, edge_machine: &EdgeMachine) -> Result<Reconciled, ControllerError> {
        let store = self.store.as_ref();
        let params = self.load_scope_params(edge_machine).await?;
        let workload_id = params
            .edge_cluster
            .as_ref()
            .and_then(EdgeCluster::workload_id)
            .map(str::to_string);
        let mut edge_machine = edge_machine.clone();
        let name = edge_machine.metadata.name.clone().unwrap_or_default();
        let namespace = edge_machine
            .metadata
            .namespace
            .clone()
            .ok_or_else(|| ScopeError::MissingNamespace(name.clone()))?;

        // Visible before any remote call
        conditions::mark_false(
            &mut edge_machine.status_mut().conditions,
            HOST_PROVISIONED_CONDITION,
            DELETING_REASON,
            ConditionSeverity::Info,
            "",
        );
        metadata::remove_finalizer(&mut edge_machine.metadata, LEGACY_MACHINE_FINALIZER);
        save_edge_machine(store, &mut edge_machine).await?;

        if metadata::has_finalizer(&edge_machine.metadata, FREE_INSTANCE_FINALIZER) {
            match (edge_machine.provider_id().map(str::to_string), workload_id) {
                (Some(instance_id), Some(workload_id)) => {
                    match self
                        .inventory
                        .delete_instance_from_workload(&namespace, &workload_id, &instance_id)
                        .await
                    {
                        Ok(()) => info!("Released instance {} from workload {}", instance_id, workload_id),
                        Err(e) if e.is_not_found() => {
                            debug!("Instance {} no longer a member of workload {}", instance_id, workload_id)
                        }
                        Err(e) => return Err(e.into()),
                    }
                }
                (Some(instance_id), None) => warn!(
                    "EdgeMachine {}/{}: cluster workload unknown, not releasing instance {}",
                    namespace, name, instance_id
                ),
                (None, _) => warn!("EdgeMachine {}/{}: nothing reserved to release", namespace, name),
            }
            metadata::remove_finalizer(&mut edge_machine.metadata, FREE_INSTANCE_FINALIZER);
            save_edge_machine(store, &mut edge_machine).await?;
        }

        if metadata::has_finalizer(&edge_machine.metadata, DEAUTH_HOST_FINALIZER) {
            match edge_machine.node_guid().map(str::to_string) {
                Some(node_guid) => {
                    self.inventory.deauthorize_host(&namespace, &node_guid).await?;
                    info!("Deauthorized host {}", node_guid);
                }
                None => warn!("EdgeMachine {}/{}: no node to deauthorize", namespace, name),
            }
            metadata::remove_finalizer(&mut edge_machine.metadata, DEAUTH_HOST_FINALIZER);
            save_edge_machine(store, &mut edge_machine).await?;
        }

        Ok(Reconciled::Done)
    }
}
