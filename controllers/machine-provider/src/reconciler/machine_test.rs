//! Unit tests for EdgeMachine reconciliation

#[cfg(test)]
mod tests {
    use crate::error::{ControllerError, ScopeError};
    use crate::reconciler::Reconciled;
    use crate::test_utils::*;
    use crds::metadata::{self, DEAUTH_HOST_FINALIZER, FREE_INSTANCE_FINALIZER, LEGACY_MACHINE_FINALIZER, NODE_GUID_LABEL};
    use crds::*;
    use inventory_client::{HostDesiredState, InventoryClientTrait, InventoryError};
    use record_store::RecordStore;

    const GUID: &str = "5f2b1c9e-1111-4a2b-9c3d-000000000001";

    /// Everything a worker machine needs to be reserved, returning the workload id
    async fn setup_reservable(fx: &Fixture) -> String {
        let workload_id = fx.inventory.create_workload(NS, CLUSTER).await.unwrap();
        fx.store.insert_cluster(create_test_cluster(true, true));
        fx.store.insert_edge_cluster(create_test_edge_cluster(Some(&workload_id)));
        fx.store.insert_machine(create_test_machine("m1", Some("m1-bootstrap"), false));
        fx.store.insert_edge_machine(create_test_edge_machine("em1", Some("m1")));
        fx.store.insert_binding(create_test_binding("b1", GUID));
        workload_id
    }

    async fn reconcile(fx: &Fixture) -> Result<Reconciled, ControllerError> {
        let current = fx.store.edge_machine(NS, "em1").unwrap();
        fx.reconciler.reconcile_edge_machine(&current).await
    }

    fn host_provisioned(fx: &Fixture) -> Condition {
        fx.store
            .edge_machine(NS, "em1")
            .unwrap()
            .condition(HOST_PROVISIONED_CONDITION)
            .cloned()
            .unwrap()
    }

    async fn report_host_state(fx: &Fixture, state: HostState) {
        let mut machine = fx.store.edge_machine(NS, "em1").unwrap();
        machine.status_mut().host_state = Some(state);
        fx.store.update_edge_machine(&machine).await.unwrap();
    }

    #[tokio::test]
    async fn test_machine_without_owner_is_left_alone() {
        let fx = create_test_fixture();
        fx.store.insert_edge_machine(create_test_edge_machine("em1", None));

        assert_eq!(reconcile(&fx).await.unwrap(), Reconciled::Done);
        assert_eq!(fx.store.writes("update_edge_machine"), 0);
    }

    #[tokio::test]
    async fn test_missing_cluster_is_a_scope_error() {
        let fx = create_test_fixture();
        fx.store.insert_machine(create_test_machine("m1", None, false));
        fx.store.insert_edge_machine(create_test_edge_machine("em1", Some("m1")));

        let err = reconcile(&fx).await.unwrap_err();
        assert!(matches!(err, ControllerError::Scope(ScopeError::MissingCluster)));
    }

    #[tokio::test]
    async fn test_missing_edge_cluster_is_a_scope_error() {
        let fx = create_test_fixture();
        fx.store.insert_cluster(create_test_cluster(true, true));
        fx.store.insert_machine(create_test_machine("m1", None, false));
        fx.store.insert_edge_machine(create_test_edge_machine("em1", Some("m1")));

        let err = reconcile(&fx).await.unwrap_err();
        assert!(matches!(err, ControllerError::Scope(ScopeError::MissingEdgeCluster)));
    }

    #[tokio::test]
    async fn test_waits_for_cluster_infrastructure() {
        let fx = create_test_fixture();
        setup_reservable(&fx).await;
        fx.store.insert_cluster(create_test_cluster(false, false));

        assert_eq!(reconcile(&fx).await.unwrap(), Reconciled::Requeue);
        let condition = host_provisioned(&fx);
        assert_eq!(condition.reason, WAITING_FOR_CLUSTER_INFRASTRUCTURE_REASON);
        assert_eq!(condition.severity, ConditionSeverity::Info);
        assert_eq!(fx.inventory.calls("get_host"), 0);
    }

    #[tokio::test]
    async fn test_worker_waits_for_control_plane() {
        let fx = create_test_fixture();
        setup_reservable(&fx).await;
        fx.store.insert_cluster(create_test_cluster(true, false));
        fx.store.insert_machine(create_test_machine("m1", None, false));

        assert_eq!(reconcile(&fx).await.unwrap(), Reconciled::Requeue);
        assert_eq!(host_provisioned(&fx).reason, WAITING_FOR_CONTROL_PLANE_REASON);
    }

    #[tokio::test]
    async fn test_control_plane_waits_for_bootstrap_data() {
        let fx = create_test_fixture();
        setup_reservable(&fx).await;
        fx.store.insert_cluster(create_test_cluster(true, false));
        fx.store.insert_machine(create_test_machine("m1", None, true));

        assert_eq!(reconcile(&fx).await.unwrap(), Reconciled::Requeue);
        assert_eq!(host_provisioned(&fx).reason, WAITING_FOR_BOOTSTRAP_DATA_REASON);
    }

    #[tokio::test]
    async fn test_exhausted_pool_waits_for_binding() {
        let fx = create_test_fixture();
        setup_reservable(&fx).await;
        let mut taken = fx.store.binding(NS, "b1").unwrap();
        taken.status = Some(MachineBindingStatus { allocated: true });
        fx.store.insert_binding(taken);

        assert_eq!(reconcile(&fx).await.unwrap(), Reconciled::Requeue);
        let condition = host_provisioned(&fx);
        assert_eq!(condition.reason, WAITING_FOR_MACHINE_BINDING_REASON);
        assert_eq!(condition.severity, ConditionSeverity::Warning);
        assert!(fx.store.edge_machine(NS, "em1").unwrap().node_guid().is_none());
    }

    #[tokio::test]
    async fn test_reserves_host_into_workload() {
        let fx = create_test_fixture();
        let workload_id = setup_reservable(&fx).await;
        let instance_id = fx.inventory.add_host_with_instance(GUID);

        assert_eq!(reconcile(&fx).await.unwrap(), Reconciled::Done);

        let machine = fx.store.edge_machine(NS, "em1").unwrap();
        assert_eq!(machine.node_guid(), Some(GUID));
        assert_eq!(metadata::label(&machine.metadata, NODE_GUID_LABEL), Some(GUID));
        assert_eq!(machine.provider_id(), Some(instance_id.as_str()));
        assert!(machine.status.as_ref().unwrap().host_id.is_some());
        assert!(metadata::has_finalizer(&machine.metadata, FREE_INSTANCE_FINALIZER));
        assert!(metadata::has_finalizer(&machine.metadata, DEAUTH_HOST_FINALIZER));
        assert!(host_provisioned(&fx).is_true());
        assert_eq!(fx.inventory.workload(&workload_id).unwrap().members.len(), 1);
    }

    #[tokio::test]
    async fn test_reconciling_again_does_not_reserve_twice() {
        let fx = create_test_fixture();
        let workload_id = setup_reservable(&fx).await;
        fx.inventory.add_host_with_instance(GUID);

        reconcile(&fx).await.unwrap();
        let provider_id = fx.store.edge_machine(NS, "em1").unwrap().provider_id().map(str::to_string);
        reconcile(&fx).await.unwrap();
        reconcile(&fx).await.unwrap();

        assert_eq!(fx.inventory.calls("add_instance_to_workload"), 1);
        assert_eq!(fx.inventory.workload(&workload_id).unwrap().members.len(), 1);
        assert_eq!(fx.store.edge_machine(NS, "em1").unwrap().provider_id().map(str::to_string), provider_id);
    }

    #[tokio::test]
    async fn test_existing_membership_is_not_added_again() {
        let fx = create_test_fixture();
        let workload_id = setup_reservable(&fx).await;
        let instance_id = fx.inventory.add_host_with_instance(GUID);
        // A previous cycle reserved the instance but failed to save
        fx.inventory.add_instance_to_workload(NS, &workload_id, &instance_id).await.unwrap();

        assert_eq!(reconcile(&fx).await.unwrap(), Reconciled::Done);

        assert_eq!(fx.inventory.calls("add_instance_to_workload"), 1);
        assert_eq!(fx.inventory.workload(&workload_id).unwrap().members.len(), 1);
        assert_eq!(fx.store.edge_machine(NS, "em1").unwrap().provider_id(), Some(instance_id.as_str()));
    }

    #[tokio::test]
    async fn test_missing_workload_fails_provisioning() {
        let fx = create_test_fixture();
        setup_reservable(&fx).await;
        fx.store.insert_edge_cluster(create_test_edge_cluster(None));
        fx.inventory.add_host_with_instance(GUID);

        assert_eq!(reconcile(&fx).await.unwrap(), Reconciled::Requeue);
        assert_eq!(host_provisioned(&fx).reason, HOST_PROVISIONING_FAILED_REASON);
        assert_eq!(fx.inventory.calls("add_instance_to_workload"), 0);
    }

    #[tokio::test]
    async fn test_unknown_host_fails_provisioning() {
        let fx = create_test_fixture();
        setup_reservable(&fx).await;

        assert_eq!(reconcile(&fx).await.unwrap(), Reconciled::Requeue);
        let condition = host_provisioned(&fx);
        assert_eq!(condition.reason, HOST_PROVISIONING_FAILED_REASON);
        assert_eq!(condition.severity, ConditionSeverity::Warning);
        assert!(fx.store.edge_machine(NS, "em1").unwrap().provider_id().is_none());
        // The allocated node is kept for the next attempt
        assert_eq!(fx.store.edge_machine(NS, "em1").unwrap().node_guid(), Some(GUID));
    }

    #[tokio::test]
    async fn test_failed_reservation_is_retried() {
        let fx = create_test_fixture();
        setup_reservable(&fx).await;
        fx.inventory.add_host_with_instance(GUID);
        fx.inventory
            .inject_error("add_instance_to_workload", InventoryError::Api("503".to_string()));

        assert_eq!(reconcile(&fx).await.unwrap(), Reconciled::Requeue);
        assert_eq!(host_provisioned(&fx).reason, HOST_PROVISIONING_FAILED_REASON);

        assert_eq!(reconcile(&fx).await.unwrap(), Reconciled::Done);
        assert!(host_provisioned(&fx).is_true());
        assert_eq!(fx.store.writes("update_binding"), 1);
    }

    #[tokio::test]
    async fn test_host_state_projection() {
        let fx = create_test_fixture();
        setup_reservable(&fx).await;
        fx.inventory.add_host_with_instance(GUID);
        reconcile(&fx).await.unwrap();

        reconcile(&fx).await.unwrap();
        let machine = fx.store.edge_machine(NS, "em1").unwrap();
        assert_eq!(machine.condition(BOOTSTRAP_EXEC_SUCCEEDED_CONDITION).unwrap().reason, BOOTSTRAPPING_REASON);
        assert!(!machine.is_ready());

        report_host_state(&fx, HostState::Active).await;
        reconcile(&fx).await.unwrap();
        let machine = fx.store.edge_machine(NS, "em1").unwrap();
        assert!(machine.condition(BOOTSTRAP_EXEC_SUCCEEDED_CONDITION).unwrap().is_true());
        assert!(machine.is_ready());

        report_host_state(&fx, HostState::Error).await;
        reconcile(&fx).await.unwrap();
        let machine = fx.store.edge_machine(NS, "em1").unwrap();
        let bootstrap = machine.condition(BOOTSTRAP_EXEC_SUCCEEDED_CONDITION).unwrap();
        assert_eq!(bootstrap.reason, BOOTSTRAP_FAILED_REASON);
        assert_eq!(bootstrap.severity, ConditionSeverity::Error);
        assert!(machine.is_ready(), "ready is never reset");

        report_host_state(&fx, HostState::Inactive).await;
        reconcile(&fx).await.unwrap();
        let machine = fx.store.edge_machine(NS, "em1").unwrap();
        assert_eq!(machine.condition(BOOTSTRAP_EXEC_SUCCEEDED_CONDITION).unwrap().reason, BOOTSTRAP_WAITING_REASON);
    }

    #[tokio::test]
    async fn test_summary_condition_follows_steps() {
        let fx = create_test_fixture();
        setup_reservable(&fx).await;
        fx.store.insert_cluster(create_test_cluster(false, false));

        reconcile(&fx).await.unwrap();
        let machine = fx.store.edge_machine(NS, "em1").unwrap();
        let ready = machine.condition(conditions::READY_CONDITION).unwrap();
        assert_eq!(ready.status, ConditionStatus::False);
        assert_eq!(ready.reason, WAITING_FOR_CLUSTER_INFRASTRUCTURE_REASON);
    }

    #[tokio::test]
    async fn test_delete_releases_instance_and_deauthorizes_host() {
        let fx = create_test_fixture();
        let workload_id = setup_reservable(&fx).await;
        fx.inventory.add_host_with_instance(GUID);
        reconcile(&fx).await.unwrap();
        fx.store.mark_edge_machine_deleting(NS, "em1");

        assert_eq!(reconcile(&fx).await.unwrap(), Reconciled::Done);

        assert_eq!(fx.inventory.calls("delete_instance_from_workload"), 1);
        assert_eq!(fx.inventory.calls("deauthorize_host"), 1);
        assert!(fx.inventory.workload(&workload_id).unwrap().members.is_empty());
        let host = fx.inventory.host(GUID).unwrap();
        assert_eq!(host.desired_state, HostDesiredState::Untrusted);
        assert!(fx.store.edge_machine(NS, "em1").is_none(), "all finalizers removed");
    }

    #[tokio::test]
    async fn test_delete_retries_only_the_failed_step() {
        let fx = create_test_fixture();
        setup_reservable(&fx).await;
        fx.inventory.add_host_with_instance(GUID);
        reconcile(&fx).await.unwrap();
        fx.store.mark_edge_machine_deleting(NS, "em1");
        fx.inventory
            .inject_error("deauthorize_host", InventoryError::Api("unavailable".to_string()));

        let err = reconcile(&fx).await.unwrap_err();
        assert!(matches!(err, ControllerError::Inventory(_)));
        let machine = fx.store.edge_machine(NS, "em1").unwrap();
        assert!(!metadata::has_finalizer(&machine.metadata, FREE_INSTANCE_FINALIZER));
        assert!(metadata::has_finalizer(&machine.metadata, DEAUTH_HOST_FINALIZER));
        assert_eq!(machine.condition(HOST_PROVISIONED_CONDITION).unwrap().reason, DELETING_REASON);

        assert_eq!(reconcile(&fx).await.unwrap(), Reconciled::Done);
        assert_eq!(fx.inventory.calls("delete_instance_from_workload"), 1);
        assert_eq!(fx.inventory.calls("deauthorize_host"), 2);
        assert!(fx.store.edge_machine(NS, "em1").is_none());
    }

    #[tokio::test]
    async fn test_delete_tolerates_released_membership() {
        let fx = create_test_fixture();
        let workload_id = setup_reservable(&fx).await;
        let instance_id = fx.inventory.add_host_with_instance(GUID);
        reconcile(&fx).await.unwrap();
        fx.inventory
            .delete_instance_from_workload(NS, &workload_id, &instance_id)
            .await
            .unwrap();
        fx.store.mark_edge_machine_deleting(NS, "em1");

        assert_eq!(reconcile(&fx).await.unwrap(), Reconciled::Done);
        assert_eq!(fx.inventory.calls("deauthorize_host"), 1);
        assert!(fx.store.edge_machine(NS, "em1").is_none());
    }

    #[tokio::test]
    async fn test_delete_release_failure_keeps_both_finalizers() {
        let fx = create_test_fixture();
        setup_reservable(&fx).await;
        fx.inventory.add_host_with_instance(GUID);
        reconcile(&fx).await.unwrap();
        fx.store.mark_edge_machine_deleting(NS, "em1");
        fx.inventory.inject_error(
            "delete_instance_from_workload",
            InventoryError::Timeout(std::time::Duration::from_secs(5)),
        );

        assert!(reconcile(&fx).await.is_err());
        let machine = fx.store.edge_machine(NS, "em1").unwrap();
        assert!(metadata::has_finalizer(&machine.metadata, FREE_INSTANCE_FINALIZER));
        assert!(metadata::has_finalizer(&machine.metadata, DEAUTH_HOST_FINALIZER));
        assert_eq!(fx.inventory.calls("deauthorize_host"), 0);
    }

    #[tokio::test]
    async fn test_delete_drops_legacy_finalizer() {
        let fx = create_test_fixture();
        setup_reservable(&fx).await;
        let mut machine = fx.store.edge_machine(NS, "em1").unwrap();
        metadata::add_finalizer(&mut machine.metadata, LEGACY_MACHINE_FINALIZER);
        fx.store.insert_edge_machine(machine);
        fx.store.mark_edge_machine_deleting(NS, "em1");

        assert_eq!(reconcile(&fx).await.unwrap(), Reconciled::Done);
        assert!(fx.store.edge_machine(NS, "em1").is_none());
        assert_eq!(fx.inventory.calls("deauthorize_host"), 0);
    }

    /// A reserved machine marked for deletion, stored without any of its owners
    fn insert_deleting_reserved_machine(fx: &Fixture, owner: Option<&str>) {
        let instance_id = fx.inventory.add_host_with_instance(GUID);
        let mut machine = create_test_edge_machine("em1", owner);
        machine.set_node_guid(GUID);
        machine.spec.provider_id = Some(instance_id);
        metadata::add_finalizer(&mut machine.metadata, FREE_INSTANCE_FINALIZER);
        metadata::add_finalizer(&mut machine.metadata, DEAUTH_HOST_FINALIZER);
        fx.store.insert_edge_machine(machine);
        fx.store.mark_edge_machine_deleting(NS, "em1");
    }

    #[tokio::test]
    async fn test_delete_without_owner_machine_still_deauthorizes() {
        let fx = create_test_fixture();
        insert_deleting_reserved_machine(&fx, Some("m1"));

        assert_eq!(reconcile(&fx).await.unwrap(), Reconciled::Done);
        assert_eq!(fx.inventory.calls("delete_instance_from_workload"), 0);
        assert_eq!(fx.inventory.calls("deauthorize_host"), 1);
        assert_eq!(fx.inventory.host(GUID).unwrap().desired_state, HostDesiredState::Untrusted);
        assert!(fx.store.edge_machine(NS, "em1").is_none());
    }

    #[tokio::test]
    async fn test_delete_without_edge_cluster_releases_finalizers() {
        let fx = create_test_fixture();
        fx.store.insert_cluster(create_test_cluster(true, true));
        fx.store.insert_machine(create_test_machine("m1", Some("m1-bootstrap"), false));
        insert_deleting_reserved_machine(&fx, Some("m1"));

        assert_eq!(reconcile(&fx).await.unwrap(), Reconciled::Done);
        assert_eq!(fx.inventory.calls("delete_instance_from_workload"), 0);
        assert_eq!(fx.inventory.calls("deauthorize_host"), 1);
        assert!(fx.store.edge_machine(NS, "em1").is_none());
    }

    #[tokio::test]
    async fn test_delete_without_owner_reference_is_torn_down() {
        let fx = create_test_fixture();
        insert_deleting_reserved_machine(&fx, None);

        assert_eq!(reconcile(&fx).await.unwrap(), Reconciled::Done);
        assert_eq!(fx.inventory.calls("deauthorize_host"), 1);
        assert!(fx.store.edge_machine(NS, "em1").is_none());
    }
}
