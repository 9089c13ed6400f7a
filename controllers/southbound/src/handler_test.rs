//! Unit tests for the southbound handler

#[cfg(test)]
mod tests {
    use crate::cloud_config::{KUBEADM_UNINSTALL_COMMAND, RKE2_PROVIDER_ID_FILE, RKE2_UNINSTALL_COMMAND};
    use crate::error::SouthboundError;
    use crate::handler::*;
    use crate::policy::{RequestContext, RolePolicy};
    use crds::metadata::{self, HOST_CLEANUP_FINALIZER};
    use crds::*;
    use k8s_openapi::ByteString;
    use k8s_openapi::api::core::v1::Secret;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference};
    use record_store::{InMemoryRecordStore, StoreError};
    use std::collections::BTreeMap;
    use std::sync::Arc;

    const NS: &str = "default";
    const GUID: &str = "4c4c4544-0042-3510-8052-b4c04f4a4e32";
    const CLOUD_CONFIG: &str = "runcmd:\n  - kubeadm join --config /run/kubeadm/kubeadm.yaml\n";

    fn ctx() -> RequestContext {
        RequestContext {
            tenant: NS.to_string(),
            roles: vec!["node-agent".to_string()],
        }
    }

    fn handler(store: &InMemoryRecordStore) -> SouthboundHandler {
        let policy = RolePolicy::from_yaml("rules:\n  - operations: ['*']\n    roles: [node-agent]\n").unwrap();
        SouthboundHandler::new(Arc::new(store.clone()), Arc::new(policy))
    }

    fn edge_machine(name: &str, provider_id: Option<&str>) -> EdgeMachine {
        let mut machine = EdgeMachine {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some(NS.to_string()),
                owner_references: Some(vec![OwnerReference {
                    api_version: "cluster.x-k8s.io/v1beta1".to_string(),
                    kind: "Machine".to_string(),
                    name: "m1".to_string(),
                    uid: "uid-m1".to_string(),
                    controller: Some(true),
                    block_owner_deletion: None,
                }]),
                ..Default::default()
            },
            spec: EdgeMachineSpec {
                provider_id: provider_id.map(str::to_string),
                node_guid: None,
            },
            status: None,
        };
        machine.set_node_guid(GUID);
        machine
    }

    fn machine(kind: &str) -> Machine {
        Machine {
            metadata: ObjectMeta {
                name: Some("m1".to_string()),
                namespace: Some(NS.to_string()),
                ..Default::default()
            },
            spec: MachineSpec {
                cluster_name: "edge-1".to_string(),
                bootstrap: Bootstrap {
                    config_ref: Some(ConfigReference {
                        api_version: "bootstrap.cluster.x-k8s.io/v1beta1".to_string(),
                        kind: kind.to_string(),
                        name: "m1-config".to_string(),
                    }),
                    data_secret_name: Some("m1-bootstrap".to_string()),
                },
            },
            status: None,
        }
    }

    fn secret(entries: &[(&str, &str)]) -> Secret {
        Secret {
            metadata: ObjectMeta {
                name: Some("m1-bootstrap".to_string()),
                namespace: Some(NS.to_string()),
                ..Default::default()
            },
            data: Some(
                entries
                    .iter()
                    .map(|(k, v)| (k.to_string(), ByteString(v.as_bytes().to_vec())))
                    .collect::<BTreeMap<_, _>>(),
            ),
            ..Default::default()
        }
    }

    /// A reserved machine with kubeadm bootstrap data
    fn registered_store(kind: &str) -> InMemoryRecordStore {
        let store = InMemoryRecordStore::new();
        store.insert_edge_machine(edge_machine("em1", Some("inst-00000007")));
        store.insert_machine(machine(kind));
        store.insert_secret(secret(&[("format", "cloud-config"), ("value", CLOUD_CONFIG)]));
        store
    }

    async fn status(store: &InMemoryRecordStore, code: StatusCode) -> ActionRequest {
        handler(store)
            .update_cluster_status(&ctx(), GUID, code)
            .await
            .unwrap()
            .action_request
    }

    fn stored(store: &InMemoryRecordStore) -> EdgeMachine {
        store.edge_machine(NS, "em1").unwrap()
    }

    #[test]
    fn test_node_guid_forms() {
        assert_eq!(normalize_node_guid(GUID).unwrap(), GUID);
        assert_eq!(normalize_node_guid(&format!("{{{}}}", GUID)).unwrap(), GUID);
        for bad in [
            "",
            "not-a-guid",
            "4c4c454400423510 8052b4c04f4a4e32",
            "4c4c4544004235108052b4c04f4a4e32",
            "{4c4c4544-0042-3510-8052-b4c04f4a4e32",
        ] {
            assert!(matches!(normalize_node_guid(bad), Err(SouthboundError::InvalidNodeGuid(_))), "{bad}");
        }
    }

    #[tokio::test]
    async fn test_register_kubeadm() {
        let store = registered_store(KUBEADM_CONFIG_KIND);

        let response = handler(&store).register_cluster(&ctx(), GUID).await.unwrap();

        assert_eq!(response.result, RegisterResult::Success);
        assert_eq!(
            response.install_cmd,
            "sudo sh -c \"kubeadm join --config /run/kubeadm/kubeadm.yaml\""
        );
        assert_eq!(response.uninstall_cmd, KUBEADM_UNINSTALL_COMMAND);
    }

    #[tokio::test]
    async fn test_register_rke2_injects_provider_id() {
        let store = registered_store(RKE2_CONFIG_KIND);

        let response = handler(&store).register_cluster(&ctx(), GUID).await.unwrap();

        assert!(response.install_cmd.starts_with("sudo sh -c \"mkdir -p /etc/rancher/rke2/config.yaml.d/; "));
        assert!(response.install_cmd.contains(&format!(
            "echo 'kubelet-arg+: [--provider-id=inst-00000007]' > {}",
            RKE2_PROVIDER_ID_FILE
        )));
        assert_eq!(response.uninstall_cmd, RKE2_UNINSTALL_COMMAND);
    }

    #[tokio::test]
    async fn test_register_accepts_braced_guid() {
        let store = registered_store(KUBEADM_CONFIG_KIND);
        let response = handler(&store)
            .register_cluster(&ctx(), &format!("{{{}}}", GUID))
            .await
            .unwrap();
        assert_eq!(response.result, RegisterResult::Success);
    }

    #[tokio::test]
    async fn test_register_unknown_node() {
        let store = InMemoryRecordStore::new();
        let err = handler(&store).register_cluster(&ctx(), GUID).await.unwrap_err();
        assert!(matches!(err, SouthboundError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_register_duplicate_machines() {
        let store = registered_store(KUBEADM_CONFIG_KIND);
        store.insert_edge_machine(edge_machine("em2", Some("inst-00000008")));

        let err = handler(&store).register_cluster(&ctx(), GUID).await.unwrap_err();
        assert!(matches!(err, SouthboundError::DuplicateRecords { count: 2, .. }));
    }

    #[tokio::test]
    async fn test_register_requires_provider_id() {
        let store = registered_store(KUBEADM_CONFIG_KIND);
        store.insert_edge_machine(edge_machine("em1", None));

        let err = handler(&store).register_cluster(&ctx(), GUID).await.unwrap_err();
        assert!(matches!(err, SouthboundError::MissingProviderId(name) if name == "em1"));
    }

    #[tokio::test]
    async fn test_register_unsupported_provider() {
        let store = registered_store("TalosConfig");
        let err = handler(&store).register_cluster(&ctx(), GUID).await.unwrap_err();
        assert!(matches!(err, SouthboundError::UnsupportedProvider(_)));
    }

    #[tokio::test]
    async fn test_register_rejects_bad_payloads() {
        for entries in [
            vec![("format", "ignition"), ("value", CLOUD_CONFIG)],
            vec![("value", CLOUD_CONFIG)],
            vec![("format", "cloud-config")],
        ] {
            let store = registered_store(KUBEADM_CONFIG_KIND);
            store.insert_secret(secret(&entries));
            let err = handler(&store).register_cluster(&ctx(), GUID).await.unwrap_err();
            assert!(matches!(err, SouthboundError::InvalidBootstrapPayload(_)), "{entries:?}");
        }
    }

    #[tokio::test]
    async fn test_register_without_bootstrap_data() {
        let store = registered_store(KUBEADM_CONFIG_KIND);
        let mut owner = machine(KUBEADM_CONFIG_KIND);
        owner.spec.bootstrap.data_secret_name = None;
        store.insert_machine(owner);

        let err = handler(&store).register_cluster(&ctx(), GUID).await.unwrap_err();
        assert!(matches!(err, SouthboundError::MissingBootstrapData(_)));
    }

    #[tokio::test]
    async fn test_denied_before_any_record_access() {
        let store = registered_store(KUBEADM_CONFIG_KIND);
        store.inject_error(
            "list_edge_machines_by_node_guid",
            StoreError::InvalidRecord("should not be read".to_string()),
        );
        let viewer = RequestContext {
            tenant: NS.to_string(),
            roles: vec!["viewer".to_string()],
        };

        let err = handler(&store).register_cluster(&viewer, GUID).await.unwrap_err();
        assert!(matches!(err, SouthboundError::Unauthenticated(_)));
        let err = handler(&store)
            .update_cluster_status(&viewer, GUID, StatusCode::Active)
            .await
            .unwrap_err();
        assert!(matches!(err, SouthboundError::Unauthenticated(_)));

        // The injected failure is still pending
        let err = handler(&store).register_cluster(&ctx(), GUID).await.unwrap_err();
        assert!(matches!(err, SouthboundError::Store(_)));
    }

    #[tokio::test]
    async fn test_status_for_unbound_node_is_none() {
        let store = InMemoryRecordStore::new();
        assert_eq!(status(&store, StatusCode::Inactive).await, ActionRequest::None);
        assert_eq!(store.writes("update_edge_machine"), 0);
    }

    #[tokio::test]
    async fn test_status_code_table() {
        let cases = [
            (StatusCode::Inactive, Some(HostState::Inactive), ActionRequest::Register, false),
            (StatusCode::Registering, Some(HostState::InProgress), ActionRequest::None, true),
            (StatusCode::InstallInProgress, Some(HostState::InProgress), ActionRequest::None, true),
            (StatusCode::Active, Some(HostState::Active), ActionRequest::None, false),
            (StatusCode::Deregistering, Some(HostState::InProgress), ActionRequest::None, false),
            (StatusCode::UninstallInProgress, Some(HostState::InProgress), ActionRequest::None, false),
            (StatusCode::Error, None, ActionRequest::None, false),
        ];

        for (code, state, action, cleanup_finalizer) in cases {
            let store = registered_store(KUBEADM_CONFIG_KIND);
            assert_eq!(status(&store, code).await, action, "{code:?}");
            let machine = stored(&store);
            assert_eq!(machine.host_state(), state, "{code:?}");
            assert_eq!(
                metadata::has_finalizer(&machine.metadata, HOST_CLEANUP_FINALIZER),
                cleanup_finalizer,
                "{code:?}"
            );
        }
    }

    #[tokio::test]
    async fn test_inactive_without_reservation_is_none() {
        let store = registered_store(KUBEADM_CONFIG_KIND);
        store.insert_edge_machine(edge_machine("em1", None));

        assert_eq!(status(&store, StatusCode::Inactive).await, ActionRequest::None);
        assert_eq!(stored(&store).host_state(), Some(HostState::Inactive));
    }

    #[tokio::test]
    async fn test_deleting_machine_is_deregistered() {
        let store = registered_store(KUBEADM_CONFIG_KIND);
        let mut machine = stored(&store);
        metadata::add_finalizer(&mut machine.metadata, HOST_CLEANUP_FINALIZER);
        metadata::add_finalizer(&mut machine.metadata, metadata::DEAUTH_HOST_FINALIZER);
        store.insert_edge_machine(machine);
        store.mark_edge_machine_deleting(NS, "em1");

        for code in [
            StatusCode::Registering,
            StatusCode::InstallInProgress,
            StatusCode::Active,
            StatusCode::Deregistering,
            StatusCode::UninstallInProgress,
            StatusCode::Error,
        ] {
            assert_eq!(status(&store, code).await, ActionRequest::Deregister, "{code:?}");
        }
        assert!(metadata::has_finalizer(&stored(&store).metadata, HOST_CLEANUP_FINALIZER));

        assert_eq!(status(&store, StatusCode::Inactive).await, ActionRequest::Deregister);
        let machine = stored(&store);
        assert!(!metadata::has_finalizer(&machine.metadata, HOST_CLEANUP_FINALIZER));
        assert_eq!(machine.host_state(), Some(HostState::Inactive));
    }

    #[tokio::test]
    async fn test_install_report_while_deleting_adds_no_finalizer() {
        let store = registered_store(KUBEADM_CONFIG_KIND);
        let mut machine = stored(&store);
        metadata::add_finalizer(&mut machine.metadata, metadata::DEAUTH_HOST_FINALIZER);
        store.insert_edge_machine(machine);
        store.mark_edge_machine_deleting(NS, "em1");

        for code in [StatusCode::Registering, StatusCode::InstallInProgress] {
            assert_eq!(status(&store, code).await, ActionRequest::Deregister, "{code:?}");
        }
        let machine = stored(&store);
        assert!(!metadata::has_finalizer(&machine.metadata, HOST_CLEANUP_FINALIZER));
        assert_eq!(machine.host_state(), Some(HostState::InProgress));
        assert_eq!(store.writes("update_edge_machine"), 1);
    }

    #[tokio::test]
    async fn test_repeated_reports_do_not_write() {
        let store = registered_store(KUBEADM_CONFIG_KIND);

        status(&store, StatusCode::Registering).await;
        status(&store, StatusCode::Registering).await;
        status(&store, StatusCode::InstallInProgress).await;
        assert_eq!(store.writes("update_edge_machine"), 1);

        status(&store, StatusCode::Active).await;
        status(&store, StatusCode::Active).await;
        status(&store, StatusCode::Error).await;
        assert_eq!(store.writes("update_edge_machine"), 2);
        assert_eq!(stored(&store).host_state(), Some(HostState::Active));
    }
}
