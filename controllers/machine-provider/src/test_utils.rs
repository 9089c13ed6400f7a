//! Test utilities for unit testing reconcilers
//!
//! Builders for the records a reconciliation reads, plus a fixture wiring a
//! reconciler to the in-memory store and the mock inventory client.

use crate::reconciler::Reconciler;
use crds::metadata::{CLONED_FROM_NAME_ANNOTATION, CLUSTER_NAME_LABEL, CONTROL_PLANE_LABEL};
use crds::*;
use inventory_client::MockInventoryClient;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference};
use record_store::InMemoryRecordStore;
use std::collections::BTreeMap;
use std::sync::Arc;

pub const NS: &str = "default";
pub const CLUSTER: &str = "edge-1";
pub const TEMPLATE: &str = "workers";

fn meta(name: &str) -> ObjectMeta {
    ObjectMeta {
        name: Some(name.to_string()),
        namespace: Some(NS.to_string()),
        uid: Some(format!("uid-{}", name)),
        ..Default::default()
    }
}

fn owner(kind: &str, name: &str) -> OwnerReference {
    OwnerReference {
        api_version: "cluster.x-k8s.io/v1beta1".to_string(),
        kind: kind.to_string(),
        name: name.to_string(),
        uid: format!("uid-{}", name),
        controller: Some(true),
        block_owner_deletion: None,
    }
}

/// EdgeMachine owned by Machine `owner_machine`, cloned from `TEMPLATE`
pub fn create_test_edge_machine(name: &str, owner_machine: Option<&str>) -> EdgeMachine {
    let mut metadata = meta(name);
    metadata.annotations = Some(BTreeMap::from([(
        CLONED_FROM_NAME_ANNOTATION.to_string(),
        TEMPLATE.to_string(),
    )]));
    metadata.labels = Some(BTreeMap::from([(CLUSTER_NAME_LABEL.to_string(), CLUSTER.to_string())]));
    metadata.owner_references = owner_machine.map(|m| vec![owner("Machine", m)]);
    EdgeMachine {
        metadata,
        spec: EdgeMachineSpec::default(),
        status: None,
    }
}

/// Machine of `CLUSTER` with optional bootstrap data
pub fn create_test_machine(name: &str, bootstrap_secret: Option<&str>, control_plane: bool) -> Machine {
    let mut metadata = meta(name);
    if control_plane {
        metadata.labels = Some(BTreeMap::from([(CONTROL_PLANE_LABEL.to_string(), String::new())]));
    }
    Machine {
        metadata,
        spec: MachineSpec {
            cluster_name: CLUSTER.to_string(),
            bootstrap: Bootstrap {
                config_ref: Some(ConfigReference {
                    api_version: "bootstrap.cluster.x-k8s.io/v1beta1".to_string(),
                    kind: KUBEADM_CONFIG_KIND.to_string(),
                    name: format!("{}-bootstrap", name),
                }),
                data_secret_name: bootstrap_secret.map(str::to_string),
            },
        },
        status: None,
    }
}

/// Cluster `CLUSTER` backed by the EdgeCluster of the same name
pub fn create_test_cluster(infrastructure_ready: bool, control_plane_ready: bool) -> Cluster {
    Cluster {
        metadata: meta(CLUSTER),
        spec: ClusterSpec {
            infrastructure_ref: Some(ConfigReference {
                api_version: metadata::API_VERSION.to_string(),
                kind: "EdgeCluster".to_string(),
                name: CLUSTER.to_string(),
            }),
            paused: false,
        },
        status: Some(ClusterStatus {
            infrastructure_ready,
            control_plane_ready,
            conditions: Vec::new(),
        }),
    }
}

/// EdgeCluster `CLUSTER`, with its workload id if already created
pub fn create_test_edge_cluster(workload_id: Option<&str>) -> EdgeCluster {
    EdgeCluster {
        metadata: meta(CLUSTER),
        spec: EdgeClusterSpec {
            control_plane_endpoint: None,
            provider_id: workload_id.map(str::to_string),
        },
        status: None,
    }
}

/// Unallocated binding in the `CLUSTER/TEMPLATE` pool
pub fn create_test_binding(name: &str, node_guid: &str) -> MachineBinding {
    let mut binding = MachineBinding {
        metadata: meta(name),
        spec: MachineBindingSpec {
            node_guid: node_guid.to_string(),
            cluster_name: CLUSTER.to_string(),
            template_name: TEMPLATE.to_string(),
        },
        status: None,
    };
    binding.set_pool_labels();
    binding
}

pub fn create_test_template(name: &str, cloned_from: Option<&str>) -> EdgeMachineTemplate {
    let mut metadata = meta(name);
    metadata.annotations = cloned_from.map(|origin| {
        BTreeMap::from([(CLONED_FROM_NAME_ANNOTATION.to_string(), origin.to_string())])
    });
    EdgeMachineTemplate {
        metadata,
        spec: EdgeMachineTemplateSpec::default(),
    }
}

/// Reconciler wired to an in-memory store and a mock inventory
pub struct Fixture {
    pub store: InMemoryRecordStore,
    pub inventory: MockInventoryClient,
    pub reconciler: Reconciler,
}

pub fn create_test_fixture() -> Fixture {
    let store = InMemoryRecordStore::new();
    let inventory = MockInventoryClient::new("http://inventory.test");
    let reconciler = Reconciler::new(Arc::new(inventory.clone()), Arc::new(store.clone()));
    Fixture {
        store,
        inventory,
        reconciler,
    }
}
