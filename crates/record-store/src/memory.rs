//! In-memory RecordStore for unit testing
//!
//! Mirrors the API server behaviour the lifecycles depend on:
//! - updates carrying a stale `resourceVersion` fail with `Conflict`
//! - a record marked for deletion disappears once its last finalizer is removed
//! - a record marked for deletion rejects new finalizers
//! - lists come back ordered by name
//! - bindings are selected by their pool labels
//!
//! Every write is counted per operation, and a one-shot error can be injected
//! for any operation.

use crate::error::StoreError;
use crate::store_trait::{RecordStore, record_key};
use crds::metadata::{self, NODE_GUID_LABEL};
use crds::{Cluster, EdgeCluster, EdgeMachine, EdgeMachineTemplate, Machine, MachineBinding, TunnelConnection};
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, Time};
use k8s_openapi::chrono::{DateTime, Utc};
use kube::Resource;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

type Table<K> = Arc<Mutex<BTreeMap<(String, String), K>>>;

/// In-memory record store for testing
#[derive(Clone, Default)]
pub struct InMemoryRecordStore {
    edge_machines: Table<EdgeMachine>,
    edge_clusters: Table<EdgeCluster>,
    machines: Table<Machine>,
    clusters: Table<Cluster>,
    bindings: Table<MachineBinding>,
    templates: Table<EdgeMachineTemplate>,
    tunnels: Table<TunnelConnection>,
    secrets: Table<Secret>,
    writes: Arc<Mutex<HashMap<String, usize>>>,
    failures: Arc<Mutex<HashMap<String, StoreError>>>,
}

fn table_key(meta: &ObjectMeta) -> Result<(String, String), StoreError> {
    match (meta.namespace.as_deref(), meta.name.as_deref()) {
        (Some(ns), Some(name)) => Ok((ns.to_string(), name.to_string())),
        _ => Err(StoreError::InvalidRecord(record_key(meta))),
    }
}

fn key(namespace: &str, name: &str) -> (String, String) {
    (namespace.to_string(), name.to_string())
}

fn next_version(meta: &ObjectMeta) -> String {
    let current = meta
        .resource_version
        .as_deref()
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(0);
    (current + 1).to_string()
}

fn insert<K: Resource + Clone>(table: &Table<K>, mut record: K) {
    let meta = record.meta_mut();
    if meta.resource_version.is_none() {
        meta.resource_version = Some("1".to_string());
    }
    if let Ok(k) = table_key(record.meta()) {
        table.lock().unwrap().insert(k, record);
    }
}

fn get<K: Clone>(table: &Table<K>, namespace: &str, name: &str) -> Option<K> {
    table.lock().unwrap().get(&key(namespace, name)).cloned()
}

/// Optimistic update: the caller must hold the current resourceVersion
fn update<K: Resource + Clone>(table: &Table<K>, record: &K) -> Result<K, StoreError> {
    let meta = record.meta();
    let k = table_key(meta)?;
    let mut records = table.lock().unwrap();
    let Some(current) = records.get(&k) else {
        return Err(StoreError::NotFound(record_key(meta)));
    };
    if meta.resource_version.is_some() && meta.resource_version != current.meta().resource_version {
        return Err(StoreError::Conflict(record_key(meta)));
    }

    if current.meta().deletion_timestamp.is_some() {
        let existing = current.meta().finalizers.as_deref().unwrap_or_default();
        let added = meta
            .finalizers
            .iter()
            .flatten()
            .any(|f| !existing.contains(f));
        if added {
            return Err(StoreError::InvalidRecord(format!(
                "{}: finalizers cannot be added while deleting",
                record_key(meta)
            )));
        }
    }

    let mut stored = record.clone();
    let version = next_version(current.meta());
    let deletion = current.meta().deletion_timestamp.clone();
    let stored_meta = stored.meta_mut();
    stored_meta.resource_version = Some(version);
    stored_meta.deletion_timestamp = deletion;

    let finalized = stored_meta.deletion_timestamp.is_some()
        && stored_meta.finalizers.as_ref().is_none_or(|f| f.is_empty());
    if finalized {
        records.remove(&k);
    } else {
        records.insert(k, stored.clone());
    }
    Ok(stored)
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_edge_machine(&self, record: EdgeMachine) {
        insert(&self.edge_machines, record);
    }

    pub fn insert_edge_cluster(&self, record: EdgeCluster) {
        insert(&self.edge_clusters, record);
    }

    pub fn insert_machine(&self, record: Machine) {
        insert(&self.machines, record);
    }

    pub fn insert_cluster(&self, record: Cluster) {
        insert(&self.clusters, record);
    }

    pub fn insert_binding(&self, record: MachineBinding) {
        insert(&self.bindings, record);
    }

    pub fn insert_template(&self, record: EdgeMachineTemplate) {
        insert(&self.templates, record);
    }

    pub fn insert_tunnel(&self, record: TunnelConnection) {
        insert(&self.tunnels, record);
    }

    pub fn insert_secret(&self, record: Secret) {
        insert(&self.secrets, record);
    }

    /// Current view of an edge machine
    pub fn edge_machine(&self, namespace: &str, name: &str) -> Option<EdgeMachine> {
        get(&self.edge_machines, namespace, name)
    }

    /// Current view of an edge cluster
    pub fn edge_cluster(&self, namespace: &str, name: &str) -> Option<EdgeCluster> {
        get(&self.edge_clusters, namespace, name)
    }

    /// Current view of a binding
    pub fn binding(&self, namespace: &str, name: &str) -> Option<MachineBinding> {
        get(&self.bindings, namespace, name)
    }

    /// Current view of a tunnel
    pub fn tunnel(&self, namespace: &str, name: &str) -> Option<TunnelConnection> {
        get(&self.tunnels, namespace, name)
    }

    /// Replace the status of a tunnel, as the tunnel controller would
    pub fn set_tunnel_status(&self, namespace: &str, name: &str, status: crds::TunnelConnectionStatus) {
        if let Some(tunnel) = self.tunnels.lock().unwrap().get_mut(&key(namespace, name)) {
            tunnel.status = Some(status);
        }
    }

    /// Mark a machine for deletion, as the API server does on delete
    pub fn mark_edge_machine_deleting(&self, namespace: &str, name: &str) {
        if let Some(machine) = self.edge_machines.lock().unwrap().get_mut(&key(namespace, name)) {
            machine.metadata.deletion_timestamp = Some(deletion_time());
        }
    }

    /// Mark a cluster for deletion, as the API server does on delete
    pub fn mark_edge_cluster_deleting(&self, namespace: &str, name: &str) {
        if let Some(cluster) = self.edge_clusters.lock().unwrap().get_mut(&key(namespace, name)) {
            cluster.metadata.deletion_timestamp = Some(deletion_time());
        }
    }

    /// Number of writes performed by an operation
    pub fn writes(&self, op: &str) -> usize {
        self.writes.lock().unwrap().get(op).copied().unwrap_or(0)
    }

    /// Fail the next call of `op` with `error`
    pub fn inject_error(&self, op: &str, error: StoreError) {
        self.failures.lock().unwrap().insert(op.to_string(), error);
    }

    fn fail(&self, op: &str) -> Result<(), StoreError> {
        match self.failures.lock().unwrap().remove(op) {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    fn record_write(&self, op: &str) -> Result<(), StoreError> {
        self.fail(op)?;
        *self.writes.lock().unwrap().entry(op.to_string()).or_insert(0) += 1;
        Ok(())
    }
}

fn deletion_time() -> Time {
    Time(DateTime::<Utc>::UNIX_EPOCH)
}

#[async_trait::async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn get_edge_machine(&self, namespace: &str, name: &str) -> Result<Option<EdgeMachine>, StoreError> {
        self.fail("get_edge_machine")?;
        Ok(get(&self.edge_machines, namespace, name))
    }

    async fn list_edge_machines_by_node_guid(
        &self,
        namespace: &str,
        node_guid: &str,
    ) -> Result<Vec<EdgeMachine>, StoreError> {
        self.fail("list_edge_machines_by_node_guid")?;
        Ok(self
            .edge_machines
            .lock()
            .unwrap()
            .iter()
            .filter(|((ns, _), m)| ns == namespace && metadata::label(&m.metadata, NODE_GUID_LABEL) == Some(node_guid))
            .map(|(_, m)| m.clone())
            .collect())
    }

    async fn update_edge_machine(&self, machine: &EdgeMachine) -> Result<EdgeMachine, StoreError> {
        self.record_write("update_edge_machine")?;
        update(&self.edge_machines, machine)
    }

    async fn get_edge_cluster(&self, namespace: &str, name: &str) -> Result<Option<EdgeCluster>, StoreError> {
        self.fail("get_edge_cluster")?;
        Ok(get(&self.edge_clusters, namespace, name))
    }

    async fn update_edge_cluster(&self, cluster: &EdgeCluster) -> Result<EdgeCluster, StoreError> {
        self.record_write("update_edge_cluster")?;
        update(&self.edge_clusters, cluster)
    }

    async fn get_machine(&self, namespace: &str, name: &str) -> Result<Option<Machine>, StoreError> {
        self.fail("get_machine")?;
        Ok(get(&self.machines, namespace, name))
    }

    async fn get_cluster(&self, namespace: &str, name: &str) -> Result<Option<Cluster>, StoreError> {
        self.fail("get_cluster")?;
        Ok(get(&self.clusters, namespace, name))
    }

    async fn list_bindings(
        &self,
        namespace: &str,
        cluster_name: &str,
        template_name: &str,
    ) -> Result<Vec<MachineBinding>, StoreError> {
        self.fail("list_bindings")?;
        let key = crds::pool_key(cluster_name, template_name);
        Ok(self
            .bindings
            .lock()
            .unwrap()
            .iter()
            .filter(|((ns, _), b)| {
                ns == namespace && b.labelled_for(cluster_name, template_name) && b.pool_key() == key
            })
            .map(|(_, b)| b.clone())
            .collect())
    }

    async fn update_binding(&self, binding: &MachineBinding) -> Result<MachineBinding, StoreError> {
        self.record_write("update_binding")?;
        update(&self.bindings, binding)
    }

    async fn get_machine_template(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<EdgeMachineTemplate>, StoreError> {
        self.fail("get_machine_template")?;
        Ok(get(&self.templates, namespace, name))
    }

    async fn get_tunnel(&self, namespace: &str, name: &str) -> Result<Option<TunnelConnection>, StoreError> {
        self.fail("get_tunnel")?;
        Ok(get(&self.tunnels, namespace, name))
    }

    async fn create_tunnel(&self, tunnel: &TunnelConnection) -> Result<TunnelConnection, StoreError> {
        self.record_write("create_tunnel")?;
        let k = table_key(&tunnel.metadata)?;
        let mut tunnels = self.tunnels.lock().unwrap();
        if tunnels.contains_key(&k) {
            return Err(StoreError::Conflict(record_key(&tunnel.metadata)));
        }
        let mut stored = tunnel.clone();
        stored.metadata.resource_version = Some("1".to_string());
        tunnels.insert(k, stored.clone());
        Ok(stored)
    }

    async fn delete_tunnel(&self, namespace: &str, name: &str) -> Result<(), StoreError> {
        self.record_write("delete_tunnel")?;
        self.tunnels
            .lock()
            .unwrap()
            .remove(&key(namespace, name))
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound(format!("{}/{}", namespace, name)))
    }

    async fn get_secret(&self, namespace: &str, name: &str) -> Result<Option<Secret>, StoreError> {
        self.fail("get_secret")?;
        Ok(get(&self.secrets, namespace, name))
    }
}
