//! Kubernetes-backed record store
//!
//! Writes are JSON merge patches carrying the `resourceVersion` the caller
//! read, so the API server rejects stale saves with 409. Status lives in the
//! status subresource and is patched after metadata and spec, guarded by the
//! `resourceVersion` that first patch returned.

use crate::error::StoreError;
use crate::store_trait::{RecordStore, record_key};
use crds::metadata::NODE_GUID_LABEL;
use crds::{
    Cluster, EdgeCluster, EdgeMachine, EdgeMachineTemplate, Machine, MachineBinding, TunnelConnection, pool_key,
    pool_selector,
};
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::api::{DeleteParams, ListParams, Patch, PatchParams, PostParams};
use kube::{Api, Client, Resource};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use std::fmt::Debug;
use tracing::debug;

/// Merge patch for metadata and spec
fn spec_patch<S: Serialize>(meta: &ObjectMeta, spec: &S) -> Result<Value, StoreError> {
    let mut metadata = json!({
        "labels": meta.labels.clone().unwrap_or_default(),
        "finalizers": meta.finalizers.clone().unwrap_or_default(),
        "ownerReferences": meta.owner_references.clone().unwrap_or_default(),
    });
    if let Some(rv) = &meta.resource_version {
        metadata["resourceVersion"] = json!(rv);
    }
    Ok(json!({ "metadata": metadata, "spec": serde_json::to_value(spec)? }))
}

/// Merge patch for the status subresource
fn status_patch<T: Serialize>(status: &T, resource_version: Option<&str>) -> Result<Value, StoreError> {
    let mut patch = json!({ "status": serde_json::to_value(status)? });
    if let Some(rv) = resource_version {
        patch["metadata"] = json!({ "resourceVersion": rv });
    }
    Ok(patch)
}

/// Record store backed by the Kubernetes API
#[derive(Clone)]
pub struct KubeRecordStore {
    client: Client,
}

impl KubeRecordStore {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn api<K>(&self, namespace: &str) -> Api<K>
    where
        K: Resource<Scope = k8s_openapi::NamespaceResourceScope>,
        K::DynamicType: Default,
    {
        Api::namespaced(self.client.clone(), namespace)
    }

    async fn get_opt<K>(&self, namespace: &str, name: &str) -> Result<Option<K>, StoreError>
    where
        K: Resource<Scope = k8s_openapi::NamespaceResourceScope> + Clone + DeserializeOwned + Debug,
        K::DynamicType: Default,
    {
        self.api::<K>(namespace)
            .get_opt(name)
            .await
            .map_err(|e| StoreError::from_kube(&format!("{}/{}", namespace, name), e))
    }

    /// Patch metadata + spec, then status, guarded by the caller's resourceVersion
    async fn save<K, S, T>(&self, record: &K, spec: &S, status: Option<&T>) -> Result<K, StoreError>
    where
        K: Resource<Scope = k8s_openapi::NamespaceResourceScope> + Clone + DeserializeOwned + Serialize + Debug,
        K::DynamicType: Default,
        S: Serialize,
        T: Serialize,
    {
        let meta = record.meta();
        let key = record_key(meta);
        let (Some(namespace), Some(name)) = (meta.namespace.as_deref(), meta.name.as_deref()) else {
            return Err(StoreError::InvalidRecord(key));
        };
        let api = self.api::<K>(namespace);
        let pp = PatchParams::default();

        let patch = spec_patch(meta, spec)?;
        debug!("Saving {} {}", K::kind(&Default::default()), key);
        let updated = api
            .patch(name, &pp, &Patch::Merge(&patch))
            .await
            .map_err(|e| StoreError::from_kube(&key, e))?;

        let Some(status) = status else {
            return Ok(updated);
        };
        // A write landing between the two patches makes this one conflict
        let patch = status_patch(status, updated.meta().resource_version.as_deref())?;
        match api.patch_status(name, &pp, &Patch::Merge(&patch)).await {
            Ok(updated) => Ok(updated),
            // Last finalizer removed: the record is gone
            Err(e) => match StoreError::from_kube(&key, e) {
                StoreError::NotFound(_) => Ok(updated),
                other => Err(other),
            },
        }
    }
}

#[async_trait::async_trait]
impl RecordStore for KubeRecordStore {
    async fn get_edge_machine(&self, namespace: &str, name: &str) -> Result<Option<EdgeMachine>, StoreError> {
        self.get_opt(namespace, name).await
    }

    async fn list_edge_machines_by_node_guid(
        &self,
        namespace: &str,
        node_guid: &str,
    ) -> Result<Vec<EdgeMachine>, StoreError> {
        let lp = ListParams::default().labels(&format!("{}={}", NODE_GUID_LABEL, node_guid));
        let list = self
            .api::<EdgeMachine>(namespace)
            .list(&lp)
            .await
            .map_err(|e| StoreError::from_kube(namespace, e))?;
        Ok(list.items)
    }

    async fn update_edge_machine(&self, machine: &EdgeMachine) -> Result<EdgeMachine, StoreError> {
        self.save(machine, &machine.spec, machine.status.as_ref()).await
    }

    async fn get_edge_cluster(&self, namespace: &str, name: &str) -> Result<Option<EdgeCluster>, StoreError> {
        self.get_opt(namespace, name).await
    }

    async fn update_edge_cluster(&self, cluster: &EdgeCluster) -> Result<EdgeCluster, StoreError> {
        self.save(cluster, &cluster.spec, cluster.status.as_ref()).await
    }

    async fn get_machine(&self, namespace: &str, name: &str) -> Result<Option<Machine>, StoreError> {
        self.get_opt(namespace, name).await
    }

    async fn get_cluster(&self, namespace: &str, name: &str) -> Result<Option<Cluster>, StoreError> {
        self.get_opt(namespace, name).await
    }

    async fn list_bindings(
        &self,
        namespace: &str,
        cluster_name: &str,
        template_name: &str,
    ) -> Result<Vec<MachineBinding>, StoreError> {
        let lp = ListParams::default().labels(&pool_selector(cluster_name, template_name));
        let list = self
            .api::<MachineBinding>(namespace)
            .list(&lp)
            .await
            .map_err(|e| StoreError::from_kube(namespace, e))?;
        // Spec is authoritative over labels
        let key = pool_key(cluster_name, template_name);
        Ok(list.items.into_iter().filter(|b| b.pool_key() == key).collect())
    }

    async fn update_binding(&self, binding: &MachineBinding) -> Result<MachineBinding, StoreError> {
        // Owner first: a binding owned but not yet allocated is found again by re-affinity
        self.save(binding, &binding.spec, binding.status.as_ref()).await
    }

    async fn get_machine_template(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<EdgeMachineTemplate>, StoreError> {
        self.get_opt(namespace, name).await
    }

    async fn get_tunnel(&self, namespace: &str, name: &str) -> Result<Option<TunnelConnection>, StoreError> {
        self.get_opt(namespace, name).await
    }

    async fn create_tunnel(&self, tunnel: &TunnelConnection) -> Result<TunnelConnection, StoreError> {
        let key = record_key(&tunnel.metadata);
        let Some(namespace) = tunnel.metadata.namespace.as_deref() else {
            return Err(StoreError::InvalidRecord(key));
        };
        self.api::<TunnelConnection>(namespace)
            .create(&PostParams::default(), tunnel)
            .await
            .map_err(|e| StoreError::from_kube(&key, e))
    }

    async fn delete_tunnel(&self, namespace: &str, name: &str) -> Result<(), StoreError> {
        self.api::<TunnelConnection>(namespace)
            .delete(name, &DeleteParams::default())
            .await
            .map_err(|e| StoreError::from_kube(&format!("{}/{}", namespace, name), e))?;
        Ok(())
    }

    async fn get_secret(&self, namespace: &str, name: &str) -> Result<Option<Secret>, StoreError> {
        self.get_opt(namespace, name).await
    }
}
