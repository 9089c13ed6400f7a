//! EdgeCluster reconciliation
//!
//! Two steps run in order, stopping at the first that asks for a requeue:
//! endpoint readiness through the cluster's TunnelConnection, then one-time
//! workload creation in inventory.

use super::{Reconciled, Reconciler};
use crate::error::ControllerError;
use crds::conditions::{self, ConditionSeverity};
use crds::metadata::{self, CLUSTER_FINALIZER, CLUSTER_NAME_LABEL};
use crds::{
    CLUSTER_SUMMARY_CONDITIONS, CONTROL_PLANE_ENDPOINT_READY_CONDITION, EdgeCluster, INVALID_ENDPOINT_REASON,
    INVALID_WORKLOAD_REASON, TunnelConnection, TunnelConnectionSpec, WAITING_FOR_ENDPOINT_REASON,
    WORKLOAD_CREATE_FAILED_REASON, WORKLOAD_CREATED_READY_CONDITION, tunnel_connection_name,
};
use inventory_client::InventoryError;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference};
use record_store::RecordStore;
use tracing::{debug, info, warn};

/// Name of the managed cluster an EdgeCluster belongs to
pub fn cluster_name(edge_cluster: &EdgeCluster) -> &str {
    metadata::label(&edge_cluster.metadata, CLUSTER_NAME_LABEL)
        .or(edge_cluster.metadata.name.as_deref())
        .unwrap_or_default()
}

fn mark_false(cluster: &mut EdgeCluster, type_: &str, reason: &str, severity: ConditionSeverity, message: impl Into<String>) {
    conditions::mark_false(&mut cluster.status_mut().conditions, type_, reason, severity, message);
}

fn mark_true(cluster: &mut EdgeCluster, type_: &str) {
    conditions::mark_true(&mut cluster.status_mut().conditions, type_);
}

/// Recompute the summary and persist the cluster
async fn save(store: &dyn RecordStore, cluster: &mut EdgeCluster) -> Result<(), ControllerError> {
    conditions::set_summary(&mut cluster.status_mut().conditions, CLUSTER_SUMMARY_CONDITIONS);
    *cluster = store.update_edge_cluster(cluster).await?;
    Ok(())
}

fn tunnel_for(cluster: &EdgeCluster, namespace: &str, name: &str) -> TunnelConnection {
    let owner = OwnerReference {
        api_version: metadata::API_VERSION.to_string(),
        kind: "EdgeCluster".to_string(),
        name: cluster.metadata.name.clone().unwrap_or_default(),
        uid: cluster.metadata.uid.clone().unwrap_or_default(),
        controller: Some(true),
        block_owner_deletion: Some(true),
    };
    TunnelConnection {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            owner_references: Some(vec![owner]),
            ..Default::default()
        },
        spec: TunnelConnectionSpec {
            cluster_name: cluster_name(cluster).to_string(),
        },
        status: None,
    }
}

impl Reconciler {
    /// Reconcile one edge cluster
    pub async fn reconcile_edge_cluster(&self, edge_cluster: &EdgeCluster) -> Result<Reconciled, ControllerError> {
        let mut cluster = edge_cluster.clone();
        if cluster.is_deleting() {
            return self.reconcile_cluster_delete(&mut cluster).await;
        }

        if metadata::add_finalizer(&mut cluster.metadata, CLUSTER_FINALIZER) {
            save(self.store.as_ref(), &mut cluster).await?;
        }
        self.reconcile_cluster_normal(&mut cluster).await
    }

    pub async fn reconcile_cluster_normal(&self, cluster: &mut EdgeCluster) -> Result<Reconciled, ControllerError> {
        if self.reconcile_endpoint(cluster).await? == Reconciled::Requeue {
            return Ok(Reconciled::Requeue);
        }
        if self.reconcile_workload(cluster).await? == Reconciled::Requeue {
            return Ok(Reconciled::Requeue);
        }

        if !cluster.is_ready() {
            info!("EdgeCluster {} is ready", cluster.metadata.name.as_deref().unwrap_or_default());
        }
        cluster.status_mut().ready = true;
        save(self.store.as_ref(), cluster).await?;
        Ok(Reconciled::Done)
    }

    async fn reconcile_endpoint(&self, cluster: &mut EdgeCluster) -> Result<Reconciled, ControllerError> {
        if cluster.has_valid_endpoint() {
            mark_true(cluster, CONTROL_PLANE_ENDPOINT_READY_CONDITION);
            return Ok(Reconciled::Done);
        }

        let store = self.store.as_ref();
        let namespace = cluster.metadata.namespace.clone().unwrap_or_default();
        let tunnel_name = tunnel_connection_name(&namespace, cluster_name(cluster));

        let Some(tunnel) = store.get_tunnel(&namespace, &tunnel_name).await? else {
            info!("Creating TunnelConnection {}/{}", namespace, tunnel_name);
            store.create_tunnel(&tunnel_for(cluster, &namespace, &tunnel_name)).await?;
            mark_false(
                cluster,
                CONTROL_PLANE_ENDPOINT_READY_CONDITION,
                WAITING_FOR_ENDPOINT_REASON,
                ConditionSeverity::Info,
                "",
            );
            save(store, cluster).await?;
            return Ok(Reconciled::Requeue);
        };

        match (tunnel.is_ready(), tunnel.endpoint()) {
            (true, Some(endpoint)) if endpoint.is_valid() => {
                info!("EdgeCluster {}/{}: endpoint {}:{}", namespace, tunnel_name, endpoint.host, endpoint.port);
                cluster.spec.control_plane_endpoint = Some(endpoint.clone());
                mark_true(cluster, CONTROL_PLANE_ENDPOINT_READY_CONDITION);
                save(store, cluster).await?;
                Ok(Reconciled::Done)
            }
            (true, endpoint) => {
                warn!("TunnelConnection {}/{} is ready with an invalid endpoint", namespace, tunnel_name);
                mark_false(
                    cluster,
                    CONTROL_PLANE_ENDPOINT_READY_CONDITION,
                    INVALID_ENDPOINT_REASON,
                    ConditionSeverity::Error,
                    format!("invalid endpoint {:?}", endpoint),
                );
                save(store, cluster).await?;
                Ok(Reconciled::Requeue)
            }
            (false, _) => {
                debug!("TunnelConnection {}/{} not ready yet", namespace, tunnel_name);
                mark_false(
                    cluster,
                    CONTROL_PLANE_ENDPOINT_READY_CONDITION,
                    WAITING_FOR_ENDPOINT_REASON,
                    ConditionSeverity::Info,
                    "",
                );
                save(store, cluster).await?;
                Ok(Reconciled::Requeue)
            }
        }
    }

    async fn reconcile_workload(&self, cluster: &mut EdgeCluster) -> Result<Reconciled, ControllerError> {
        if cluster.workload_id().is_some() {
            mark_true(cluster, WORKLOAD_CREATED_READY_CONDITION);
            return Ok(Reconciled::Done);
        }

        let store = self.store.as_ref();
        let namespace = cluster.metadata.namespace.clone().unwrap_or_default();
        let name = cluster_name(cluster).to_string();

        let (reason, message) = match self.inventory.create_workload(&namespace, &name).await {
            Ok(id) if !id.is_empty() => {
                info!("Created workload {} for cluster {}/{}", id, namespace, name);
                cluster.spec.provider_id = Some(id);
                mark_true(cluster, WORKLOAD_CREATED_READY_CONDITION);
                save(store, cluster).await?;
                return Ok(Reconciled::Done);
            }
            Ok(_) => (INVALID_WORKLOAD_REASON, "inventory returned an empty workload id".to_string()),
            Err(e @ InventoryError::InvalidWorkload(_)) => (INVALID_WORKLOAD_REASON, e.to_string()),
            Err(e) => (WORKLOAD_CREATE_FAILED_REASON, e.to_string()),
        };

        warn!("Workload creation for cluster {}/{} failed: {}", namespace, name, message);
        mark_false(cluster, WORKLOAD_CREATED_READY_CONDITION, reason, ConditionSeverity::Warning, message);
        save(store, cluster).await?;
        Ok(Reconciled::Requeue)
    }

    pub async fn reconcile_cluster_delete(&self, cluster: &mut EdgeCluster) -> Result<Reconciled, ControllerError> {
        let store = self.store.as_ref();
        let namespace = cluster.metadata.namespace.clone().unwrap_or_default();

        if let Some(workload_id) = cluster.workload_id() {
            match self.inventory.delete_workload(&namespace, workload_id).await {
                Ok(()) => info!("Deleted workload {}", workload_id),
                Err(e) if e.is_not_found() => debug!("Workload {} already gone", workload_id),
                Err(e) => return Err(e.into()),
            }
        }

        let tunnel_name = tunnel_connection_name(&namespace, cluster_name(cluster));
        match store.delete_tunnel(&namespace, &tunnel_name).await {
            Ok(()) => info!("Deleted TunnelConnection {}/{}", namespace, tunnel_name),
            Err(e) if e.is_not_found() => debug!("TunnelConnection {}/{} already gone", namespace, tunnel_name),
            Err(e) => return Err(e.into()),
        }

        if metadata::remove_finalizer(&mut cluster.metadata, CLUSTER_FINALIZER) {
            *cluster = store.update_edge_cluster(cluster).await?;
        }
        Ok(Reconciled::Done)
    }
}
