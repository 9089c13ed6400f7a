//! Main controller implementation.
//!
//! Builds the inventory client and record store, then runs the EdgeMachine
//! and EdgeCluster watchers until one of them exits.

use crate::config::ProviderConfig;
use crate::error::ControllerError;
use crate::reconciler::Reconciler;
use crate::watcher::Watcher;
use crds::{EdgeCluster, EdgeMachine};
use inventory_client::{InventoryClient, InventoryClientTrait, InventoryConfig};
use kube::{Api, Client};
use record_store::KubeRecordStore;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{error, info};

/// Main controller for the edge machine provider.
pub struct Controller {
    edge_machine_watcher: JoinHandle<Result<(), ControllerError>>,
    edge_cluster_watcher: JoinHandle<Result<(), ControllerError>>,
}

impl Controller {
    /// Creates a new controller instance.
    pub async fn new(config: ProviderConfig) -> Result<Self, ControllerError> {
        info!("Initializing edge machine provider");

        let kube_client = Client::try_default().await?;

        let inventory_config = InventoryConfig::new(config.inventory_url.clone(), config.inventory_token.clone())
            .with_timeout(config.inventory_timeout);
        let inventory = InventoryClient::new(inventory_config)?;

        info!("Validating inventory token and connectivity...");
        inventory.validate_token().await.map_err(|e| {
            error!("Failed to validate inventory token: {}", e);
            error!("Please ensure INVENTORY_TOKEN is valid and {} is reachable", config.inventory_url);
            ControllerError::Inventory(e)
        })?;
        info!("Inventory token validated");

        let store = KubeRecordStore::new(kube_client.clone());
        let reconciler = Arc::new(Reconciler::new(Arc::new(inventory), Arc::new(store)));

        let (edge_machine_api, edge_cluster_api): (Api<EdgeMachine>, Api<EdgeCluster>) = match &config.namespace {
            Some(ns) => (Api::namespaced(kube_client.clone(), ns), Api::namespaced(kube_client, ns)),
            None => (Api::all(kube_client.clone()), Api::all(kube_client)),
        };
        let watcher_instance = Arc::new(Watcher::new(reconciler, edge_machine_api, edge_cluster_api));

        let edge_machine_watcher = {
            let watcher = watcher_instance.clone();
            tokio::spawn(async move { watcher.watch_edge_machines().await })
        };
        let edge_cluster_watcher = {
            let watcher = watcher_instance.clone();
            tokio::spawn(async move { watcher.watch_edge_clusters().await })
        };

        Ok(Self {
            edge_machine_watcher,
            edge_cluster_watcher,
        })
    }

    /// Runs until a watcher exits.
    pub async fn run(mut self) -> Result<(), ControllerError> {
        info!("Edge machine provider running");

        tokio::select! {
            result = &mut self.edge_machine_watcher => {
                result.map_err(|e| ControllerError::Watch(format!("EdgeMachine watcher panicked: {}", e)))?
                    .map_err(|e| ControllerError::Watch(format!("EdgeMachine watcher error: {}", e)))?;
            }
            result = &mut self.edge_cluster_watcher => {
                result.map_err(|e| ControllerError::Watch(format!("EdgeCluster watcher panicked: {}", e)))?
                    .map_err(|e| ControllerError::Watch(format!("EdgeCluster watcher error: {}", e)))?;
            }
        }

        Ok(())
    }
}
