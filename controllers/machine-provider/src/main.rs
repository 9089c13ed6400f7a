//! Edge Machine Provider
//!
//! Cluster lifecycle infrastructure provider for edge hosts:
//! - EdgeMachine: allocates a node from the MachineBinding pool, reserves its
//!   inventory instance into the cluster workload and releases it on deletion
//! - EdgeCluster: waits for a tunnel endpoint and creates the cluster workload
//!
//! Host state reported by node agents arrives through the southbound service.

mod backoff;
mod config;
mod controller;
mod error;
mod reconciler;
mod watcher;

#[cfg(test)]
mod test_utils;

use crate::config::ProviderConfig;
use crate::error::ControllerError;
use controller::Controller;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), ControllerError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("Starting edge machine provider");

    let config = ProviderConfig::from_env()?;

    info!("Configuration:");
    info!("  Inventory URL: {}", config.inventory_url);
    info!("  Inventory timeout: {:?}", config.inventory_timeout);
    info!("  Namespace: {}", config.namespace.as_deref().unwrap_or("all namespaces"));

    let controller = Controller::new(config).await?;
    controller.run().await?;

    Ok(())
}
