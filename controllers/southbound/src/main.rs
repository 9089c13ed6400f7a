//! Southbound Service
//!
//! HTTP endpoint for edge node agents:
//! - register: returns the install and uninstall commands for the node's
//!   bootstrap provider, rendered from the machine's bootstrap data
//! - status: records the host state the agent reports and answers with the
//!   next action the agent should take

mod cloud_config;
mod config;
mod error;
mod handler;
mod policy;
mod server;

#[cfg(test)]
mod handler_test;

use crate::config::SouthboundConfig;
use crate::handler::SouthboundHandler;
use crate::policy::RolePolicy;
use anyhow::{Context, Result};
use record_store::KubeRecordStore;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("Starting southbound service");

    let config = SouthboundConfig::from_env()?;

    info!("Configuration:");
    info!("  Listen address: {}", config.listen_addr);
    info!("  Policy file: {}", config.policy_file.display());

    let policy = RolePolicy::from_file(&config.policy_file)?;
    let client = kube::Client::try_default()
        .await
        .context("Failed to create Kubernetes client")?;
    let store = KubeRecordStore::new(client);
    let handler = SouthboundHandler::new(Arc::new(store), Arc::new(policy));

    let listener = tokio::net::TcpListener::bind(config.listen_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.listen_addr))?;
    info!("Listening on {}", config.listen_addr);

    axum::serve(listener, server::create_router(Arc::new(handler)))
        .await
        .context("Southbound server failed")?;

    Ok(())
}
