//! Controller-specific error types.
//!
//! This module defines error types for the machine provider that are not
//! covered by upstream library errors.

use inventory_client::InventoryError;
use kube::Error as KubeError;
use record_store::StoreError;
use thiserror::Error;

/// Errors that can occur in the machine provider.
#[derive(Debug, Error)]
pub enum ControllerError {
    /// Kubernetes API error
    #[error("Kubernetes error: {0}")]
    Kube(#[from] KubeError),

    /// Inventory API error
    #[error("Inventory error: {0}")]
    Inventory(#[from] InventoryError),

    /// Record store error
    #[error("Record store error: {0}")]
    Store(#[from] StoreError),

    /// Required records for a machine could not be assembled
    #[error("Invalid machine scope: {0}")]
    Scope(#[from] ScopeError),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Resource watch failed
    #[error("Resource watch failed: {0}")]
    Watch(String),
}

/// A required field of a machine scope was missing
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ScopeError {
    #[error("edge machine is required")]
    MissingEdgeMachine,

    #[error("edge machine {0} has no namespace")]
    MissingNamespace(String),

    #[error("owner machine is required")]
    MissingMachine,

    #[error("owner cluster is required")]
    MissingCluster,

    #[error("edge cluster is required")]
    MissingEdgeCluster,
}

/// Binding allocation failures
#[derive(Debug, Error)]
pub enum AllocationError {
    /// Every entry of the pool is allocated to someone else
    #[error("no available machine binding in pool {0}")]
    NoAvailableBinding(String),

    /// The machine does not name a template to draw from
    #[error("machine {0} does not reference a template")]
    MissingTemplate(String),

    /// Reading the pool or persisting the allocation failed
    #[error("binding store error: {0}")]
    Store(#[from] StoreError),
}
