//! Reconciliation logic for edge machines and clusters.
//!
//! - `binding`: allocation of MachineBindings from (cluster, template) pools
//! - `machine`: EdgeMachine provisioning and teardown
//! - `cluster`: EdgeCluster endpoint, workload creation and teardown
//!
//! Every step returns [`Reconciled`]: `Requeue` asks the caller to try again
//! later, timing is left to the controller loop.

pub mod binding;
pub mod cluster;
pub mod machine;

#[cfg(test)]
mod machine_test;

use crate::backoff::BackoffTracker;
use inventory_client::InventoryClientTrait;
use record_store::RecordStore;
use std::sync::Arc;
use std::time::Duration;

/// Requeue interval for records waiting on something outside this controller
pub const WAIT_REQUEUE: Duration = Duration::from_secs(30);

/// Outcome of one reconciliation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reconciled {
    /// Converged for now; further changes arrive as watch events
    Done,
    /// Waiting on something; invoke again later
    Requeue,
}

/// Reconciles edge machines and clusters against inventory.
pub struct Reconciler {
    pub(crate) inventory: Arc<dyn InventoryClientTrait>,
    pub(crate) store: Arc<dyn RecordStore>,
    pub(crate) backoff: BackoffTracker,
}

impl Reconciler {
    pub fn new(inventory: Arc<dyn InventoryClientTrait>, store: Arc<dyn RecordStore>) -> Self {
        Self {
            inventory,
            store,
            backoff: BackoffTracker::default(),
        }
    }
}
