//! Inventory REST API Client
//!
//! A Rust client library for the edge inventory service. Provides typed,
//! validated access to the host, instance and workload resources the machine
//! provider reserves nodes against.
//!
//! # Example
//!
//! ```no_run
//! use inventory_client::{InventoryClient, InventoryClientTrait, InventoryConfig};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = InventoryClient::new(InventoryConfig::new(
//!     "http://inventory:8080",
//!     "your-api-token",
//! ))?;
//!
//! // Create a workload for a cluster and reserve a host's instance into it
//! let workload_id = client.create_workload("tenant-a", "cluster-1").await?;
//! let host = client.get_host("tenant-a", "4c4c4544-0044-3010-8030-b4c04f4e3333").await?;
//! if let Some(instance) = host.instance {
//!     client.add_instance_to_workload("tenant-a", &workload_id, &instance.resource_id).await?;
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Features
//!
//! - **Validation**: Requests are checked before sending, responses before returning
//! - **Bounded calls**: Every call runs under a per-call timeout
//! - **No hidden retries**: Callers own the retry policy
//! - **test-util**: In-memory `MockInventoryClient` with call counters and failure injection

pub mod client;
pub mod common;
pub mod error;
#[path = "trait.rs"]
pub mod inventory_trait;
pub mod models;
#[cfg(any(test, feature = "test-util"))]
pub mod mock;

pub use client::{InventoryClient, InventoryConfig};
pub use common::HttpClient;
pub use error::InventoryError;
pub use inventory_trait::InventoryClientTrait;
pub use models::*;
#[cfg(any(test, feature = "test-util"))]
pub use mock::MockInventoryClient;
