//! Record store for the edge provider
//!
//! The lifecycles and the southbound handler read and write Kubernetes
//! resources only through [`RecordStore`]. [`KubeRecordStore`] talks to the
//! API server; `InMemoryRecordStore` (feature `test-util`) keeps records in
//! memory and counts writes so tests can assert on persistence.

pub mod error;
pub mod kube_store;
#[path = "trait.rs"]
pub mod store_trait;
#[cfg(any(test, feature = "test-util"))]
pub mod memory;

pub use error::StoreError;
pub use kube_store::KubeRecordStore;
pub use store_trait::RecordStore;
#[cfg(any(test, feature = "test-util"))]
pub use memory::InMemoryRecordStore;
