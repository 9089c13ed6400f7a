//! Southbound error types.

use record_store::StoreError;
use thiserror::Error;

/// Errors returned to node agents or raised at startup.
#[derive(Debug, Error)]
pub enum SouthboundError {
    /// No machine is bound to the node
    #[error("no machine found for node {0}")]
    NotFound(String),

    /// More than one machine carries the node's label
    #[error("{count} machines found for node {node_guid}")]
    DuplicateRecords { node_guid: String, count: usize },

    /// The machine has not been reserved yet
    #[error("machine {0} has no provider id")]
    MissingProviderId(String),

    /// The owner machine has no bootstrap data yet
    #[error("machine {0} has no bootstrap data")]
    MissingBootstrapData(String),

    /// The bootstrap secret is not usable cloud-config
    #[error("invalid bootstrap payload: {0}")]
    InvalidBootstrapPayload(String),

    /// Bootstrap provider kind without install support
    #[error("unsupported bootstrap provider: {0}")]
    UnsupportedProvider(String),

    /// A bootstrap command has no single-line shell rendering
    #[error("cannot render command: {0}")]
    CommandParse(String),

    /// The policy gate denied the request
    #[error("unauthenticated: {0}")]
    Unauthenticated(String),

    /// Node GUID is not a hyphenated UUID
    #[error("invalid node GUID: {0}")]
    InvalidNodeGuid(String),

    /// Policy file could not be loaded
    #[error("invalid policy: {0}")]
    InvalidPolicy(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Record store error
    #[error("Record store error: {0}")]
    Store(#[from] StoreError),
}
