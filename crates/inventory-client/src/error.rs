//! Inventory client errors

use std::time::Duration;
use thiserror::Error;

/// Errors that can occur when talking to the inventory service
///
/// The variants fall into four classes callers act on:
/// - invalid input (`InvalidInput`): caller bug, never retried
/// - invalid response (`InvalidResource`, `InvalidWorkload`, `InvalidInstance`,
///   `InvalidHost`): the service answered with something unusable
/// - `NotFound`: absence, which some call sites treat as success
/// - transport (`Http`, `Timeout`, `Api`, `Authentication`): the call itself failed
#[derive(Debug, Error)]
pub enum InventoryError {
    /// HTTP request/response error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The call did not complete within the per-call timeout
    #[error("Inventory request timed out after {0:?}")]
    Timeout(Duration),

    /// Inventory API returned an unexpected status
    #[error("Inventory API error: {0}")]
    Api(String),

    /// Authentication failed (invalid token, expired, etc.)
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Caller supplied an empty or malformed key
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Response could not be decoded or failed validation
    #[error("Invalid resource: {0}")]
    InvalidResource(String),

    /// Workload payload failed validation
    #[error("Invalid workload: {0}")]
    InvalidWorkload(String),

    /// Instance payload failed validation
    #[error("Invalid instance: {0}")]
    InvalidInstance(String),

    /// Host payload failed validation
    #[error("Invalid host: {0}")]
    InvalidHost(String),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),
}

impl InventoryError {
    /// Absence of the requested resource
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// The remote call itself failed
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Self::Http(_) | Self::Timeout(_) | Self::Api(_) | Self::Authentication(_)
        )
    }

    /// The service answered but the payload was unusable
    pub fn is_invalid_response(&self) -> bool {
        matches!(
            self,
            Self::InvalidResource(_) | Self::InvalidWorkload(_) | Self::InvalidInstance(_) | Self::InvalidHost(_)
        )
    }
}
