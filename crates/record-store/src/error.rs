//! Record store errors

use thiserror::Error;

/// Errors that can occur when reading or writing records
#[derive(Debug, Error)]
pub enum StoreError {
    /// Kubernetes API error
    #[error("Kubernetes error: {0}")]
    Kube(#[source] kube::Error),

    /// Write rejected because the record changed since it was read
    #[error("Conflict writing {0}")]
    Conflict(String),

    /// Record not found
    #[error("Record not found: {0}")]
    NotFound(String),

    /// Record could not be encoded
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Record is missing name or namespace
    #[error("Invalid record: {0}")]
    InvalidRecord(String),
}

impl StoreError {
    /// Classify a kube error for the record at `key`
    pub fn from_kube(key: &str, error: kube::Error) -> Self {
        match &error {
            kube::Error::Api(response) if response.code == 409 => Self::Conflict(key.to_string()),
            kube::Error::Api(response) if response.code == 404 => Self::NotFound(key.to_string()),
            _ => Self::Kube(error),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }
}

impl From<kube::Error> for StoreError {
    fn from(error: kube::Error) -> Self {
        Self::from_kube("<unknown>", error)
    }
}
