//! Environment configuration

use crate::error::ControllerError;
use std::env;
use std::time::Duration;

pub const DEFAULT_INVENTORY_URL: &str = "http://inventory.orch-infra:8080";
pub const DEFAULT_INVENTORY_TIMEOUT_SECS: u64 = 5;

/// Settings the provider is started with
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderConfig {
    pub inventory_url: String,
    pub inventory_token: String,
    pub inventory_timeout: Duration,
    /// Watch a single namespace; all namespaces when unset
    pub namespace: Option<String>,
}

impl ProviderConfig {
    pub fn from_env() -> Result<Self, ControllerError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build the config from any key lookup
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ControllerError> {
        let inventory_url = lookup("INVENTORY_URL").unwrap_or_else(|| DEFAULT_INVENTORY_URL.to_string());
        let inventory_token = lookup("INVENTORY_TOKEN")
            .filter(|t| !t.is_empty())
            .ok_or_else(|| ControllerError::InvalidConfig("INVENTORY_TOKEN environment variable is required".to_string()))?;

        let timeout_secs = match lookup("INVENTORY_TIMEOUT_SECS") {
            Some(raw) => raw
                .parse::<u64>()
                .ok()
                .filter(|secs| *secs > 0)
                .ok_or_else(|| ControllerError::InvalidConfig(format!("INVENTORY_TIMEOUT_SECS must be a positive integer, got {:?}", raw)))?,
            None => DEFAULT_INVENTORY_TIMEOUT_SECS,
        };

        Ok(Self {
            inventory_url,
            inventory_token,
            inventory_timeout: Duration::from_secs(timeout_secs),
            namespace: lookup("WATCH_NAMESPACE").filter(|ns| !ns.is_empty()),
        })
    }
}
