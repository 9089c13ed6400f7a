//! Environment configuration

use crate::error::SouthboundError;
use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;

pub const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:8080";

/// Settings the service is started with
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SouthboundConfig {
    pub listen_addr: SocketAddr,
    pub policy_file: PathBuf,
}

impl SouthboundConfig {
    pub fn from_env() -> Result<Self, SouthboundError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, SouthboundError> {
        let raw_addr = lookup("SOUTHBOUND_LISTEN_ADDR")
            .filter(|a| !a.is_empty())
            .unwrap_or_else(|| DEFAULT_LISTEN_ADDR.to_string());
        let listen_addr = raw_addr.parse::<SocketAddr>().map_err(|e| {
            SouthboundError::InvalidConfig(format!("SOUTHBOUND_LISTEN_ADDR {:?}: {}", raw_addr, e))
        })?;

        let policy_file = lookup("SOUTHBOUND_POLICY_FILE")
            .filter(|p| !p.is_empty())
            .map(PathBuf::from)
            .ok_or_else(|| {
                SouthboundError::InvalidConfig("SOUTHBOUND_POLICY_FILE environment variable is required".to_string())
            })?;

        Ok(Self {
            listen_addr,
            policy_file,
        })
    }
}
