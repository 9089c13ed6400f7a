//! Southbound protocol handler
//!
//! Node agents call in to fetch their install commands and to report the
//! state of the cluster software on the node. Both calls resolve the
//! EdgeMachine through its node GUID label within the caller's tenant.

use crate::cloud_config::{BootstrapProvider, install_command};
use crate::error::SouthboundError;
use crate::policy::{Operation, PolicyEvaluator, RequestContext};
use crds::metadata::{self, HOST_CLEANUP_FINALIZER};
use crds::{EdgeMachine, HostState};
use k8s_openapi::api::core::v1::Secret;
use record_store::RecordStore;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Bootstrap secret keys
pub const FORMAT_KEY: &str = "format";
pub const VALUE_KEY: &str = "value";
pub const CLOUD_CONFIG_FORMAT: &str = "cloud-config";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RegisterResult {
    Success,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterResponse {
    #[serde(default)]
    pub install_cmd: String,
    #[serde(default)]
    pub uninstall_cmd: String,
    pub result: RegisterResult,
}

impl RegisterResponse {
    pub fn error() -> Self {
        Self {
            install_cmd: String::new(),
            uninstall_cmd: String::new(),
            result: RegisterResult::Error,
        }
    }
}

/// State of the cluster software as reported by the node agent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StatusCode {
    Inactive,
    Registering,
    InstallInProgress,
    Active,
    Deregistering,
    UninstallInProgress,
    Error,
}

/// What the node agent should do next
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionRequest {
    None,
    Register,
    Deregister,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateStatusResponse {
    pub action_request: ActionRequest,
}

/// Accept a GUID in hyphenated form, optionally wrapped in braces
pub fn normalize_node_guid(raw: &str) -> Result<String, SouthboundError> {
    let guid = raw
        .strip_prefix('{')
        .and_then(|s| s.strip_suffix('}'))
        .unwrap_or(raw);
    if guid.len() != 36 || uuid::Uuid::try_parse(guid).is_err() {
        return Err(SouthboundError::InvalidNodeGuid(raw.to_string()));
    }
    Ok(guid.to_string())
}

fn secret_value(secret: &Secret, key: &str) -> Option<String> {
    if let Some(value) = secret.data.as_ref().and_then(|d| d.get(key)) {
        return String::from_utf8(value.0.clone()).ok();
    }
    secret.string_data.as_ref().and_then(|d| d.get(key)).cloned()
}

pub struct SouthboundHandler {
    store: Arc<dyn RecordStore>,
    policy: Arc<dyn PolicyEvaluator>,
}

impl SouthboundHandler {
    pub fn new(store: Arc<dyn RecordStore>, policy: Arc<dyn PolicyEvaluator>) -> Self {
        Self { store, policy }
    }

    fn authorize(&self, ctx: &RequestContext, operation: Operation) -> Result<(), SouthboundError> {
        if self.policy.allow(ctx, operation) {
            Ok(())
        } else {
            warn!(tenant = %ctx.tenant, operation = %operation, "Request denied by policy");
            Err(SouthboundError::Unauthenticated(format!("{} not permitted", operation)))
        }
    }

    /// The machine bound to a node, if any
    async fn find_machine(&self, tenant: &str, node_guid: &str) -> Result<Option<EdgeMachine>, SouthboundError> {
        let mut machines = self.store.list_edge_machines_by_node_guid(tenant, node_guid).await?;
        match machines.len() {
            0 | 1 => Ok(machines.pop()),
            count => Err(SouthboundError::DuplicateRecords {
                node_guid: node_guid.to_string(),
                count,
            }),
        }
    }

    /// Install and uninstall commands for a node
    pub async fn register_cluster(
        &self,
        ctx: &RequestContext,
        node_guid: &str,
    ) -> Result<RegisterResponse, SouthboundError> {
        self.authorize(ctx, Operation::Register)?;
        let node_guid = normalize_node_guid(node_guid)?;
        let tenant = ctx.tenant.as_str();

        let machine = self
            .find_machine(tenant, &node_guid)
            .await?
            .ok_or_else(|| SouthboundError::NotFound(node_guid.clone()))?;
        let machine_name = machine.metadata.name.clone().unwrap_or_default();
        let provider_id = machine
            .provider_id()
            .ok_or_else(|| SouthboundError::MissingProviderId(machine_name.clone()))?;

        let owner = metadata::owner_of_kind(&machine.metadata, "Machine")
            .ok_or_else(|| SouthboundError::NotFound(format!("owner machine of {}", machine_name)))?;
        let owner_machine = self
            .store
            .get_machine(tenant, &owner.name)
            .await?
            .ok_or_else(|| SouthboundError::NotFound(format!("machine {}", owner.name)))?;

        let provider = BootstrapProvider::from_kind(owner_machine.bootstrap_kind().unwrap_or_default())?;
        let secret_name = owner_machine
            .bootstrap_data_secret()
            .ok_or_else(|| SouthboundError::MissingBootstrapData(owner.name.clone()))?;
        let secret = self
            .store
            .get_secret(tenant, secret_name)
            .await?
            .ok_or_else(|| SouthboundError::NotFound(format!("secret {}", secret_name)))?;

        let format = secret_value(&secret, FORMAT_KEY).unwrap_or_default();
        if format != CLOUD_CONFIG_FORMAT {
            return Err(SouthboundError::InvalidBootstrapPayload(format!(
                "secret {} has format {:?}, expected {}",
                secret_name, format, CLOUD_CONFIG_FORMAT
            )));
        }
        let document = secret_value(&secret, VALUE_KEY).ok_or_else(|| {
            SouthboundError::InvalidBootstrapPayload(format!("secret {} has no {} key", secret_name, VALUE_KEY))
        })?;

        let install_cmd = install_command(provider, provider_id, &document)?;
        info!(tenant = %tenant, node = %node_guid, machine = %machine_name, "Issued install commands");
        Ok(RegisterResponse {
            install_cmd,
            uninstall_cmd: provider.uninstall_command().to_string(),
            result: RegisterResult::Success,
        })
    }

    /// Record a node's reported state and tell it what to do next
    pub async fn update_cluster_status(
        &self,
        ctx: &RequestContext,
        node_guid: &str,
        code: StatusCode,
    ) -> Result<UpdateStatusResponse, SouthboundError> {
        self.authorize(ctx, Operation::UpdateStatus)?;
        let node_guid = normalize_node_guid(node_guid)?;

        let Some(mut machine) = self.find_machine(&ctx.tenant, &node_guid).await? else {
            debug!(node = %node_guid, "Node not bound to any machine");
            return Ok(UpdateStatusResponse {
                action_request: ActionRequest::None,
            });
        };

        let deleting = machine.is_deleting();
        let mut action = if deleting {
            ActionRequest::Deregister
        } else {
            ActionRequest::None
        };
        let previous = machine.host_state();
        let mut state = previous;
        let mut finalizers_changed = false;

        match code {
            StatusCode::Inactive => {
                state = Some(HostState::Inactive);
                if deleting {
                    finalizers_changed = metadata::remove_finalizer(&mut machine.metadata, HOST_CLEANUP_FINALIZER);
                } else if machine.provider_id().is_some() {
                    action = ActionRequest::Register;
                }
            }
            StatusCode::Registering | StatusCode::InstallInProgress => {
                state = Some(HostState::InProgress);
                // The API server refuses new finalizers once deletion has started
                if !deleting {
                    finalizers_changed = metadata::add_finalizer(&mut machine.metadata, HOST_CLEANUP_FINALIZER);
                }
            }
            StatusCode::Active => state = Some(HostState::Active),
            StatusCode::Deregistering | StatusCode::UninstallInProgress => state = Some(HostState::InProgress),
            StatusCode::Error => {}
        }

        if finalizers_changed || state != previous {
            machine.status_mut().host_state = state;
            self.store.update_edge_machine(&machine).await?;
            info!(
                node = %node_guid,
                machine = %machine.metadata.name.as_deref().unwrap_or_default(),
                state = ?state,
                "Recorded host state"
            );
        }

        Ok(UpdateStatusResponse { action_request: action })
    }
}
