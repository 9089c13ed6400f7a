//! Inventory API client
//!
//! Implements the inventory REST API for compute and workload operations.
//! Resources live under `/v1/projects/{tenant}/compute/...`.

use crate::common::HttpClient;
use crate::error::InventoryError;
use crate::inventory_trait::InventoryClientTrait;
use crate::models::*;
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, warn};

/// Default per-call timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Connection settings for the inventory service
#[derive(Debug, Clone)]
pub struct InventoryConfig {
    pub base_url: String,
    pub token: String,
    pub timeout: Duration,
}

impl InventoryConfig {
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            token: token.into(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Inventory API client
pub struct InventoryClient {
    http: HttpClient,
}

impl InventoryClient {
    /// Create a new inventory client
    ///
    /// Fails with `InvalidInput` when the URL or token is empty or the
    /// timeout is zero.
    pub fn new(config: InventoryConfig) -> Result<Self, InventoryError> {
        require_input(&config.base_url, "inventory URL")?;
        require_input(&config.token, "inventory token")?;
        if config.timeout.is_zero() {
            return Err(InventoryError::InvalidInput("timeout must be greater than zero".to_string()));
        }

        let client = Client::builder().build().map_err(InventoryError::Http)?;

        Ok(Self {
            http: HttpClient::new(client, config.base_url, config.token, config.timeout),
        })
    }

    async fn find_host_by_uuid(&self, tenant: &str, host_uuid: &str) -> Result<Host, InventoryError> {
        let url = format!(
            "{}?uuid={}",
            self.http.project_url(tenant, "compute/hosts"),
            urlencoding::encode(host_uuid)
        );
        let response: ListHostsResponse = self.http.get(&url).await?;
        response
            .hosts
            .into_iter()
            .find(|h| h.uuid.eq_ignore_ascii_case(host_uuid))
            .ok_or_else(|| InventoryError::NotFound(format!("host with uuid {}", host_uuid)))
    }
}

#[async_trait::async_trait]
impl InventoryClientTrait for InventoryClient {
    fn base_url(&self) -> &str {
        self.http.base_url()
    }

    /// Validate the API token by listing a single host of the `default` tenant.
    ///
    /// Only authentication and transport failures are reported; a missing
    /// tenant still proves the token was accepted.
    async fn validate_token(&self) -> Result<(), InventoryError> {
        debug!("Validating inventory token and connectivity");
        let url = format!("{}?pageSize=1", self.http.project_url("default", "compute/hosts"));
        match self.http.get::<ListHostsResponse>(&url).await {
            Ok(_) | Err(InventoryError::NotFound(_)) => Ok(()),
            Err(e) => Err(e),
        }
    }

    async fn get_host(&self, tenant: &str, host_uuid: &str) -> Result<Host, InventoryError> {
        require_input(tenant, "tenant")?;
        require_input(host_uuid, "host uuid")?;

        let host = match self.find_host_by_uuid(tenant, host_uuid).await {
            Ok(host) => host,
            Err(e) => {
                debug!(host_uuid = %host_uuid, error = %e, "Host lookup by uuid failed, falling back to direct get");
                let url = self
                    .http
                    .project_url(tenant, &format!("compute/hosts/{}", urlencoding::encode(host_uuid)));
                self.http.get(&url).await?
            }
        };
        host.validate()?;
        Ok(host)
    }

    async fn get_instance(&self, tenant: &str, instance_id: &str) -> Result<Instance, InventoryError> {
        require_input(tenant, "tenant")?;
        require_input(instance_id, "instance id")?;

        let url = self
            .http
            .project_url(tenant, &format!("compute/instances/{}", urlencoding::encode(instance_id)));
        let instance: Instance = self.http.get(&url).await?;
        instance.validate()?;
        Ok(instance)
    }

    async fn deauthorize_host(&self, tenant: &str, host_uuid: &str) -> Result<(), InventoryError> {
        let host = self.get_host(tenant, host_uuid).await?;

        let url = format!(
            "{}?fieldMask=desired_state",
            self.http
                .project_url(tenant, &format!("compute/hosts/{}", urlencoding::encode(&host.resource_id)))
        );
        self.http.patch(&url, &HostStatePatch::untrusted()).await?;
        debug!(host_id = %host.resource_id, "Host marked untrusted");
        Ok(())
    }

    async fn create_workload(&self, tenant: &str, cluster_name: &str) -> Result<String, InventoryError> {
        require_input(tenant, "tenant")?;
        let request = CreateWorkloadRequest::for_cluster(cluster_name);
        request.validate()?;

        let url = self.http.project_url(tenant, "compute/workloads");
        let workload: Workload = self.http.post(&url, &request).await?;
        workload.validate()?;
        Ok(workload.resource_id)
    }

    async fn get_workload(&self, tenant: &str, workload_id: &str) -> Result<Workload, InventoryError> {
        require_input(tenant, "tenant")?;
        require_input(workload_id, "workload id")?;

        let url = self
            .http
            .project_url(tenant, &format!("compute/workloads/{}", urlencoding::encode(workload_id)));
        let workload: Workload = self.http.get(&url).await?;
        workload.validate()?;
        Ok(workload)
    }

    async fn delete_workload(&self, tenant: &str, workload_id: &str) -> Result<(), InventoryError> {
        require_input(tenant, "tenant")?;
        require_input(workload_id, "workload id")?;

        let url = self
            .http
            .project_url(tenant, &format!("compute/workloads/{}", urlencoding::encode(workload_id)));
        self.http.delete(&url).await
    }

    async fn add_instance_to_workload(
        &self,
        tenant: &str,
        workload_id: &str,
        instance_id: &str,
    ) -> Result<WorkloadMember, InventoryError> {
        require_input(tenant, "tenant")?;
        let request = CreateWorkloadMemberRequest {
            kind: WorkloadMemberKind::ClusterNode,
            workload_id: workload_id.to_string(),
            instance_id: instance_id.to_string(),
        };
        request.validate()?;

        let url = self.http.project_url(tenant, "compute/workload_members");
        let member: WorkloadMember = self.http.post(&url, &request).await?;
        member.validate()?;
        Ok(member)
    }

    async fn delete_instance_from_workload(
        &self,
        tenant: &str,
        workload_id: &str,
        instance_id: &str,
    ) -> Result<(), InventoryError> {
        require_input(workload_id, "workload id")?;
        let instance = self.get_instance(tenant, instance_id).await?;

        let Some(member) = find_cluster_membership(&instance, workload_id) else {
            warn!(instance_id = %instance_id, workload_id = %workload_id, "No cluster membership to remove");
            return Err(InventoryError::NotFound(format!(
                "instance {} is not a member of workload {}",
                instance_id, workload_id
            )));
        };

        let url = self.http.project_url(
            tenant,
            &format!("compute/workload_members/{}", urlencoding::encode(&member.resource_id)),
        );
        self.http.delete(&url).await
    }
}
