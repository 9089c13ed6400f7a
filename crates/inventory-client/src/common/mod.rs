//! Common utilities for the inventory API client
//!
//! Provides the authenticated, time-bounded HTTP wrapper every operation
//! goes through.

use crate::error::InventoryError;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;
use tracing::debug;

/// HTTP client wrapper with authentication and a per-call timeout
pub struct HttpClient {
    client: Client,
    base_url: String,
    token: String,
    timeout: Duration,
}

impl HttpClient {
    /// Create a new HTTP client wrapper
    pub fn new(client: Client, base_url: String, token: String, timeout: Duration) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
            timeout,
        }
    }

    /// Get the base URL
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Per-call timeout
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Build the URL of a tenant-scoped resource path
    pub fn project_url(&self, tenant: &str, path: &str) -> String {
        format!(
            "{}/v1/projects/{}/{}",
            self.base_url,
            urlencoding::encode(tenant),
            path.trim_start_matches('/')
        )
    }

    /// Get authorization header value
    pub fn auth_header(&self) -> String {
        format!("Bearer {}", self.token)
    }

    /// Get the underlying HTTP client
    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Send a request under the per-call timeout and map the status
    async fn send(&self, method: &str, url: &str, request: RequestBuilder) -> Result<Response, InventoryError> {
        let request = request
            .header("Authorization", self.auth_header())
            .header("Accept", "application/json");

        let response = tokio::time::timeout(self.timeout, request.send())
            .await
            .map_err(|_| InventoryError::Timeout(self.timeout))?
            .map_err(InventoryError::Http)?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        match status {
            StatusCode::NOT_FOUND => Err(InventoryError::NotFound(format!("{} {} - {}", method, url, body))),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(InventoryError::Authentication(format!(
                "{} {} failed: {} - {}",
                method, url, status, body
            ))),
            _ => Err(InventoryError::Api(format!("{} {} failed: {} - {}", method, url, status, body))),
        }
    }

    async fn decode<T: DeserializeOwned>(&self, response: Response) -> Result<T, InventoryError> {
        let text = tokio::time::timeout(self.timeout, response.text())
            .await
            .map_err(|_| InventoryError::Timeout(self.timeout))??;
        serde_json::from_str(&text).map_err(|e| {
            InventoryError::InvalidResource(format!(
                "error decoding response body: {} - Response (first 500 chars): {}",
                e,
                text.chars().take(500).collect::<String>()
            ))
        })
    }

    /// Make a GET request
    pub async fn get<T: DeserializeOwned>(&self, url: &str) -> Result<T, InventoryError> {
        debug!("GET {}", url);
        let response = self.send("GET", url, self.client.get(url)).await?;
        self.decode(response).await
    }

    /// Make a POST request
    pub async fn post<B: Serialize + ?Sized, T: DeserializeOwned>(&self, url: &str, body: &B) -> Result<T, InventoryError> {
        debug!("POST {}", url);
        let response = self.send("POST", url, self.client.post(url).json(body)).await?;
        self.decode(response).await
    }

    /// Make a PATCH request, discarding the response body
    pub async fn patch<B: Serialize + ?Sized>(&self, url: &str, body: &B) -> Result<(), InventoryError> {
        debug!("PATCH {}", url);
        self.send("PATCH", url, self.client.patch(url).json(body)).await?;
        Ok(())
    }

    /// Make a DELETE request
    pub async fn delete(&self, url: &str) -> Result<(), InventoryError> {
        debug!("DELETE {}", url);
        self.send("DELETE", url, self.client.delete(url)).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_project_url() {
        let http = HttpClient::new(
            Client::new(),
            "http://inventory:8080/".to_string(),
            "token".to_string(),
            Duration::from_secs(5),
        );
        assert_eq!(
            http.project_url("tenant-a", "/compute/hosts"),
            "http://inventory:8080/v1/projects/tenant-a/compute/hosts"
        );
        assert_eq!(http.auth_header(), "Bearer token");
    }
}
