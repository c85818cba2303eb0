//! External control-plane client: mints credentials and binds them to quotas.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::debug;

use super::{check_response, ClientError};
use crate::config::GatewayConfig;

const SERVICE: &str = "gateway";

/// A freshly minted external credential. The secret is handed to the caller
/// exactly once and never stored anywhere in this system.
#[derive(Debug, Clone)]
pub struct MintedResource {
    pub external_id: String,
    pub secret: String,
}

#[async_trait]
pub trait GatewayClient: Send + Sync {
    /// Mint a new credential in the control plane.
    async fn create_resource(
        &self,
        name: &str,
        description: Option<&str>,
    ) -> Result<MintedResource, ClientError>;

    /// Delete a credential. Deleting an id that no longer exists is success.
    async fn delete_resource(&self, external_id: &str) -> Result<(), ClientError>;

    /// Attach a credential to a usage-plan/quota.
    async fn bind_to_quota(&self, external_id: &str, quota_plan_id: &str) -> Result<(), ClientError>;

    /// Detach a credential from a usage-plan/quota. Tolerant of not-found.
    async fn unbind_from_quota(
        &self,
        external_id: &str,
        quota_plan_id: &str,
    ) -> Result<(), ClientError>;

    /// Enable or disable a credential in the control plane.
    async fn set_enabled(&self, external_id: &str, enabled: bool) -> Result<(), ClientError>;
}

/// Gateway client speaking the control plane's management REST API.
pub struct HttpGatewayClient {
    http: reqwest::Client,
    endpoint: String,
    timeout: Duration,
}

impl HttpGatewayClient {
    pub fn new(config: &GatewayConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.endpoint, path)
    }
}

#[derive(Debug, Deserialize)]
struct CreateKeyResponse {
    id: String,
    value: String,
}

#[async_trait]
impl GatewayClient for HttpGatewayClient {
    async fn create_resource(
        &self,
        name: &str,
        description: Option<&str>,
    ) -> Result<MintedResource, ClientError> {
        let response = self
            .http
            .post(self.url("/keys"))
            .timeout(self.timeout)
            .json(&json!({
                "name": name,
                "description": description,
                "enabled": true,
            }))
            .send()
            .await
            .map_err(|e| ClientError::from_reqwest(SERVICE, self.timeout, e))?;

        let body: CreateKeyResponse = check_response(SERVICE, response)
            .await?
            .json()
            .await
            .map_err(|e| ClientError::from_reqwest(SERVICE, self.timeout, e))?;

        debug!(external_id = %body.id, "gateway credential minted");
        Ok(MintedResource {
            external_id: body.id,
            secret: body.value,
        })
    }

    async fn delete_resource(&self, external_id: &str) -> Result<(), ClientError> {
        let response = self
            .http
            .delete(self.url(&format!("/keys/{}", external_id)))
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| ClientError::from_reqwest(SERVICE, self.timeout, e))?;

        match check_response(SERVICE, response).await {
            Ok(_) => Ok(()),
            // Already gone counts as deleted
            Err(e) if e.is_not_found() => Ok(()),
            Err(e) => Err(e),
        }
    }

    async fn bind_to_quota(&self, external_id: &str, quota_plan_id: &str) -> Result<(), ClientError> {
        let response = self
            .http
            .post(self.url(&format!("/usage-plans/{}/keys", quota_plan_id)))
            .timeout(self.timeout)
            .json(&json!({ "key_id": external_id }))
            .send()
            .await
            .map_err(|e| ClientError::from_reqwest(SERVICE, self.timeout, e))?;

        check_response(SERVICE, response).await.map(|_| ())
    }

    async fn unbind_from_quota(
        &self,
        external_id: &str,
        quota_plan_id: &str,
    ) -> Result<(), ClientError> {
        let response = self
            .http
            .delete(self.url(&format!("/usage-plans/{}/keys/{}", quota_plan_id, external_id)))
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| ClientError::from_reqwest(SERVICE, self.timeout, e))?;

        match check_response(SERVICE, response).await {
            Ok(_) => Ok(()),
            Err(e) if e.is_not_found() => Ok(()),
            Err(e) => Err(e),
        }
    }

    async fn set_enabled(&self, external_id: &str, enabled: bool) -> Result<(), ClientError> {
        let response = self
            .http
            .patch(self.url(&format!("/keys/{}", external_id)))
            .timeout(self.timeout)
            .json(&json!({ "enabled": enabled }))
            .send()
            .await
            .map_err(|e| ClientError::from_reqwest(SERVICE, self.timeout, e))?;

        check_response(SERVICE, response).await.map(|_| ())
    }
}
