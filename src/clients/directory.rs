//! Identity directory client: paginated listing by tenant attribute and
//! per-identity custom attribute updates.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

use super::{check_response, ClientError};
use crate::config::DirectoryConfig;

const SERVICE: &str = "directory";

/// One identity in the directory.
#[derive(Debug, Clone, Deserialize)]
pub struct Identity {
    pub id: String,
    pub tenant_id: String,
}

/// One page of a tenant-scoped listing. `next_token` is opaque; absence means
/// the enumeration is complete.
#[derive(Debug, Clone, Deserialize)]
pub struct IdentityPage {
    pub identities: Vec<Identity>,
    pub next_token: Option<String>,
}

#[async_trait]
pub trait DirectoryClient: Send + Sync {
    /// List identities whose tenant attribute matches `tenant_id`.
    async fn list_identities(
        &self,
        tenant_id: &str,
        page_token: Option<&str>,
    ) -> Result<IdentityPage, ClientError>;

    /// Set (`Some`) or clear (`None`) a custom attribute on one identity.
    /// Re-writing the same value is a no-op on the directory side.
    async fn update_attribute(
        &self,
        identity_id: &str,
        name: &str,
        value: Option<&str>,
    ) -> Result<(), ClientError>;
}

/// Directory client speaking the user-pool admin REST API.
pub struct HttpDirectoryClient {
    http: reqwest::Client,
    endpoint: String,
    user_pool_id: String,
    page_size: u32,
    timeout: Duration,
}

impl HttpDirectoryClient {
    pub fn new(config: &DirectoryConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            user_pool_id: config.user_pool_id.clone(),
            page_size: config.page_size,
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/pools/{}{}", self.endpoint, self.user_pool_id, path)
    }
}

#[async_trait]
impl DirectoryClient for HttpDirectoryClient {
    async fn list_identities(
        &self,
        tenant_id: &str,
        page_token: Option<&str>,
    ) -> Result<IdentityPage, ClientError> {
        let mut request = self
            .http
            .get(self.url("/identities"))
            .timeout(self.timeout)
            .query(&[("tenant_id", tenant_id)])
            .query(&[("limit", self.page_size)]);

        if let Some(token) = page_token {
            request = request.query(&[("page_token", token)]);
        }

        let response = request
            .send()
            .await
            .map_err(|e| ClientError::from_reqwest(SERVICE, self.timeout, e))?;

        check_response(SERVICE, response)
            .await?
            .json()
            .await
            .map_err(|e| ClientError::from_reqwest(SERVICE, self.timeout, e))
    }

    async fn update_attribute(
        &self,
        identity_id: &str,
        name: &str,
        value: Option<&str>,
    ) -> Result<(), ClientError> {
        let response = self
            .http
            .put(self.url(&format!("/identities/{}/attributes/{}", identity_id, name)))
            .timeout(self.timeout)
            .json(&json!({ "value": value }))
            .send()
            .await
            .map_err(|e| ClientError::from_reqwest(SERVICE, self.timeout, e))?;

        check_response(SERVICE, response).await.map(|_| ())
    }
}
