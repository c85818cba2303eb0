//! Billing provider client: reads and writes metadata on a single
//! billing-subject record keyed by tenant id.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::collections::HashMap;
use std::time::Duration;

use super::{check_response, ClientError};
use crate::config::BillingConfig;

const SERVICE: &str = "billing";

/// The billing-subject record for a tenant.
#[derive(Debug, Clone)]
pub enum BillingSubject {
    /// The provider has permanently erased the subject. Terminal state.
    Deleted,
    /// Live subject with free-form metadata.
    Live { metadata: HashMap<String, String> },
}

#[async_trait]
pub trait BillingClient: Send + Sync {
    /// Fetch the subject record, including its metadata map.
    async fn get_metadata(&self, tenant_id: &str) -> Result<BillingSubject, ClientError>;

    /// Write (`Some`) or clear (`None`) one metadata field on the subject.
    /// Single atomic write on one record.
    async fn set_metadata_field(
        &self,
        tenant_id: &str,
        field: &str,
        value: Option<&str>,
    ) -> Result<(), ClientError>;
}

/// Billing client speaking the provider's customer REST API.
pub struct HttpBillingClient {
    http: reqwest::Client,
    endpoint: String,
    timeout: Duration,
}

impl HttpBillingClient {
    pub fn new(config: &BillingConfig) -> Self {
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
struct CustomerResponse {
    #[serde(default)]
    deleted: bool,
    #[serde(default)]
    metadata: HashMap<String, String>,
}

#[async_trait]
impl BillingClient for HttpBillingClient {
    async fn get_metadata(&self, tenant_id: &str) -> Result<BillingSubject, ClientError> {
        let response = self
            .http
            .get(self.url(&format!("/customers/{}", tenant_id)))
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| ClientError::from_reqwest(SERVICE, self.timeout, e))?;

        let body: CustomerResponse = check_response(SERVICE, response)
            .await?
            .json()
            .await
            .map_err(|e| ClientError::from_reqwest(SERVICE, self.timeout, e))?;

        if body.deleted {
            Ok(BillingSubject::Deleted)
        } else {
            Ok(BillingSubject::Live { metadata: body.metadata })
        }
    }

    async fn set_metadata_field(
        &self,
        tenant_id: &str,
        field: &str,
        value: Option<&str>,
    ) -> Result<(), ClientError> {
        let response = self
            .http
            .post(self.url(&format!("/customers/{}/metadata", tenant_id)))
            .timeout(self.timeout)
            .json(&json!({ field: value }))
            .send()
            .await
            .map_err(|e| ClientError::from_reqwest(SERVICE, self.timeout, e))?;

        check_response(SERVICE, response).await.map(|_| ())
    }
}
