//! Thin wrappers around the external systems of record.
//!
//! Each client is a trait seam so the orchestrators can be exercised against
//! in-memory fakes. The HTTP implementations carry an explicit per-call
//! timeout; a timeout is surfaced as [`ClientError::Timeout`] rather than a
//! definite failure because the external side effect may have landed.

pub mod billing;
pub mod directory;
pub mod gateway;

pub use billing::{BillingClient, BillingSubject, HttpBillingClient};
pub use directory::{DirectoryClient, HttpDirectoryClient, Identity, IdentityPage};
pub use gateway::{GatewayClient, HttpGatewayClient, MintedResource};

use std::time::Duration;
use thiserror::Error;

/// Errors from external-system clients.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The call did not complete within its deadline. Outcome is ambiguous:
    /// the external system may still have applied the change.
    #[error("{service} call timed out after {timeout:?}")]
    Timeout { service: &'static str, timeout: Duration },

    /// The external system answered with a non-success status.
    #[error("{service} returned {status}: {message}")]
    Api {
        service: &'static str,
        status: u16,
        message: String,
    },

    /// The referenced external entity does not exist.
    #[error("{service} entity not found")]
    NotFound { service: &'static str },

    /// Connection-level failure before any response arrived.
    #[error("{service} request failed: {message}")]
    Transport { service: &'static str, message: String },
}

impl ClientError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, ClientError::Timeout { .. })
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, ClientError::NotFound { .. })
    }

    pub(crate) fn from_reqwest(service: &'static str, timeout: Duration, err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ClientError::Timeout { service, timeout }
        } else {
            ClientError::Transport {
                service,
                message: err.to_string(),
            }
        }
    }
}

/// Map a non-success HTTP response into a typed client error.
pub(crate) async fn check_response(
    service: &'static str,
    response: reqwest::Response,
) -> Result<reqwest::Response, ClientError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    if status == reqwest::StatusCode::NOT_FOUND {
        return Err(ClientError::NotFound { service });
    }
    let message = response.text().await.unwrap_or_default();
    Err(ClientError::Api {
        service,
        status: status.as_u16(),
        message,
    })
}
