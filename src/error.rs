// HTTP API Error Types
use axum::{http::StatusCode, response::IntoResponse, Json};
use serde_json::{json, Value};

use crate::clients::ClientError;
use crate::services::lifecycle::LifecycleError;
use crate::services::provisioning::ProvisionError;
use crate::store::StoreError;

/// HTTP API error with appropriate status codes and client-friendly messages
#[derive(Debug)]
pub enum ApiError {
    // 400 Bad Request
    BadRequest(String),

    // 401 Unauthorized
    Unauthorized(String),

    // 403 Forbidden
    Forbidden(String),

    // 404 Not Found
    NotFound(String),

    // 409 Conflict
    Conflict(String),

    // 500 Internal Server Error
    InternalServerError(String),

    // 502 Bad Gateway (external service issues)
    BadGateway(String),

    // 503 Service Unavailable
    ServiceUnavailable(String),

    // 504 Gateway Timeout (ambiguous outcome - the external side effect may
    // have succeeded; callers must not blindly retry)
    GatewayTimeout(String),
}

impl ApiError {
    /// Get HTTP status code
    pub fn status_code(&self) -> u16 {
        match self {
            ApiError::BadRequest(_) => 400,
            ApiError::Unauthorized(_) => 401,
            ApiError::Forbidden(_) => 403,
            ApiError::NotFound(_) => 404,
            ApiError::Conflict(_) => 409,
            ApiError::InternalServerError(_) => 500,
            ApiError::BadGateway(_) => 502,
            ApiError::ServiceUnavailable(_) => 503,
            ApiError::GatewayTimeout(_) => 504,
        }
    }

    /// Get client-safe error message
    pub fn message(&self) -> &str {
        match self {
            ApiError::BadRequest(msg) => msg,
            ApiError::Unauthorized(msg) => msg,
            ApiError::Forbidden(msg) => msg,
            ApiError::NotFound(msg) => msg,
            ApiError::Conflict(msg) => msg,
            ApiError::InternalServerError(msg) => msg,
            ApiError::BadGateway(msg) => msg,
            ApiError::ServiceUnavailable(msg) => msg,
            ApiError::GatewayTimeout(msg) => msg,
        }
    }

    /// Get error code for client handling
    pub fn error_code(&self) -> &'static str {
        match self {
            ApiError::BadRequest(_) => "BAD_REQUEST",
            ApiError::Unauthorized(_) => "UNAUTHORIZED",
            ApiError::Forbidden(_) => "FORBIDDEN",
            ApiError::NotFound(_) => "NOT_FOUND",
            ApiError::Conflict(_) => "CONFLICT",
            ApiError::InternalServerError(_) => "INTERNAL_SERVER_ERROR",
            ApiError::BadGateway(_) => "BAD_GATEWAY",
            ApiError::ServiceUnavailable(_) => "SERVICE_UNAVAILABLE",
            ApiError::GatewayTimeout(_) => "GATEWAY_TIMEOUT",
        }
    }

    /// Convert to JSON response body
    pub fn to_json(&self) -> Value {
        json!({
            "error": true,
            "message": self.message(),
            "code": self.error_code()
        })
    }
}

// Static constructor methods
impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        ApiError::BadRequest(message.into())
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        ApiError::Unauthorized(message.into())
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        ApiError::Forbidden(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        ApiError::NotFound(message.into())
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        ApiError::Conflict(message.into())
    }

    pub fn internal_server_error(message: impl Into<String>) -> Self {
        ApiError::InternalServerError(message.into())
    }

    pub fn bad_gateway(message: impl Into<String>) -> Self {
        ApiError::BadGateway(message.into())
    }

    pub fn service_unavailable(message: impl Into<String>) -> Self {
        ApiError::ServiceUnavailable(message.into())
    }

    pub fn gateway_timeout(message: impl Into<String>) -> Self {
        ApiError::GatewayTimeout(message.into())
    }
}

// Convert service error types to ApiError
impl From<ProvisionError> for ApiError {
    fn from(err: ProvisionError) -> Self {
        match err {
            ProvisionError::DuplicateExternalResource(id) => {
                ApiError::conflict(format!("External resource '{}' is already registered", id))
            }
            ProvisionError::NotAuthorized => {
                ApiError::forbidden("Not authorized to access this resource")
            }
            ProvisionError::NotFound => ApiError::not_found("Resource not found"),
            ProvisionError::ExternalProvisionFailed(e) => {
                tracing::error!("External provisioning failed: {}", e);
                ApiError::bad_gateway("External provisioning service rejected the request")
            }
            ProvisionError::Timeout(e) => {
                tracing::error!("External call timed out: {}", e);
                ApiError::gateway_timeout(
                    "External call timed out; the resource may or may not have been created",
                )
            }
            ProvisionError::PersistFailed(e) => {
                // Don't expose internal store errors to clients
                tracing::error!("Record store write failed: {}", e);
                ApiError::internal_server_error("Failed to persist the resource record")
            }
            ProvisionError::Store(e) => {
                tracing::error!("Record store error: {}", e);
                ApiError::internal_server_error("An error occurred while processing your request")
            }
        }
    }
}

impl From<LifecycleError> for ApiError {
    fn from(err: LifecycleError) -> Self {
        match err {
            LifecycleError::NotAuthorized => ApiError::forbidden("Admin privileges required"),
            LifecycleError::BillingFailed(e) => {
                tracing::error!("Billing record update failed: {}", e);
                ApiError::bad_gateway("Billing provider rejected the request")
            }
            LifecycleError::DirectoryFailed(e) => {
                tracing::error!("Identity directory call failed: {}", e);
                ApiError::bad_gateway("Identity directory is unavailable")
            }
            LifecycleError::Timeout(e) => {
                tracing::error!("External call timed out: {}", e);
                ApiError::gateway_timeout(
                    "External call timed out; re-check the deletion status before retrying",
                )
            }
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound => ApiError::not_found("Record not found"),
            StoreError::Conflict(msg) => ApiError::conflict(msg),
            StoreError::DuplicateExternal(id) => {
                ApiError::conflict(format!("External resource '{}' is already registered", id))
            }
            StoreError::Query(msg) => {
                tracing::error!("Record store query error: {}", msg);
                ApiError::internal_server_error("An error occurred while processing your request")
            }
            StoreError::Sqlx(e) => {
                tracing::error!("SQLx error: {}", e);
                ApiError::service_unavailable("Record store temporarily unavailable")
            }
        }
    }
}

impl From<ClientError> for ApiError {
    fn from(err: ClientError) -> Self {
        match &err {
            ClientError::Timeout { .. } => {
                tracing::error!("External call timed out: {}", err);
                ApiError::gateway_timeout("External call timed out")
            }
            _ => {
                tracing::error!("External client error: {}", err);
                ApiError::bad_gateway("External service is unavailable")
            }
        }
    }
}

// Standard error trait implementations
impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message())
    }
}

impl std::error::Error for ApiError {}

// Automatic HTTP response conversion for Axum
impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(self.to_json())).into_response()
    }
}
