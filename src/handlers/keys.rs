use axum::{
    extract::{Extension, Path, Query, State},
    response::Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::error::ApiError;
use crate::middleware::{ApiResponse, AuthUser};
use crate::services::provisioning::{CreateResourceRequest, CreatedResource, StatusUpdate};
use crate::store::{ProvisionedResource, ResourceStatus};

use super::AppState;

const DEFAULT_LIST_LIMIT: i64 = 50;
const MAX_LIST_LIMIT: i64 = 200;

/// POST /api/keys - Provision a new credential pair
///
/// Returns 201 with the stored record. The secret field is present only
/// when the credential was minted here, and is never returned again.
pub async fn create(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Json(body): Json<CreateResourceRequest>,
) -> Result<ApiResponse<CreatedResource>, ApiError> {
    if body.name.trim().is_empty() {
        return Err(ApiError::bad_request("Field 'name' must not be empty"));
    }
    if body.bound_policy_id.trim().is_empty() {
        return Err(ApiError::bad_request("Field 'bound_policy_id' must not be empty"));
    }

    let created = state.provisioning.create(&auth.actor(), body).await?;
    Ok(ApiResponse::created(created))
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    /// Filter by status: active, inactive, expired, revoked
    pub status: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// GET /api/keys - List the tenant's provisioned resources, newest first
pub async fn list(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Query(query): Query<ListQuery>,
) -> Result<ApiResponse<Vec<ProvisionedResource>>, ApiError> {
    let status = match query.status.as_deref() {
        Some(raw) => Some(ResourceStatus::parse(raw).ok_or_else(|| {
            ApiError::bad_request(format!("Unknown status filter '{}'", raw))
        })?),
        None => None,
    };

    let limit = query
        .limit
        .unwrap_or(DEFAULT_LIST_LIMIT)
        .clamp(1, MAX_LIST_LIMIT);
    let offset = query.offset.unwrap_or(0).max(0);

    let resources = state
        .provisioning
        .list(&auth.actor(), status, limit, offset)
        .await?;
    Ok(ApiResponse::success(resources))
}

/// GET /api/keys/:id - Fetch a single resource record
pub async fn get(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<Uuid>,
) -> Result<ApiResponse<ProvisionedResource>, ApiError> {
    let resource = state.provisioning.get(&auth.actor(), id).await?;
    Ok(ApiResponse::success(resource))
}

#[derive(Debug, Deserialize)]
pub struct StatusBody {
    pub status: String,
}

/// PUT /api/keys/:id/status - Change the resource status
///
/// The record store is authoritative; a gateway mirror failure is reported
/// as a warning alongside the updated record.
pub async fn update_status(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<Uuid>,
    Json(body): Json<StatusBody>,
) -> Result<ApiResponse<StatusUpdate>, ApiError> {
    let status = ResourceStatus::parse(&body.status)
        .ok_or_else(|| ApiError::bad_request(format!("Unknown status '{}'", body.status)))?;

    let update = state
        .provisioning
        .update_status(&auth.actor(), id, status)
        .await?;
    Ok(ApiResponse::success(update))
}

/// DELETE /api/keys/:id - De-provision a credential pair
pub async fn delete(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<Uuid>,
) -> Result<ApiResponse<Value>, ApiError> {
    state.provisioning.delete(&auth.actor(), id).await?;
    Ok(ApiResponse::success(json!({ "deleted": id })))
}
