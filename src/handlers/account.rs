use axum::extract::{Extension, State};

use crate::error::ApiError;
use crate::middleware::{ApiResponse, AuthUser};
use crate::services::lifecycle::{AccountRestored, DeletionRequested, DeletionStatus};

use super::AppState;

/// POST /api/account/deletion - Flag the tenant for deletion (admin only)
///
/// Safe to re-invoke: a second call refreshes the flag and converges any
/// identities the first fan-out missed.
pub async fn request_deletion(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
) -> Result<ApiResponse<DeletionRequested>, ApiError> {
    let requested = state.lifecycle.request_deletion(&auth.actor()).await?;
    Ok(ApiResponse::success(requested))
}

/// DELETE /api/account/deletion - Cancel a pending deletion (admin only)
pub async fn restore(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
) -> Result<ApiResponse<AccountRestored>, ApiError> {
    let restored = state.lifecycle.restore_account(&auth.actor()).await?;
    Ok(ApiResponse::success(restored))
}

/// GET /api/account/deletion - Report the account's deletion state
pub async fn status(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
) -> Result<ApiResponse<DeletionStatus>, ApiError> {
    let status = state.lifecycle.check_deletion_status(&auth.actor()).await?;
    Ok(ApiResponse::success(status))
}
