// handlers - HTTP endpoints grouped by resource
//
// Route prefix: /api/* (JWT authentication required)
//   /api/keys            - provisioned resource management
//   /api/account/deletion - account lifecycle (request/restore/status)
//
// Public (no auth): / and /health

pub mod account;
pub mod keys;
pub mod public;

use std::sync::Arc;

use sqlx::PgPool;

use crate::services::{LifecycleService, ProvisioningService};

/// Shared dependencies injected into every handler via axum `State`.
#[derive(Clone)]
pub struct AppState {
    pub provisioning: Arc<ProvisioningService>,
    pub lifecycle: Arc<LifecycleService>,
    pub pool: PgPool,
}
