use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json},
};
use serde_json::json;

use crate::store::postgres;

use super::AppState;

/// GET / - Service banner and endpoint map
pub async fn root() -> Json<serde_json::Value> {
    let version = env!("CARGO_PKG_VERSION");

    Json(json!({
        "success": true,
        "data": {
            "name": "Siftbeam Admin API",
            "version": version,
            "description": "Tenant administration API for API key provisioning and account lifecycle",
            "endpoints": {
                "home": "/ (public)",
                "health": "/health (public)",
                "keys": "/api/keys[/:id] (protected)",
                "key_status": "/api/keys/:id/status (protected)",
                "account_deletion": "/api/account/deletion (protected, POST/GET/DELETE)",
            }
        }
    }))
}

/// GET /health - Liveness plus a database round-trip
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let now = chrono::Utc::now();

    match postgres::ping(&state.pool).await {
        Ok(()) => (
            StatusCode::OK,
            Json(json!({
                "success": true,
                "data": {
                    "status": "ok",
                    "timestamp": now,
                    "database": "ok"
                }
            })),
        ),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({
                "success": false,
                "error": "database unavailable",
                "data": {
                    "status": "degraded",
                    "timestamp": now,
                    "database_error": e.to_string()
                }
            })),
        ),
    }
}
