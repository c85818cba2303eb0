use std::sync::Arc;

use axum::{
    middleware as axum_middleware,
    routing::{get, post},
    Router,
};
use sqlx::postgres::PgPoolOptions;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use siftbeam_admin::audit::TracingAuditRecorder;
use siftbeam_admin::clients::{HttpBillingClient, HttpDirectoryClient, HttpGatewayClient};
use siftbeam_admin::config;
use siftbeam_admin::handlers::{self, AppState};
use siftbeam_admin::middleware::jwt_auth_middleware;
use siftbeam_admin::services::{LifecycleService, ProvisioningService};
use siftbeam_admin::store::postgres::PgRecordStore;

#[tokio::main]
async fn main() {
    // Load .env if present so cargo run picks up DATABASE_URL, JWT_SECRET, etc.
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt::init();

    let config = config::config();
    tracing::info!("Starting Siftbeam Admin API in {:?} mode", config.environment);

    let database_url = std::env::var("DATABASE_URL")
        .unwrap_or_else(|_| "postgres://localhost:5432/siftbeam".to_string());

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&database_url)
        .await
        .unwrap_or_else(|e| panic!("failed to connect to {}: {}", database_url, e));

    let store = PgRecordStore::new(pool.clone());
    store
        .migrate()
        .await
        .unwrap_or_else(|e| panic!("schema migration failed: {}", e));

    let audit = Arc::new(TracingAuditRecorder);

    let provisioning = Arc::new(ProvisioningService::new(
        Arc::new(HttpGatewayClient::new(&config.gateway)),
        Arc::new(store),
        audit.clone(),
        config.gateway.quota_plan_id.clone(),
    ));
    let lifecycle = Arc::new(LifecycleService::new(
        Arc::new(HttpDirectoryClient::new(&config.directory)),
        Arc::new(HttpBillingClient::new(&config.billing)),
        audit,
        config.retention.grace_period_days,
    ));

    let state = AppState {
        provisioning,
        lifecycle,
        pool,
    };

    let app = app(state);

    // Allow tests or deployments to override port via env
    let port = std::env::var("PORT")
        .ok()
        .and_then(|s| s.parse::<u16>().ok())
        .unwrap_or(3000);

    let bind_addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .unwrap_or_else(|e| panic!("failed to bind {}: {}", bind_addr, e));

    tracing::info!("Siftbeam Admin API listening on http://{}", bind_addr);

    axum::serve(listener, app).await.expect("server");
}

fn app(state: AppState) -> Router {
    Router::new()
        // Public
        .route("/", get(handlers::public::root))
        .route("/health", get(handlers::public::health))
        // Protected API
        .merge(api_routes())
        // Global middleware
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn api_routes() -> Router<AppState> {
    use handlers::{account, keys};

    Router::new()
        // Credential provisioning
        .route("/api/keys", post(keys::create).get(keys::list))
        .route("/api/keys/:id", get(keys::get).delete(keys::delete))
        .route("/api/keys/:id/status", axum::routing::put(keys::update_status))
        // Account lifecycle
        .route(
            "/api/account/deletion",
            post(account::request_deletion)
                .get(account::status)
                .delete(account::restore),
        )
        .layer(axum_middleware::from_fn(jwt_auth_middleware))
}
