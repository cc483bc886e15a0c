pub mod routes;
pub mod state;

use axum::http::Method;
use axum::routing::get;
use axum::Router;
use tower_http::cors::{Any, CorsLayer};

use crate::state::SharedState;

pub use state::{AppState, GatewayMetrics, SharedState as SharedStateType};

/// Build the Axum router with all admin API routes and middleware.
pub fn build_router(state: SharedState) -> Router {
    // Cross-origin callers get read-only access.
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET])
        .allow_headers(Any);

    Router::new()
        .route("/api/health", get(routes::health::health_check))
        .route("/api/metrics", get(routes::metrics::get_metrics))
        // Live route table
        .route(
            "/api/routes",
            get(routes::route_table::get_routes).put(routes::route_table::replace_routes),
        )
        // Audit events
        .route("/api/logs", get(routes::logs::get_logs))
        .route("/api/stats", get(routes::stats::get_stats))
        .with_state(state)
        .layer(cors)
}

/// Start the admin API server on the specified address.
///
/// Runs until the listener fails.
pub async fn run_admin_server(state: SharedState, listen_addr: &str) -> anyhow::Result<()> {
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(listen_addr).await?;
    tracing::info!(listen = listen_addr, "admin API server listening");

    axum::serve(listener, app).await?;

    Ok(())
}
