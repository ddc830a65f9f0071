//! HTTP server exposing every function under its own path.

use std::net::SocketAddr;

use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::functions::{manage_users, public_env, scan_addons, sync_document, sync_index, user_data};
use crate::state::SharedState;

async fn healthz() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

/// Builds the router for all functions.
///
/// `public-env` enforces its own origin allow-list, so it sits outside the
/// permissive CORS layer the other functions share.
pub fn build_router(state: SharedState) -> Router {
    let functions = Router::new()
        .route(
            "/sync-index",
            get(sync_index::search_page).post(sync_index::handle),
        )
        .route(
            "/sync-document",
            get(sync_document::health).post(sync_document::handle),
        )
        .route(
            "/scan-addons",
            get(scan_addons::handle).post(scan_addons::handle),
        )
        .route(
            "/scan-addons/quick",
            get(scan_addons::quick).post(scan_addons::quick),
        )
        .route(
            "/scan-addons/health",
            get(scan_addons::health).post(scan_addons::health),
        )
        .route("/user-data", get(user_data::handle).post(user_data::handle))
        .route("/manage-users", post(manage_users::handle))
        .layer(CorsLayer::permissive());

    Router::new()
        .route("/public-env", get(public_env::handle))
        .route("/healthz", get(healthz))
        .merge(functions)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serves the router on `addr` until Ctrl-C.
pub async fn serve(state: SharedState, addr: SocketAddr) -> std::io::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!(addr = %listener.local_addr()?, "Functions server listening");
    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutting down");
}
