//! Synchub Server - real-time sync relay
//!
//! Clients connect over WebSocket at `/ws`, register a device id, and every
//! sync event they send is fanned out to all other registered devices.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use axum::{routing::get, Router};
use synchub_shared::WS_PATH;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub mod config;
pub mod connection;
pub mod error;
pub mod hub;
pub mod registry;
pub mod routes;
pub mod state;
pub mod stats;
pub mod sweep;
pub mod ws;

use config::ServerConfig;
use hub::Hub;
use state::AppState;

/// Build the HTTP router: health surface plus the WebSocket endpoint.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(routes::health::health))
        .route("/health", get(routes::health::health))
        .route("/stats", get(routes::health::stats))
        .route(WS_PATH, get(ws::ws_handler))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Serve `state` on an already-bound listener until the server stops.
pub async fn serve(listener: TcpListener, state: AppState) -> anyhow::Result<()> {
    axum::serve(
        listener,
        router(state).into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .context("server error")
}

/// Bind according to `config`, start the idle sweep if enabled, and serve.
pub async fn run(config: ServerConfig) -> anyhow::Result<()> {
    let hub = Arc::new(Hub::new());
    let state = AppState::new(hub.clone());

    if let Some(max_idle) = config.idle_timeout {
        sweep::spawn(hub, max_idle);
    }

    let addr = config.bind_addr();
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    tracing::info!("Starting server on {}", addr);
    tracing::info!("Health check: http://{}/health", addr);
    tracing::info!("WebSocket: ws://{}{}", addr, WS_PATH);

    serve(listener, state).await
}
