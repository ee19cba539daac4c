use std::sync::Arc;

use axum::{extract::State, routing::get, Json, Router};
use data_connector::create_storage;
use gateway_mcp::{McpManager, MetricsSnapshot};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::{config::GatewayConfig, routers::admin};

#[derive(Clone)]
pub struct AppState {
    pub manager: Arc<McpManager>,
}

async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({ "status": "ok", "stats": state.manager.stats() }))
}

async fn metrics(State(state): State<AppState>) -> Json<MetricsSnapshot> {
    Json(state.manager.metrics())
}

/// Full HTTP surface: health, admin API and the MCP proxy endpoint.
pub fn build_app(manager: Arc<McpManager>) -> Router {
    let proxy = manager.proxy_handler().streamable_http_service();
    let state = AppState { manager };

    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .nest("/api/v0", admin::routes())
        .nest_service("/mcp", proxy)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

pub async fn startup(config: GatewayConfig) -> anyhow::Result<()> {
    let storage = create_storage(&config.storage)
        .await
        .map_err(anyhow::Error::msg)?;
    let manager = McpManager::with_rmcp(config.mcp.clone(), storage).await?;

    let addr = config.bind_addr();
    let listener = TcpListener::bind(&addr).await?;
    info!(
        addr = %addr,
        storage = ?config.storage.backend,
        servers = manager.stats().servers,
        "MCP gateway listening"
    );

    let app = build_app(Arc::clone(&manager));
    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await;

    manager.shutdown().await;
    served?;
    info!("MCP gateway stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for ctrl-c");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received ctrl-c, shutting down"),
        _ = terminate => info!("Received SIGTERM, shutting down"),
    }
}
