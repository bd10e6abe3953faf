//! `server` binary: the HTTP surface over the stream orchestrator.
//!
//! Startup sequence grounded on `continuum-core/src/main.rs` (logging
//! init, then a long-lived listener loop, with shutdown on a signal)
//! generalized from a Unix-socket IPC server to an `axum` HTTP server.

use std::path::PathBuf;
use std::sync::Arc;

use mesh_chat_assistant::config::AppConfig;
use mesh_chat_assistant::http;
use mesh_chat_assistant::orchestrator::Orchestrator;
use mesh_chat_assistant::repository::{BlobRepository, MessageRepository};
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("mesh-chat-assistant.toml"));

    let config = if config_path.exists() {
        AppConfig::load(&config_path)?
    } else {
        AppConfig::default()
    };

    mesh_chat_assistant::logging::init(&config.log.level);

    info!("mesh chat assistant starting");
    info!(
        max_workers = config.assistant.max_workers,
        implementation = %config.assistant.implementation,
        "assistant configured"
    );

    let messages = Arc::new(MessageRepository::new());
    let blobs = Arc::new(BlobRepository::new(config.server.blob_dir.clone()));
    let orchestrator = Arc::new(Orchestrator::new(&config.assistant, messages.clone(), blobs));

    let state = http::AppState {
        orchestrator: orchestrator.clone(),
        messages,
    };
    let router = http::router(state);

    let listener = tokio::net::TcpListener::bind(&config.server.bind_addr).await?;
    info!(addr = %config.server.bind_addr, "listening");

    let shutdown_orchestrator = orchestrator.clone();
    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown signal received");
            shutdown_orchestrator.shutdown().await;
        })
        .await?;

    Ok(())
}
