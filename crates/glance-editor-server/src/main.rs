//! Web API for the Glance configuration editor.
//!
//! This server:
//! - Serves the Glance configuration document for editing
//! - Validates and saves revisions, keeping rolling backups
//! - Optionally mirrors every saved revision to a GitHub repository
//! - Requires HTTP Basic operator credentials on every `/api` route

use std::sync::Arc;

use clap::Parser;
use glance_editor_github::GitHubSyncClient;
use glance_editor_local::{DocumentManager, JsonSettingsStore, LocalBackupStore};
use tokio::net::TcpListener;
use tokio::signal;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod auth;
mod config;
mod error;
mod handlers;

use auth::OperatorCredentials;
use config::Config;
use handlers::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::parse();

    info!("Starting glance-editor-server v{}", env!("CARGO_PKG_VERSION"));
    info!("  Host: {}", config.host);
    info!("  Port: {}", config.port);
    info!("  Config file: {}", config.config_path.display());
    info!("  Backup dir: {}", config.backup_dir.display());
    info!("  Backup retention: {}", config.backup_retention);
    info!("  GitHub API: {}", config.github_api_url);

    if config.editor_password == "admin" {
        warn!("  Using the default operator password; set EDITOR_PASSWORD");
    }

    let backups = Arc::new(LocalBackupStore::new(&config.backup_dir));
    let settings = Arc::new(JsonSettingsStore::in_dir(&config.backup_dir));
    let remote = Arc::new(GitHubSyncClient::new(
        config.github_api_url.clone(),
        config.remote_timeout(),
    )?);

    let manager = DocumentManager::new(&config.config_path, backups, settings, remote)
        .with_retention(config.backup_retention);

    // Build application state
    let state = AppState {
        manager: Arc::new(manager),
        credentials: Arc::new(OperatorCredentials::new(
            config.editor_username.clone(),
            &config.editor_password,
        )),
    };

    // Configure CORS
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Build router
    let app = handlers::router(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    // Bind and serve
    let addr = format!("{}:{}", config.host, config.port);
    let listener = TcpListener::bind(&addr).await?;
    info!("Listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
        info!("Received Ctrl+C, initiating shutdown");
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
                info!("Received SIGTERM, initiating shutdown");
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
