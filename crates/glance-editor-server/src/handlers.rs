//! HTTP handlers for the editor API.
//!
//! Implements:
//! - GET /api/config, POST /api/validate, POST /api/save - the document
//! - GET /api/backups, GET /api/restore/{filename}, GET /api/undo - revisions
//! - GET|POST /api/github-settings, GET /api/test-github - remote sync
//! - GET /health - Health check endpoint (unauthenticated)

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::middleware;
use axum::routing::{get, post};
use axum::{Extension, Json, Router};
use glance_editor_core::SyncSettingsUpdate;
use glance_editor_local::DocumentManager;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::info;

use crate::auth::{require_operator, Operator, SharedCredentials};
use crate::error::Result;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub manager: Arc<DocumentManager>,
    pub credentials: SharedCredentials,
}

/// Build the API router. `/health` is the only route outside authentication.
pub fn router(state: AppState) -> Router {
    let api = Router::new()
        .route("/api/config", get(get_config))
        .route("/api/validate", post(validate_config))
        .route("/api/save", post(save_config))
        .route("/api/backups", get(list_backups))
        .route("/api/restore/{filename}", get(restore_backup))
        .route("/api/undo", get(undo_changes))
        .route(
            "/api/github-settings",
            get(get_sync_settings).post(update_sync_settings),
        )
        .route("/api/test-github", get(test_github))
        .route_layer(middleware::from_fn_with_state(
            state.credentials.clone(),
            require_operator,
        ));

    Router::new()
        .route("/health", get(health_handler))
        .merge(api)
        .with_state(state)
}

/// Health check response.
#[derive(Serialize)]
pub struct HealthResponse {
    pub healthy: bool,
    pub version: &'static str,
}

/// GET /health - Health check endpoint.
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        healthy: true,
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Request body carrying candidate document text.
#[derive(Deserialize)]
pub struct ContentBody {
    #[serde(default)]
    content: String,
}

/// Newest backup as listed to clients.
#[derive(Serialize)]
struct BackupEntry {
    filename: String,
    size: u64,
    modified: String,
}

/// GET /api/config - current document, seeded with the default on first use.
async fn get_config(
    State(state): State<AppState>,
    Extension(operator): Extension<Operator>,
) -> Result<Json<Value>> {
    let document = state.manager.get_current().await?;
    if document.created {
        info!("{} opened a new default configuration", operator.username);
    }

    let mut body = json!({
        "success": true,
        "content": document.content,
        "path": document.path,
        "created": document.created,
    });
    if document.created {
        body["message"] = json!("Created new configuration file");
    }
    Ok(Json(body))
}

/// POST /api/validate - check text without saving.
async fn validate_config(
    State(state): State<AppState>,
    body: std::result::Result<Json<ContentBody>, JsonRejection>,
) -> Result<Json<Value>> {
    let Json(body) = body?;
    Ok(Json(match state.manager.validate(&body.content) {
        Ok(()) => json!({"valid": true, "message": "YAML is valid"}),
        Err(e) => json!({"valid": false, "error": e.to_string()}),
    }))
}

/// POST /api/save - validate, back up, write and sync.
async fn save_config(
    State(state): State<AppState>,
    Extension(operator): Extension<Operator>,
    body: std::result::Result<Json<ContentBody>, JsonRejection>,
) -> Result<Json<Value>> {
    let Json(body) = body?;
    let report = state.manager.save(&body.content).await?;
    info!(
        "{} saved the configuration ({} bytes)",
        operator.username,
        body.content.len()
    );

    Ok(Json(json!({
        "success": true,
        "message": report.message(),
        "backup": report.backup,
        "remote_sync": report.remote,
    })))
}

/// GET /api/backups - only the most recent backup is listed.
async fn list_backups(State(state): State<AppState>) -> Result<Json<Value>> {
    let backups: Vec<BackupEntry> = state
        .manager
        .latest_backup()
        .await?
        .into_iter()
        .map(|snapshot| BackupEntry {
            filename: snapshot.id,
            size: snapshot.size_bytes,
            modified: snapshot.created_at.to_rfc3339(),
        })
        .collect();

    Ok(Json(json!({"success": true, "backups": backups})))
}

/// GET /api/restore/{filename} - content of a backup. Nothing is written.
async fn restore_backup(
    State(state): State<AppState>,
    Extension(operator): Extension<Operator>,
    Path(filename): Path<String>,
) -> Result<Json<Value>> {
    let content = state.manager.restore(&filename).await?;
    info!("{} loaded backup {}", operator.username, filename);

    Ok(Json(json!({
        "success": true,
        "content": content,
        "message": format!("Backup {} loaded successfully", filename),
    })))
}

/// GET /api/undo - last saved document.
async fn undo_changes(State(state): State<AppState>) -> Result<Json<Value>> {
    let content = state.manager.undo().await?;
    Ok(Json(json!({
        "success": true,
        "content": content,
        "message": "Reverted to last saved configuration",
    })))
}

/// GET /api/github-settings - settings with the token masked.
async fn get_sync_settings(State(state): State<AppState>) -> Result<Json<Value>> {
    let settings = state.manager.sync_settings().await?;
    Ok(Json(json!({"success": true, "settings": settings})))
}

/// POST /api/github-settings - merge a partial update.
async fn update_sync_settings(
    State(state): State<AppState>,
    Extension(operator): Extension<Operator>,
    body: std::result::Result<Json<SyncSettingsUpdate>, JsonRejection>,
) -> Result<Json<Value>> {
    let Json(update) = body?;
    let settings = state.manager.update_sync_settings(update).await?;
    info!(
        "{} updated GitHub settings (enabled={})",
        operator.username, settings.enabled
    );

    Ok(Json(json!({
        "success": true,
        "message": "Settings saved successfully",
        "settings": settings,
    })))
}

/// GET /api/test-github - check the configured repository is reachable.
async fn test_github(State(state): State<AppState>) -> Result<Json<Value>> {
    let full_name = state.manager.test_remote_connection().await?;
    Ok(Json(json!({
        "success": true,
        "message": format!("Connected to {}", full_name),
    })))
}
