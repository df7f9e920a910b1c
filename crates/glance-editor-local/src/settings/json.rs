use std::path::{Path, PathBuf};

use async_trait::async_trait;
use glance_editor_core::{EditorError, SettingsStore, SyncSettings, SyncSettingsUpdate};
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{debug, error, info, instrument};

use crate::fs::write_atomic;

/// Conventional filename of the settings record inside the backup directory.
pub const SETTINGS_FILE: &str = "github_settings.json";

/// Settings store backed by a single pretty-printed JSON file.
#[derive(Debug)]
pub struct JsonSettingsStore {
    path: PathBuf,
    /// Serializes read-merge-write cycles
    write_lock: Mutex<()>,
}

impl JsonSettingsStore {
    /// Create a store for the record at `path`.
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            write_lock: Mutex::new(()),
        }
    }

    /// Create a store using the conventional filename inside `backup_dir`.
    pub fn in_dir(backup_dir: impl AsRef<Path>) -> Self {
        Self::new(backup_dir.as_ref().join(SETTINGS_FILE))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl SettingsStore for JsonSettingsStore {
    #[instrument(skip(self), level = "debug")]
    async fn load(&self) -> Result<SyncSettings, EditorError> {
        match fs::read_to_string(&self.path).await {
            Ok(json) => match serde_json::from_str(&json) {
                Ok(settings) => Ok(settings),
                Err(e) => {
                    error!("Error loading GitHub settings: {}", e);
                    Ok(SyncSettings::default())
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No settings at {}, using defaults", self.path.display());
                Ok(SyncSettings::default())
            }
            Err(e) => Err(EditorError::Io(format!(
                "Failed to read settings {}: {}",
                self.path.display(),
                e
            ))),
        }
    }

    #[instrument(skip(self, update), level = "debug")]
    async fn save(&self, update: SyncSettingsUpdate) -> Result<SyncSettings, EditorError> {
        let _guard = self.write_lock.lock().await;

        let current = self.load().await?;
        let merged = current.merged(update);
        merged.validate()?;

        let json = serde_json::to_string_pretty(&merged).map_err(|e| {
            EditorError::Serialization(format!("Failed to serialize settings: {}", e))
        })?;
        write_atomic(&self.path, json.as_bytes())
            .await
            .map_err(|e| EditorError::Io(format!("Failed to save settings: {}", e)))?;

        info!(
            "Saved sync settings (enabled={}, repo={}, branch={})",
            merged.enabled, merged.repo, merged.branch
        );
        Ok(merged)
    }
}
