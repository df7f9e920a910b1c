use std::path::{Path, PathBuf};
use std::sync::Arc;

use glance_editor_core::{
    BackupStore, EditorError, PushReport, RemoteSync, SettingsStore, SnapshotInfo, SyncSettings,
    SyncSettingsUpdate, Validator, YamlValidator, DEFAULT_RETENTION,
};
use serde::Serialize;
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{debug, error, info, instrument, warn};

use crate::fs::write_atomic;

/// Written on first use when no document exists yet.
pub const DEFAULT_DOCUMENT: &str = r#"# Glance Configuration File
# Edit this configuration to customize your dashboard

pages:
  - name: Home
    columns:
      - size: small
        widgets:
          - type: calendar
            first-day-of-week: monday

          - type: weather
            location: New York, NY
            units: metric
            hour-format: 12h

      - size: full
        widgets:
          - type: rss
            limit: 10
            collapse-after: 3
            cache: 12h
            feeds:
              - url: https://feeds.feedburner.com/TechCrunch
                title: TechCrunch

# Theme configuration
theme:
  background-color: 240 240 240
  primary-color: 56 58 64

# Server configuration
server:
  host: 0.0.0.0
  port: 8080
"#;

/// The current document as handed to a caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DocumentContent {
    pub content: String,
    pub path: PathBuf,
    /// True when the document did not exist and the default was written
    pub created: bool,
}

/// What happened to the previous document during a save.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum BackupOutcome {
    /// No previous document, nothing to back up
    Skipped,
    Created {
        snapshot: SnapshotInfo,
        evicted: Vec<String>,
    },
    /// The backup could not be taken; the save went ahead anyway
    Failed { reason: String },
}

/// What happened on the remote side after a save.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RemoteOutcome {
    Disabled,
    Pushed { report: PushReport },
    Failed { reason: String },
}

impl RemoteOutcome {
    /// Suffix appended to the save message.
    pub fn note(&self) -> String {
        match self {
            RemoteOutcome::Disabled => String::new(),
            RemoteOutcome::Pushed { .. } => " (Also pushed to GitHub)".to_string(),
            RemoteOutcome::Failed { reason } => format!(" (GitHub sync failed: {})", reason),
        }
    }
}

/// Result of an accepted save.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SaveReport {
    pub backup: BackupOutcome,
    pub remote: RemoteOutcome,
}

impl SaveReport {
    pub fn message(&self) -> String {
        format!("Configuration saved successfully{}", self.remote.note())
    }
}

/// Guards the single configuration document.
///
/// Every write goes through [`DocumentManager::save`]: validate, snapshot the
/// previous content, write, then mirror to the remote if enabled. Document and
/// backup writes are serialized by an internal lock; the remote push happens
/// after the lock is released.
pub struct DocumentManager {
    document_path: PathBuf,
    validator: Arc<dyn Validator>,
    backups: Arc<dyn BackupStore>,
    settings: Arc<dyn SettingsStore>,
    remote: Arc<dyn RemoteSync>,
    retention: usize,
    write_lock: Mutex<()>,
}

impl std::fmt::Debug for DocumentManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocumentManager")
            .field("document_path", &self.document_path)
            .field("backups", &self.backups.backend_name())
            .field("remote", &self.remote.backend_name())
            .field("retention", &self.retention)
            .finish_non_exhaustive()
    }
}

impl DocumentManager {
    /// Create a manager with the YAML validator and the default retention.
    pub fn new(
        document_path: impl AsRef<Path>,
        backups: Arc<dyn BackupStore>,
        settings: Arc<dyn SettingsStore>,
        remote: Arc<dyn RemoteSync>,
    ) -> Self {
        Self {
            document_path: document_path.as_ref().to_path_buf(),
            validator: Arc::new(YamlValidator),
            backups,
            settings,
            remote,
            retention: DEFAULT_RETENTION,
            write_lock: Mutex::new(()),
        }
    }

    pub fn with_validator(mut self, validator: Arc<dyn Validator>) -> Self {
        self.validator = validator;
        self
    }

    pub fn with_retention(mut self, retention: usize) -> Self {
        self.retention = retention;
        self
    }

    pub fn document_path(&self) -> &Path {
        &self.document_path
    }

    /// Read the document, `None` if it does not exist.
    async fn read_document(&self) -> Result<Option<String>, EditorError> {
        match fs::read_to_string(&self.document_path).await {
            Ok(text) => Ok(Some(text)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(EditorError::Io(format!(
                "Error reading configuration file {}: {}",
                self.document_path.display(),
                e
            ))),
        }
    }

    /// The current document, seeding the default template on first use.
    #[instrument(skip(self), level = "debug")]
    pub async fn get_current(&self) -> Result<DocumentContent, EditorError> {
        if let Some(content) = self.read_document().await? {
            return Ok(DocumentContent {
                content,
                path: self.document_path.clone(),
                created: false,
            });
        }

        let _guard = self.write_lock.lock().await;
        // Another caller may have seeded or saved while we waited
        if let Some(content) = self.read_document().await? {
            return Ok(DocumentContent {
                content,
                path: self.document_path.clone(),
                created: false,
            });
        }

        write_atomic(&self.document_path, DEFAULT_DOCUMENT.as_bytes())
            .await
            .map_err(|e| EditorError::WriteFailed(e.to_string()))?;
        info!(
            "Created default configuration at {}",
            self.document_path.display()
        );

        Ok(DocumentContent {
            content: DEFAULT_DOCUMENT.to_string(),
            path: self.document_path.clone(),
            created: true,
        })
    }

    /// Check candidate text without touching the filesystem.
    pub fn validate(&self, text: &str) -> Result<(), EditorError> {
        self.validator.validate(text)
    }

    /// Validate, back up the previous document, write `text`, then sync.
    #[instrument(skip(self, text), level = "debug", fields(text_len = text.len()))]
    pub async fn save(&self, text: &str) -> Result<SaveReport, EditorError> {
        self.validator.validate(text)?;

        let backup = {
            let _guard = self.write_lock.lock().await;

            let backup = self.backup_existing().await;

            write_atomic(&self.document_path, text.as_bytes())
                .await
                .map_err(|e| {
                    error!("Error saving config: {}", e);
                    EditorError::WriteFailed(e.to_string())
                })?;
            info!("Configuration saved to {}", self.document_path.display());

            backup
        };

        let remote = self.sync_remote(text).await;
        Ok(SaveReport { backup, remote })
    }

    /// Snapshot the on-disk document, if any, then apply retention. Never fails
    /// the save.
    async fn backup_existing(&self) -> BackupOutcome {
        let previous = match self.read_document().await {
            Ok(Some(previous)) => previous,
            Ok(None) => {
                debug!("No existing document, skipping backup");
                return BackupOutcome::Skipped;
            }
            Err(e) => {
                warn!("Backup failed, saving anyway: {}", e);
                return BackupOutcome::Failed {
                    reason: e.to_string(),
                };
            }
        };

        let snapshot = match self.backups.snapshot(&previous).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!("Backup failed, saving anyway: {}", e);
                return BackupOutcome::Failed {
                    reason: e.to_string(),
                };
            }
        };

        let evicted = match self.backups.evict_excess(self.retention).await {
            Ok(report) => {
                if !report.is_clean() {
                    let stuck: Vec<&str> =
                        report.failed.iter().map(|(id, _)| id.as_str()).collect();
                    error!(
                        "Retention left {} backups over the limit: {}",
                        stuck.len(),
                        stuck.join(", ")
                    );
                }
                report.removed
            }
            Err(e) => {
                error!("Error cleaning up backups: {}", e);
                Vec::new()
            }
        };

        BackupOutcome::Created { snapshot, evicted }
    }

    /// Push `text` if remote sync is enabled. Failures become part of the outcome.
    async fn sync_remote(&self, text: &str) -> RemoteOutcome {
        let settings = match self.settings.load().await {
            Ok(settings) => settings,
            Err(e) => {
                warn!("GitHub sync skipped, settings unreadable: {}", e);
                return RemoteOutcome::Failed {
                    reason: e.to_string(),
                };
            }
        };

        if !settings.enabled {
            return RemoteOutcome::Disabled;
        }

        match self.remote.push(text, &settings).await {
            Ok(report) => {
                if let Some(status) = report.create_assumed {
                    warn!(
                        "Revision lookup for {} returned {}, pushed as a create",
                        settings.path, status
                    );
                }
                info!("Configuration pushed to GitHub successfully");
                RemoteOutcome::Pushed { report }
            }
            Err(e) => {
                warn!("GitHub sync failed: {}", e);
                RemoteOutcome::Failed {
                    reason: e.to_string(),
                }
            }
        }
    }

    /// The last durably saved text, discarding any unsaved edits.
    #[instrument(skip(self), level = "debug")]
    pub async fn undo(&self) -> Result<String, EditorError> {
        self.read_document()
            .await?
            .ok_or_else(|| EditorError::NotFound("No saved configuration found".to_string()))
    }

    /// Text of a snapshot, for the caller to save again if it wants to adopt it.
    #[instrument(skip(self), level = "debug")]
    pub async fn restore(&self, snapshot_id: &str) -> Result<String, EditorError> {
        self.backups.read(snapshot_id).await
    }

    pub async fn latest_backup(&self) -> Result<Option<SnapshotInfo>, EditorError> {
        self.backups.latest().await
    }

    pub async fn list_backups(&self) -> Result<Vec<SnapshotInfo>, EditorError> {
        self.backups.list().await
    }

    /// Stored sync settings with the token masked.
    pub async fn sync_settings(&self) -> Result<SyncSettings, EditorError> {
        Ok(self.settings.load().await?.masked())
    }

    /// Merge and persist a settings update. Returns the masked result.
    pub async fn update_sync_settings(
        &self,
        update: SyncSettingsUpdate,
    ) -> Result<SyncSettings, EditorError> {
        Ok(self.settings.save(update).await?.masked())
    }

    /// Check that the configured repository is reachable.
    #[instrument(skip(self), level = "debug")]
    pub async fn test_remote_connection(&self) -> Result<String, EditorError> {
        let settings = self.settings.load().await?;
        if !settings.enabled {
            return Err(EditorError::SyncDisabled);
        }
        self.remote.test_connection(&settings).await
    }
}
