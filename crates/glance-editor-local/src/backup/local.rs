use std::collections::HashSet;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Local, Utc};
use glance_editor_core::{
    is_snapshot_name, validate_snapshot_id, BackupStore, EditorError, EvictionReport,
    SnapshotInfo, SNAPSHOT_EXTENSION, SNAPSHOT_PREFIX,
};
use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use crate::fs::write_atomic;

/// Name of the index file kept next to the snapshots.
const INDEX_FILE: &str = "backup_index.json";

/// Staging name for a snapshot being written.
const PARTIAL_FILE: &str = ".glance_backup.partial";

/// Upper bound on same-second suffixes tried before giving up.
const MAX_NAME_ATTEMPTS: u32 = 1000;

/// Creation metadata for the snapshots in a backup directory.
///
/// Ordering comes from here rather than from parsing filenames.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct SnapshotIndex {
    /// Schema version
    #[serde(default = "default_version")]
    version: u32,
    /// Sequence number handed to the next snapshot
    #[serde(default)]
    next_sequence: u64,
    #[serde(default)]
    snapshots: Vec<SnapshotIndexEntry>,
}

fn default_version() -> u32 {
    1
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SnapshotIndexEntry {
    id: String,
    created_at: DateTime<Utc>,
    sequence: u64,
}

impl SnapshotIndex {
    fn get(&self, id: &str) -> Option<&SnapshotIndexEntry> {
        self.snapshots.iter().find(|e| e.id == id)
    }
}

/// A snapshot found on disk together with its tie-breaking sequence number.
struct ListedSnapshot {
    info: SnapshotInfo,
    sequence: u64,
}

/// Local filesystem backup store.
///
/// Layout:
/// ```text
/// {dir}/
///   backup_index.json
///   glance_backup_{YYYYMMDD_HHMMSS}.yaml
///   glance_backup_{YYYYMMDD_HHMMSS}_{n}.yaml   (same-second snapshots)
/// ```
#[derive(Debug)]
pub struct LocalBackupStore {
    dir: PathBuf,
    /// Serializes snapshot creation and eviction, which both rewrite the index
    index_lock: Mutex<()>,
}

impl LocalBackupStore {
    /// Create a new LocalBackupStore rooted at `dir`.
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
            index_lock: Mutex::new(()),
        }
    }

    /// The backup directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn snapshot_path(&self, id: &str) -> PathBuf {
        self.dir.join(id)
    }

    fn index_path(&self) -> PathBuf {
        self.dir.join(INDEX_FILE)
    }

    async fn ensure_dir(&self) -> Result<(), EditorError> {
        fs::create_dir_all(&self.dir).await.map_err(|e| {
            EditorError::Io(format!(
                "Failed to create backup dir {}: {}",
                self.dir.display(),
                e
            ))
        })
    }

    /// Load the index. A missing or unreadable index yields an empty one, in which
    /// case ordering falls back to file modification times.
    async fn load_index(&self) -> SnapshotIndex {
        let path = self.index_path();
        match fs::read_to_string(&path).await {
            Ok(json) => serde_json::from_str(&json).unwrap_or_else(|e| {
                warn!("Ignoring unreadable backup index {}: {}", path.display(), e);
                SnapshotIndex::default()
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => SnapshotIndex::default(),
            Err(e) => {
                warn!("Failed to read backup index {}: {}", path.display(), e);
                SnapshotIndex::default()
            }
        }
    }

    async fn save_index(&self, index: &SnapshotIndex) -> Result<(), EditorError> {
        let json = serde_json::to_string_pretty(index).map_err(|e| {
            EditorError::Serialization(format!("Failed to serialize backup index: {}", e))
        })?;
        write_atomic(&self.index_path(), json.as_bytes())
            .await
            .map_err(|e| EditorError::Io(format!("Failed to write backup index: {}", e)))
    }

    /// Staging file for snapshot content. Its name never matches the snapshot
    /// pattern, so a partial write is invisible to `scan`.
    fn partial_path(&self) -> PathBuf {
        self.dir.join(PARTIAL_FILE)
    }

    /// Write `text` to the staging file and sync it. The staging file is removed
    /// if any step fails.
    async fn write_partial(&self, text: &str) -> Result<PathBuf, EditorError> {
        let partial = self.partial_path();
        let result = async {
            let mut file = fs::File::create(&partial).await?;
            file.write_all(text.as_bytes()).await?;
            file.sync_all().await?;
            Ok::<(), std::io::Error>(())
        }
        .await;

        if let Err(e) = result {
            let _ = fs::remove_file(&partial).await;
            return Err(EditorError::Io(format!(
                "Failed to write snapshot {}: {}",
                partial.display(),
                e
            )));
        }
        Ok(partial)
    }

    /// Create a new snapshot file without ever replacing an existing one.
    ///
    /// The content is fully written and synced under a staging name, then hard
    /// linked into place; linking fails on an existing name, which picks the next
    /// suffix.
    async fn create_snapshot_file(
        &self,
        stamp: &str,
        text: &str,
    ) -> Result<String, EditorError> {
        let partial = self.write_partial(text).await?;

        let mut linked = None;
        for attempt in 0..MAX_NAME_ATTEMPTS {
            let id = if attempt == 0 {
                format!("{}{}{}", SNAPSHOT_PREFIX, stamp, SNAPSHOT_EXTENSION)
            } else {
                format!("{}{}_{}{}", SNAPSHOT_PREFIX, stamp, attempt, SNAPSHOT_EXTENSION)
            };
            let path = self.snapshot_path(&id);

            match fs::hard_link(&partial, &path).await {
                Ok(()) => {
                    linked = Some(Ok(id));
                    break;
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => continue,
                Err(e) => {
                    linked = Some(Err(EditorError::Io(format!(
                        "Failed to create snapshot {}: {}",
                        path.display(),
                        e
                    ))));
                    break;
                }
            }
        }

        if let Err(e) = fs::remove_file(&partial).await {
            warn!("Failed to remove {}: {}", partial.display(), e);
        }

        linked.unwrap_or_else(|| {
            Err(EditorError::Io(format!(
                "No free snapshot name for timestamp {}",
                stamp
            )))
        })
    }

    /// Enumerate snapshot files, newest first.
    async fn scan(&self, index: &SnapshotIndex) -> Result<Vec<ListedSnapshot>, EditorError> {
        if !self.dir.exists() {
            return Ok(vec![]);
        }

        let mut entries = fs::read_dir(&self.dir).await.map_err(|e| {
            EditorError::Io(format!("Failed to read dir {}: {}", self.dir.display(), e))
        })?;

        let mut snapshots = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| EditorError::Io(format!("Failed to read dir entry: {}", e)))?
        {
            let id = entry.file_name().to_string_lossy().to_string();
            if !is_snapshot_name(&id) {
                continue;
            }

            let metadata = match entry.metadata().await {
                Ok(m) if m.is_file() => m,
                Ok(_) => continue,
                Err(e) => {
                    warn!("Skipping snapshot {}: {}", id, e);
                    continue;
                }
            };

            let (created_at, sequence) = match index.get(&id) {
                Some(indexed) => (indexed.created_at, indexed.sequence),
                None => (
                    metadata
                        .modified()
                        .map(DateTime::<Utc>::from)
                        .unwrap_or_else(|_| Utc::now()),
                    0,
                ),
            };

            snapshots.push(ListedSnapshot {
                info: SnapshotInfo {
                    id,
                    size_bytes: metadata.len(),
                    created_at,
                },
                sequence,
            });
        }

        snapshots.sort_by(|a, b| {
            b.info
                .created_at
                .cmp(&a.info.created_at)
                .then(b.sequence.cmp(&a.sequence))
                .then_with(|| b.info.id.cmp(&a.info.id))
        });
        Ok(snapshots)
    }
}

#[async_trait]
impl BackupStore for LocalBackupStore {
    fn backend_name(&self) -> &'static str {
        "local"
    }

    #[instrument(skip(self, text), level = "debug", fields(text_len = text.len()))]
    async fn snapshot(&self, text: &str) -> Result<SnapshotInfo, EditorError> {
        let _guard = self.index_lock.lock().await;
        self.ensure_dir().await?;

        let created_at = Utc::now();
        let stamp = created_at
            .with_timezone(&Local)
            .format("%Y%m%d_%H%M%S")
            .to_string();
        let id = self.create_snapshot_file(&stamp, text).await?;

        let mut index = self.load_index().await;
        let sequence = index.next_sequence;
        index.next_sequence += 1;
        index.snapshots.push(SnapshotIndexEntry {
            id: id.clone(),
            created_at,
            sequence,
        });
        if let Err(e) = self.save_index(&index).await {
            // The snapshot itself is durable; ordering falls back to its mtime.
            warn!("Snapshot {} written but not indexed: {}", id, e);
        }

        info!("Created backup: {}", self.snapshot_path(&id).display());
        Ok(SnapshotInfo {
            id,
            size_bytes: text.len() as u64,
            created_at,
        })
    }

    #[instrument(skip(self), level = "debug")]
    async fn evict_excess(&self, retain: usize) -> Result<EvictionReport, EditorError> {
        let _guard = self.index_lock.lock().await;

        let mut index = self.load_index().await;
        let snapshots = self.scan(&index).await?;
        let mut report = EvictionReport::default();

        for snapshot in snapshots.iter().skip(retain) {
            let id = &snapshot.info.id;
            match fs::remove_file(self.snapshot_path(id)).await {
                Ok(()) => {
                    info!("Removed old backup: {}", id);
                    report.removed.push(id.clone());
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    report.removed.push(id.clone());
                }
                Err(e) => {
                    warn!("Failed to remove old backup {}: {}", id, e);
                    report.failed.push((id.clone(), e.to_string()));
                }
            }
        }

        // Drop index entries for removed snapshots and for files deleted by hand
        let on_disk: HashSet<&str> = snapshots.iter().map(|s| s.info.id.as_str()).collect();
        let before = index.snapshots.len();
        index
            .snapshots
            .retain(|e| on_disk.contains(e.id.as_str()) && !report.removed.contains(&e.id));
        if index.snapshots.len() != before {
            if let Err(e) = self.save_index(&index).await {
                warn!("Failed to prune backup index: {}", e);
            }
        }

        debug!(
            "Eviction kept {} snapshots, removed {}, failed {}",
            snapshots.len() - report.removed.len(),
            report.removed.len(),
            report.failed.len()
        );
        Ok(report)
    }

    #[instrument(skip(self), level = "debug")]
    async fn list(&self) -> Result<Vec<SnapshotInfo>, EditorError> {
        let index = self.load_index().await;
        let snapshots = self.scan(&index).await?;
        debug!("Listed {} snapshots", snapshots.len());
        Ok(snapshots.into_iter().map(|s| s.info).collect())
    }

    #[instrument(skip(self), level = "debug")]
    async fn read(&self, id: &str) -> Result<String, EditorError> {
        validate_snapshot_id(id)?;

        let path = self.snapshot_path(id);
        match fs::read_to_string(&path).await {
            Ok(text) => {
                debug!("Read snapshot {} ({} bytes)", id, text.len());
                Ok(text)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(EditorError::NotFound(format!("Backup file not found: {}", id)))
            }
            Err(e) => Err(EditorError::Io(format!(
                "Failed to read {}: {}",
                path.display(),
                e
            ))),
        }
    }
}
