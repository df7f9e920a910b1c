use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::EditorError;

/// Number of snapshots kept after each eviction pass.
pub const DEFAULT_RETENTION: usize = 20;

/// Filename prefix shared by every snapshot.
pub const SNAPSHOT_PREFIX: &str = "glance_backup_";

/// Filename extension shared by every snapshot.
pub const SNAPSHOT_EXTENSION: &str = ".yaml";

/// Metadata about a single backup snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotInfo {
    /// Snapshot identifier, which is also its filename
    pub id: String,
    /// Size of the snapshot content in bytes
    pub size_bytes: u64,
    /// When the snapshot was taken
    pub created_at: chrono::DateTime<chrono::Utc>,
}

/// Result of an eviction pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EvictionReport {
    /// Snapshots deleted by this pass
    pub removed: Vec<String>,
    /// Snapshots that should have been deleted but could not be, with the cause
    pub failed: Vec<(String, String)>,
}

impl EvictionReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Whether `name` follows the snapshot naming scheme.
pub fn is_snapshot_name(name: &str) -> bool {
    name.len() > SNAPSHOT_PREFIX.len() + SNAPSHOT_EXTENSION.len()
        && name.starts_with(SNAPSHOT_PREFIX)
        && name.ends_with(SNAPSHOT_EXTENSION)
}

/// Reject identifiers that could escape the backup directory.
///
/// Runs before any filesystem access so that a rejected id reveals nothing about
/// which files exist.
pub fn validate_snapshot_id(id: &str) -> Result<(), EditorError> {
    if id.is_empty()
        || id.contains('/')
        || id.contains('\\')
        || id.contains("..")
        || id.contains('\0')
    {
        return Err(EditorError::InvalidIdentifier(id.to_string()));
    }
    if !is_snapshot_name(id) {
        return Err(EditorError::InvalidIdentifier(id.to_string()));
    }
    Ok(())
}

/// Append/evict-only store of document snapshots.
///
/// Snapshots are immutable once written. The only way a snapshot disappears is the
/// retention policy applied by `evict_excess`.
#[async_trait]
pub trait BackupStore: Send + Sync {
    /// Returns the backend identifier (e.g., "local").
    fn backend_name(&self) -> &'static str;

    /// Write a new snapshot of `text`. Never overwrites an existing snapshot.
    async fn snapshot(&self, text: &str) -> Result<SnapshotInfo, EditorError>;

    /// Delete every snapshot beyond the `retain` newest ones.
    ///
    /// Individual deletion failures are reported, not raised.
    async fn evict_excess(&self, retain: usize) -> Result<EvictionReport, EditorError>;

    /// List all snapshots, newest first.
    async fn list(&self) -> Result<Vec<SnapshotInfo>, EditorError>;

    /// Read a snapshot's text.
    async fn read(&self, id: &str) -> Result<String, EditorError>;

    /// The newest snapshot, if any.
    async fn latest(&self) -> Result<Option<SnapshotInfo>, EditorError> {
        Ok(self.list().await?.into_iter().next())
    }
}
