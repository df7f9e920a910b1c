//! Core traits and types for the Glance configuration editor.
//!
//! This crate defines the abstractions shared by the filesystem backend, the
//! remote sync client and the HTTP server:
//! - `Validator`: syntactic checks on candidate document text
//! - `BackupStore`: timestamped snapshots with a retention policy
//! - `SettingsStore`: persisted remote sync configuration
//! - `RemoteSync`: pushing accepted revisions to a remote repository

mod backup;
mod error;
mod settings;
mod sync;
mod validate;

pub use backup::{
    is_snapshot_name, validate_snapshot_id, BackupStore, EvictionReport, SnapshotInfo,
    DEFAULT_RETENTION, SNAPSHOT_EXTENSION, SNAPSHOT_PREFIX,
};
pub use error::EditorError;
pub use settings::{
    SettingsStore, SyncSettings, SyncSettingsUpdate, DEFAULT_COMMIT_MESSAGE, MASKED_TOKEN,
};
pub use sync::{PushReport, RemoteSync};
pub use validate::{Validator, YamlValidator};
