//! Local filesystem backend for the Glance configuration editor.
//!
//! - `LocalBackupStore`: snapshot directory plus a JSON index of creation times
//! - `JsonSettingsStore`: remote sync settings as a flat JSON record
//! - `DocumentManager`: the validate, back up, write, sync pipeline for the document

mod backup;
mod document;
mod fs;
mod settings;

pub use backup::LocalBackupStore;
pub use document::{
    BackupOutcome, DocumentContent, DocumentManager, RemoteOutcome, SaveReport, DEFAULT_DOCUMENT,
};
pub use settings::{JsonSettingsStore, SETTINGS_FILE};
