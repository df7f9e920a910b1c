use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::EditorError;
use crate::settings::SyncSettings;

/// Outcome of a successful push to the remote repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushReport {
    /// True when the remote file was created, false when it was updated
    pub created: bool,
    /// Set when the revision lookup failed with this status and the push went
    /// ahead as a create anyway
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub create_assumed: Option<u16>,
    /// Remote content hash after the push, when the API returned one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revision: Option<String>,
}

/// Sync backend abstraction for mirroring the document to a remote repository.
///
/// Updates use optimistic concurrency: the current remote revision is fetched right
/// before each write and sent back so the remote rejects the write if someone else
/// changed the file in between.
#[async_trait]
pub trait RemoteSync: Send + Sync {
    /// Returns the backend identifier (e.g., "github").
    fn backend_name(&self) -> &'static str;

    /// Create or update `settings.path` on `settings.branch` with `text`.
    async fn push(&self, text: &str, settings: &SyncSettings) -> Result<PushReport, EditorError>;

    /// Check that the repository is reachable with the configured credential.
    ///
    /// Returns the repository's full name.
    async fn test_connection(&self, settings: &SyncSettings) -> Result<String, EditorError>;
}
