use thiserror::Error;

/// Errors produced by the editor engine.
///
/// Payloads are plain strings carrying the underlying cause, so errors can cross
/// the HTTP boundary verbatim.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EditorError {
    #[error("Configuration content is empty")]
    EmptyDocument,

    #[error("YAML syntax error: {0}")]
    SyntaxError(String),

    #[error("Error saving configuration: {0}")]
    WriteFailed(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid identifier: {0}")]
    InvalidIdentifier(String),

    #[error("GitHub authentication failed: {0}")]
    RemoteAuthFailed(String),

    #[error("GitHub resource not found: {0}")]
    RemoteNotFound(String),

    #[error("GitHub rejected the update as a conflict: {0}")]
    RemoteConflict(String),

    #[error("GitHub API error: {0}")]
    RemoteRejected(String),

    #[error("Connection error: {0}")]
    RemoteTransportError(String),

    #[error("Missing required field: {0}")]
    SettingsIncomplete(String),

    #[error("GitHub integration is not enabled")]
    SyncDisabled,

    #[error("I/O error: {0}")]
    Io(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl EditorError {
    /// Whether the error came from the remote repository side.
    pub fn is_remote(&self) -> bool {
        matches!(
            self,
            EditorError::RemoteAuthFailed(_)
                | EditorError::RemoteNotFound(_)
                | EditorError::RemoteConflict(_)
                | EditorError::RemoteRejected(_)
                | EditorError::RemoteTransportError(_)
        )
    }
}
