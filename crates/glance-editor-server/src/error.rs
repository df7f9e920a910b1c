//! Error responses for the editor API.

use axum::extract::rejection::JsonRejection;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use glance_editor_core::EditorError;
use serde::Serialize;

/// Realm advertised in `WWW-Authenticate` challenges.
pub const AUTH_REALM: &str = "Basic realm=\"Glance Config Editor\"";

/// Application-level errors.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Authentication required")]
    Unauthorized,

    #[error("Invalid username or password")]
    InvalidCredentials,

    #[error("Invalid JSON: {0}")]
    JsonError(String),

    #[error(transparent)]
    Editor(#[from] EditorError),
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::JsonError(rejection.body_text())
    }
}

impl ApiError {
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            ApiError::Unauthorized => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED"),
            ApiError::InvalidCredentials => (StatusCode::UNAUTHORIZED, "INVALID_CREDENTIALS"),
            ApiError::JsonError(_) => (StatusCode::BAD_REQUEST, "INVALID_JSON"),
            ApiError::Editor(e) => {
                let code = editor_code(e);
                let status = if e.is_remote() {
                    StatusCode::BAD_GATEWAY
                } else {
                    match e {
                        EditorError::EmptyDocument
                        | EditorError::SyntaxError(_)
                        | EditorError::InvalidIdentifier(_)
                        | EditorError::SettingsIncomplete(_)
                        | EditorError::SyncDisabled => StatusCode::BAD_REQUEST,
                        EditorError::NotFound(_) => StatusCode::NOT_FOUND,
                        _ => StatusCode::INTERNAL_SERVER_ERROR,
                    }
                };
                (status, code)
            }
        }
    }
}

fn editor_code(e: &EditorError) -> &'static str {
    match e {
        EditorError::EmptyDocument => "EMPTY_DOCUMENT",
        EditorError::SyntaxError(_) => "SYNTAX_ERROR",
        EditorError::InvalidIdentifier(_) => "INVALID_IDENTIFIER",
        EditorError::SettingsIncomplete(_) => "SETTINGS_INCOMPLETE",
        EditorError::SyncDisabled => "SYNC_DISABLED",
        EditorError::NotFound(_) => "NOT_FOUND",
        EditorError::RemoteAuthFailed(_) => "REMOTE_AUTH_FAILED",
        EditorError::RemoteNotFound(_) => "REMOTE_NOT_FOUND",
        EditorError::RemoteConflict(_) => "REMOTE_CONFLICT",
        EditorError::RemoteRejected(_) => "REMOTE_REJECTED",
        EditorError::RemoteTransportError(_) => "REMOTE_TRANSPORT_ERROR",
        EditorError::WriteFailed(_) => "WRITE_FAILED",
        EditorError::Io(_) => "IO_ERROR",
        EditorError::Serialization(_) => "SERIALIZATION_ERROR",
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        #[derive(Serialize)]
        struct ErrorBody {
            success: bool,
            error: String,
            code: &'static str,
        }

        let (status, code) = self.status_and_code();
        let body = ErrorBody {
            success: false,
            error: self.to_string(),
            code,
        };

        let mut response = (status, axum::Json(body)).into_response();
        if status == StatusCode::UNAUTHORIZED {
            response.headers_mut().insert(
                header::WWW_AUTHENTICATE,
                header::HeaderValue::from_static(AUTH_REALM),
            );
        }
        response
    }
}

pub type Result<T> = std::result::Result<T, ApiError>;
