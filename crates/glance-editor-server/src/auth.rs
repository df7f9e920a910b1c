//! Operator authentication via HTTP Basic credentials.
//!
//! The configured password is only kept as a SHA-256 digest. Every request under
//! `/api` must carry matching credentials; the authenticated [`Operator`] is
//! attached to the request for handlers to log.

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::header;
use axum::middleware::Next;
use axum::response::Response;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use tracing::{debug, warn};

use crate::error::{ApiError, Result};

/// The authenticated caller of a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Operator {
    pub username: String,
}

/// Configured operator login.
pub struct OperatorCredentials {
    username: String,
    password_digest: String,
}

impl std::fmt::Debug for OperatorCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OperatorCredentials")
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

impl OperatorCredentials {
    pub fn new(username: impl Into<String>, password: &str) -> Self {
        Self {
            username: username.into(),
            password_digest: hash_password(password),
        }
    }

    pub fn verify(&self, username: &str, password: &str) -> bool {
        let digest = hash_password(password);
        let user_ok = username.as_bytes().ct_eq(self.username.as_bytes());
        let password_ok = digest.as_bytes().ct_eq(self.password_digest.as_bytes());
        (user_ok & password_ok).into()
    }
}

/// Shared credentials wrapped in Arc.
pub type SharedCredentials = Arc<OperatorCredentials>;

fn hash_password(password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(password.as_bytes());
    hex::encode(hasher.finalize())
}

/// Extract `(username, password)` from a Basic Authorization header.
fn extract_basic_credentials(req: &Request) -> Option<(String, String)> {
    let encoded = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Basic "))?;

    let decoded = STANDARD.decode(encoded.trim()).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (username, password) = decoded.split_once(':')?;
    Some((username.to_string(), password.to_string()))
}

/// Middleware rejecting requests without valid operator credentials.
pub async fn require_operator(
    State(credentials): State<SharedCredentials>,
    mut req: Request,
    next: Next,
) -> Result<Response> {
    let (username, password) = extract_basic_credentials(&req).ok_or(ApiError::Unauthorized)?;

    if !credentials.verify(&username, &password) {
        warn!("Rejected login for {:?}", username);
        return Err(ApiError::InvalidCredentials);
    }

    debug!("Authenticated operator {}", username);
    req.extensions_mut().insert(Operator { username });
    Ok(next.run(req).await)
}
