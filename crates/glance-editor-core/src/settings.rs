use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::EditorError;

/// Placeholder shown instead of a stored token. Sending it back means "keep the token".
pub const MASKED_TOKEN: &str = "***";

/// Commit message used when none is configured.
pub const DEFAULT_COMMIT_MESSAGE: &str = "Update glance configuration";

/// Remote sync configuration, persisted as a single flat record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncSettings {
    /// Push accepted revisions to the remote repository
    #[serde(default)]
    pub enabled: bool,
    /// Opaque API token
    #[serde(default)]
    pub token: String,
    /// Repository as `owner/name`
    #[serde(default, alias = "repository")]
    pub repo: String,
    /// Target branch
    #[serde(default)]
    pub branch: String,
    /// File path inside the repository
    #[serde(default)]
    pub path: String,
    /// Commit message for pushes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commit_message: Option<String>,
}

impl SyncSettings {
    /// The configured commit message, or the default one.
    pub fn commit_message(&self) -> &str {
        self.commit_message
            .as_deref()
            .filter(|m| !m.trim().is_empty())
            .unwrap_or(DEFAULT_COMMIT_MESSAGE)
    }

    /// Copy safe to hand to a client: the token is replaced by the placeholder.
    pub fn masked(&self) -> Self {
        let mut safe = self.clone();
        safe.token = if self.token.is_empty() {
            String::new()
        } else {
            MASKED_TOKEN.to_string()
        };
        safe
    }

    /// First required field that is empty, in the order token, repo, branch, path.
    pub fn missing_field(&self) -> Option<&'static str> {
        [
            ("token", &self.token),
            ("repo", &self.repo),
            ("branch", &self.branch),
            ("path", &self.path),
        ]
        .into_iter()
        .find(|(_, value)| value.trim().is_empty())
        .map(|(name, _)| name)
    }

    /// Required fields only matter while sync is enabled.
    pub fn validate(&self) -> Result<(), EditorError> {
        if !self.enabled {
            return Ok(());
        }
        match self.missing_field() {
            Some(field) => Err(EditorError::SettingsIncomplete(field.to_string())),
            None => Ok(()),
        }
    }

    /// Merge a partial update into this record.
    ///
    /// Omitted fields keep their value. A token that is omitted or equal to
    /// [`MASKED_TOKEN`] keeps the stored token.
    pub fn merged(&self, update: SyncSettingsUpdate) -> Self {
        let token = match update.token {
            Some(token) if token != MASKED_TOKEN => token,
            _ => self.token.clone(),
        };

        Self {
            enabled: update.enabled.unwrap_or(self.enabled),
            token,
            repo: update.repo.unwrap_or_else(|| self.repo.clone()),
            branch: update.branch.unwrap_or_else(|| self.branch.clone()),
            path: update.path.unwrap_or_else(|| self.path.clone()),
            commit_message: match update.commit_message {
                Some(message) if message.trim().is_empty() => None,
                Some(message) => Some(message),
                None => self.commit_message.clone(),
            },
        }
    }
}

/// Partial settings update as received from a client.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncSettingsUpdate {
    #[serde(default)]
    pub enabled: Option<bool>,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default, alias = "repository")]
    pub repo: Option<String>,
    #[serde(default)]
    pub branch: Option<String>,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub commit_message: Option<String>,
}

/// Persistence for the remote sync settings record.
#[async_trait]
pub trait SettingsStore: Send + Sync {
    /// Load the stored settings, or the default record if none exist.
    async fn load(&self) -> Result<SyncSettings, EditorError>;

    /// Merge `update` into the stored record, validate, persist and return the result.
    async fn save(&self, update: SyncSettingsUpdate) -> Result<SyncSettings, EditorError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stored() -> SyncSettings {
        SyncSettings {
            enabled: true,
            token: "secret123".to_string(),
            repo: "a/b".to_string(),
            branch: "main".to_string(),
            path: "x.yaml".to_string(),
            commit_message: None,
        }
    }

    #[test]
    fn test_masked_token_keeps_stored_token() {
        let update = SyncSettingsUpdate {
            enabled: Some(true),
            token: Some(MASKED_TOKEN.to_string()),
            repo: Some("a/b".to_string()),
            branch: Some("main".to_string()),
            path: Some("x.yaml".to_string()),
            commit_message: None,
        };

        let merged = stored().merged(update);
        assert_eq!(merged.token, "secret123");
        assert!(merged.validate().is_ok());
    }

    #[test]
    fn test_omitted_fields_keep_previous_values() {
        let update = SyncSettingsUpdate {
            branch: Some("develop".to_string()),
            ..Default::default()
        };

        let merged = stored().merged(update);
        assert_eq!(merged.branch, "develop");
        assert_eq!(merged.token, "secret123");
        assert_eq!(merged.repo, "a/b");
        assert!(merged.enabled);
    }

    #[test]
    fn test_new_token_replaces_stored_token() {
        let update = SyncSettingsUpdate {
            token: Some("fresh".to_string()),
            ..Default::default()
        };
        assert_eq!(stored().merged(update).token, "fresh");
    }

    #[test]
    fn test_enabled_requires_fields() {
        let settings = SyncSettings {
            enabled: true,
            token: "t".to_string(),
            repo: "a/b".to_string(),
            ..Default::default()
        };
        assert_eq!(
            settings.validate(),
            Err(EditorError::SettingsIncomplete("branch".to_string()))
        );

        let disabled = SyncSettings::default();
        assert!(disabled.validate().is_ok());
    }

    #[test]
    fn test_masked_view() {
        assert_eq!(stored().masked().token, MASKED_TOKEN);
        assert_eq!(SyncSettings::default().masked().token, "");
    }

    #[test]
    fn test_commit_message_default() {
        let mut settings = stored();
        assert_eq!(settings.commit_message(), DEFAULT_COMMIT_MESSAGE);
        settings.commit_message = Some("Tweak widgets".to_string());
        assert_eq!(settings.commit_message(), "Tweak widgets");
    }

    #[test]
    fn test_record_uses_flat_keys() {
        let json = serde_json::to_value(stored()).unwrap();
        assert_eq!(json["repo"], "a/b");
        assert_eq!(json["enabled"], true);
        assert!(json.get("commit_message").is_none());

        let parsed: SyncSettings =
            serde_json::from_str(r#"{"enabled": false, "repository": "o/r"}"#).unwrap();
        assert_eq!(parsed.repo, "o/r");
        assert!(parsed.token.is_empty());
    }
}
