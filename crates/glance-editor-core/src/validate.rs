use crate::error::EditorError;

/// Syntactic check applied to every candidate document before it is written.
pub trait Validator: Send + Sync {
    /// Returns `Ok(())` when `text` is an acceptable document.
    fn validate(&self, text: &str) -> Result<(), EditorError>;
}

/// Accepts any text that parses as a single YAML document.
///
/// Duplicate keys in a mapping are rejected, since Glance refuses to load a
/// configuration that repeats a key.
#[derive(Debug, Clone, Copy, Default)]
pub struct YamlValidator;

impl Validator for YamlValidator {
    fn validate(&self, text: &str) -> Result<(), EditorError> {
        if text.trim().is_empty() {
            return Err(EditorError::EmptyDocument);
        }

        serde_yaml::from_str::<serde_yaml::Value>(text)
            .map(|_| ())
            .map_err(|e| EditorError::SyntaxError(e.to_string()))
    }
}
