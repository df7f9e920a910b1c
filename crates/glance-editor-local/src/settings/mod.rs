mod json;

pub use json::{JsonSettingsStore, SETTINGS_FILE};
