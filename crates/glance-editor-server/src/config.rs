use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

/// Configuration for the Glance config editor server.
#[derive(Parser, Debug, Clone)]
#[command(name = "glance-editor-server")]
#[command(about = "Web API for editing, backing up and syncing a Glance configuration")]
pub struct Config {
    /// Host to bind to
    #[arg(long, default_value = "0.0.0.0", env = "EDITOR_HOST")]
    pub host: String,

    /// Port to bind to
    #[arg(long, default_value = "5000", env = "EDITOR_PORT")]
    pub port: u16,

    /// Glance configuration file to edit
    #[arg(long, default_value = "/opt/glance/glance.yaml", env = "GLANCE_CONFIG_PATH")]
    pub config_path: PathBuf,

    /// Directory holding backups and the sync settings record
    #[arg(long, default_value = "./backups", env = "BACKUP_DIR")]
    pub backup_dir: PathBuf,

    /// Number of backups kept after each save
    #[arg(long, default_value = "20", env = "BACKUP_RETENTION")]
    pub backup_retention: usize,

    /// GitHub API root (change for GitHub Enterprise)
    #[arg(long, default_value = "https://api.github.com", env = "GITHUB_API_URL")]
    pub github_api_url: String,

    /// Timeout for GitHub API requests
    #[arg(long, default_value = "30", env = "REMOTE_TIMEOUT_SECS")]
    pub remote_timeout_secs: u64,

    /// Operator username
    #[arg(long, default_value = "admin", env = "EDITOR_USERNAME")]
    pub editor_username: String,

    /// Operator password
    #[arg(long, default_value = "admin", env = "EDITOR_PASSWORD", hide_env_values = true)]
    pub editor_password: String,
}

impl Config {
    pub fn remote_timeout(&self) -> Duration {
        Duration::from_secs(self.remote_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::parse_from(["glance-editor-server"]);
        assert_eq!(config.port, 5000);
        assert_eq!(config.config_path, PathBuf::from("/opt/glance/glance.yaml"));
        assert_eq!(config.backup_retention, 20);
        assert_eq!(config.remote_timeout(), Duration::from_secs(30));
        assert_eq!(config.editor_username, "admin");
    }

    #[test]
    fn test_flags_override_defaults() {
        let config = Config::parse_from([
            "glance-editor-server",
            "--port",
            "8081",
            "--backup-dir",
            "/var/lib/glance-editor",
            "--remote-timeout-secs",
            "5",
        ]);
        assert_eq!(config.port, 8081);
        assert_eq!(config.backup_dir, PathBuf::from("/var/lib/glance-editor"));
        assert_eq!(config.remote_timeout(), Duration::from_secs(5));
    }
}
