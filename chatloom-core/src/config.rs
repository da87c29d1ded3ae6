//! Configuration loading and management
//!
//! Configuration is loaded from `~/.config/chatloom/config.toml`
//!
//! This module follows the XDG Base Directory Specification:
//! - Config: `$XDG_CONFIG_HOME/chatloom/` (~/.config/chatloom/)
//! - Data: `$XDG_DATA_HOME/chatloom/` (~/.local/share/chatloom/)
//! - State/Logs: `$XDG_STATE_HOME/chatloom/` (~/.local/state/chatloom/)

use crate::error::{Error, Result};
use serde::Deserialize;
use std::path::PathBuf;

/// Returns a best-effort home directory path.
fn home_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Returns XDG_CONFIG_HOME or ~/.config
fn xdg_config_home() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".config"))
}

/// Returns XDG_DATA_HOME or ~/.local/share
fn xdg_data_home() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".local/share"))
}

/// Returns XDG_STATE_HOME or ~/.local/state
fn xdg_state_home() -> PathBuf {
    std::env::var("XDG_STATE_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".local/state"))
}

/// Main configuration struct
#[derive(Debug, Deserialize, Default)]
pub struct Config {
    /// Storage paths and attachment link configuration
    #[serde(default)]
    pub storage: StorageConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Agent session registry configuration
    #[serde(default)]
    pub session: SessionConfig,
}

/// Storage configuration: where the database and attachment payloads live,
/// and how attachment preview links are built.
#[derive(Debug, Deserialize, Default)]
pub struct StorageConfig {
    /// Override path for the SQLite database file
    pub db_path: Option<PathBuf>,

    /// Override path for the attachment root directory
    pub attachments_dir: Option<PathBuf>,

    /// Public base URL for attachment preview links.
    /// When absent, previews resolve to local `file://` references.
    pub public_base_url: Option<String>,
}

impl StorageConfig {
    /// Resolved database path (override or XDG default)
    pub fn database_path(&self) -> PathBuf {
        self.db_path
            .clone()
            .unwrap_or_else(Config::default_database_path)
    }

    /// Resolved attachment root directory (override or XDG default)
    pub fn attachments_dir(&self) -> PathBuf {
        self.attachments_dir
            .clone()
            .unwrap_or_else(Config::default_attachments_dir)
    }
}

/// Logging configuration
#[derive(Debug, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Maximum number of log files to keep
    #[serde(default = "default_max_log_files")]
    pub max_files: usize,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            max_files: default_max_log_files(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_max_log_files() -> usize {
    5
}

/// Agent session registry configuration
#[derive(Debug, Deserialize)]
pub struct SessionConfig {
    /// Seconds of inactivity before a thread's agent session handle is evicted
    #[serde(default = "default_session_ttl_secs")]
    pub ttl_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_session_ttl_secs(),
        }
    }
}

fn default_session_ttl_secs() -> u64 {
    3600
}

impl Config {
    /// Load configuration from the default path
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();

        if !config_path.exists() {
            tracing::info!("No config file found at {:?}, using defaults", config_path);
            return Ok(Config::default());
        }

        Self::load_from(&config_path)
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &PathBuf) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read config file {:?}: {}", path, e)))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("failed to parse config: {}", e)))?;

        Ok(config)
    }

    /// Returns the default config file path
    ///
    /// `$XDG_CONFIG_HOME/chatloom/config.toml` (~/.config/chatloom/config.toml)
    pub fn config_path() -> PathBuf {
        xdg_config_home().join("chatloom").join("config.toml")
    }

    /// Returns the data directory path (for the database and attachments)
    ///
    /// `$XDG_DATA_HOME/chatloom/` (~/.local/share/chatloom/)
    pub fn data_dir() -> PathBuf {
        xdg_data_home().join("chatloom")
    }

    /// Returns the state directory path (for logs)
    ///
    /// `$XDG_STATE_HOME/chatloom/` (~/.local/state/chatloom/)
    pub fn state_dir() -> PathBuf {
        xdg_state_home().join("chatloom")
    }

    /// Returns the default database file path
    ///
    /// `$XDG_DATA_HOME/chatloom/chatloom.db`
    pub fn default_database_path() -> PathBuf {
        Self::data_dir().join("chatloom.db")
    }

    /// Returns the default attachment root directory
    ///
    /// `$XDG_DATA_HOME/chatloom/attachments/`
    pub fn default_attachments_dir() -> PathBuf {
        Self::data_dir().join("attachments")
    }

    /// Returns the log file path
    ///
    /// `$XDG_STATE_HOME/chatloom/chatloom.log`
    pub fn log_path() -> PathBuf {
        Self::state_dir().join("chatloom.log")
    }

    /// Ensure XDG base directory environment variables are set.
    ///
    /// This is mainly for CLI binaries that want explicit, stable path behavior
    /// before invoking other components that read these env vars.
    pub fn ensure_xdg_env() {
        let home = home_dir();

        if std::env::var("XDG_DATA_HOME").is_err() {
            std::env::set_var("XDG_DATA_HOME", home.join(".local/share"));
        }

        if std::env::var("XDG_STATE_HOME").is_err() {
            std::env::set_var("XDG_STATE_HOME", home.join(".local/state"));
        }

        if std::env::var("XDG_CONFIG_HOME").is_err() {
            std::env::set_var("XDG_CONFIG_HOME", home.join(".config"));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.storage.db_path.is_none());
        assert!(config.storage.public_base_url.is_none());
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.session.ttl_secs, 3600);
    }

    #[test]
    fn test_parse_config() {
        let toml = r#"
[storage]
db_path = "/tmp/chatloom-test/store.db"
attachments_dir = "/tmp/chatloom-test/attachments"
public_base_url = "https://files.example.com/attachments"

[logging]
level = "debug"

[session]
ttl_secs = 600
"#;
        let config: Config = toml::from_str(toml).unwrap();

        assert_eq!(
            config.storage.database_path(),
            PathBuf::from("/tmp/chatloom-test/store.db")
        );
        assert_eq!(
            config.storage.attachments_dir(),
            PathBuf::from("/tmp/chatloom-test/attachments")
        );
        assert_eq!(
            config.storage.public_base_url.as_deref(),
            Some("https://files.example.com/attachments")
        );
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.session.ttl_secs, 600);
    }

    #[test]
    fn test_storage_defaults_resolve_under_data_dir() {
        let storage = StorageConfig::default();
        assert!(storage.database_path().ends_with("chatloom/chatloom.db"));
        assert!(storage.attachments_dir().ends_with("chatloom/attachments"));
    }
}
