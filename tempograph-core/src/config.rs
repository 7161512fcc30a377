//! Configuration loading and management
//!
//! Configuration lives at `~/.config/tempograph/config.toml`; a missing
//! file means defaults. Paths follow the XDG Base Directory Specification:
//! - Config: `$XDG_CONFIG_HOME/tempograph/` (~/.config/tempograph/)
//! - Data: `$XDG_DATA_HOME/tempograph/` (~/.local/share/tempograph/)
//! - State/logs: `$XDG_STATE_HOME/tempograph/` (~/.local/state/tempograph/)

use crate::error::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

fn home_dir() -> PathBuf {
    dirs::home_dir()
        .or_else(|| std::env::var_os("HOME").map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from("."))
}

// XDG base directory from the environment, with the conventional fallback
// under $HOME
fn xdg_dir(var: &str, fallback: &str) -> PathBuf {
    match std::env::var_os(var) {
        Some(dir) => PathBuf::from(dir),
        None => home_dir().join(fallback),
    }
}

/// Top-level configuration, one section per concern
#[derive(Debug, Deserialize, Default)]
pub struct Config {
    /// Session tracking and retention knobs
    #[serde(default)]
    pub tracking: TrackingConfig,

    /// Storage location overrides
    #[serde(default)]
    pub storage: StorageConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Session tracking and retention knobs
#[derive(Debug, Deserialize, Clone)]
pub struct TrackingConfig {
    /// Days of daily statistics retained in the aggregate
    #[serde(default = "default_max_history_days")]
    pub max_history_days: u32,

    /// Seconds between periodic session activity folds
    #[serde(default = "default_tick_interval")]
    pub tick_interval_secs: u64,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            max_history_days: default_max_history_days(),
            tick_interval_secs: default_tick_interval(),
        }
    }
}

impl TrackingConfig {
    /// Reject windows and intervals that would disable tracking outright
    pub fn validate(&self) -> Result<()> {
        if self.max_history_days == 0 {
            return Err(Error::Config(
                "tracking.max_history_days must be at least 1".to_string(),
            ));
        }
        if self.tick_interval_secs == 0 {
            return Err(Error::Config(
                "tracking.tick_interval_secs must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

fn default_max_history_days() -> u32 {
    30
}

fn default_tick_interval() -> u64 {
    30
}

/// Storage location overrides
#[derive(Debug, Deserialize, Default, Clone)]
pub struct StorageConfig {
    /// Override directory for the analytics database
    pub data_dir: Option<PathBuf>,
}

/// Logging configuration
#[derive(Debug, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// Load configuration from the default path, or defaults when the file
    /// is absent
    pub fn load() -> Result<Self> {
        let path = Self::config_path();
        if !path.exists() {
            tracing::info!(path = %path.display(), "no config file, using defaults");
            return Ok(Config::default());
        }
        Self::load_from(&path)
    }

    /// Load and validate configuration from `path`
    pub fn load_from(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("cannot read {}: {}", path.display(), e)))?;
        let config: Config = toml::from_str(&raw)
            .map_err(|e| Error::Config(format!("cannot parse {}: {}", path.display(), e)))?;
        config.tracking.validate()?;
        Ok(config)
    }

    /// `$XDG_CONFIG_HOME/tempograph/config.toml`
    pub fn config_path() -> PathBuf {
        xdg_dir("XDG_CONFIG_HOME", ".config").join("tempograph/config.toml")
    }

    /// Directory holding the analytics database, `$XDG_DATA_HOME/tempograph/`
    pub fn data_dir() -> PathBuf {
        xdg_dir("XDG_DATA_HOME", ".local/share").join("tempograph")
    }

    /// Directory holding logs, `$XDG_STATE_HOME/tempograph/`
    pub fn state_dir() -> PathBuf {
        xdg_dir("XDG_STATE_HOME", ".local/state").join("tempograph")
    }

    /// The analytics database file, honoring the `storage.data_dir` override
    pub fn database_path(&self) -> PathBuf {
        self.storage
            .data_dir
            .clone()
            .unwrap_or_else(Self::data_dir)
            .join("analytics.db")
    }

    /// The current log file, `$XDG_STATE_HOME/tempograph/tempograph.log`
    pub fn log_path() -> PathBuf {
        Self::state_dir().join("tempograph.log")
    }

    /// Ensure the XDG base directory variables are set so every component
    /// resolves the same paths
    pub fn ensure_xdg_env() {
        let home = home_dir();
        for (var, fallback) in [
            ("XDG_CONFIG_HOME", ".config"),
            ("XDG_DATA_HOME", ".local/share"),
            ("XDG_STATE_HOME", ".local/state"),
        ] {
            if std::env::var_os(var).is_none() {
                std::env::set_var(var, home.join(fallback));
            }
        }
    }
}
