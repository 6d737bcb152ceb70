//! Configuration file parser for ~/.config/gator/config.toml.
//!
//! The config file is optional: a missing file yields `Config::default()`.
//! Unknown keys are ignored by serde, though we log a warning when the file
//! contains potential typos.
use serde::Deserialize;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Environment variable that overrides `database_path`.
pub const DATABASE_ENV_VAR: &str = "GATOR_DB";

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML in config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Config file too large: {0}")]
    TooLarge(String),

    #[error("Invalid config value for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

// ============================================================================
// Configuration Structs
// ============================================================================

/// Top-level application configuration.
///
/// All fields use `#[serde(default)]` so any subset of keys can be specified.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Config {
    /// SQLite database file. Defaults to `gator.db` in the config directory.
    pub database_path: Option<PathBuf>,

    /// Timeout for one feed fetch, covering connect, headers and body.
    pub fetch_timeout_secs: u64,

    /// `User-Agent` header sent with every feed request.
    pub user_agent: String,

    /// Largest response body accepted from a feed.
    pub max_feed_bytes: usize,

    /// Let `addfeed` accept loopback and private-network URLs.
    pub allow_private_hosts: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_path: None,
            fetch_timeout_secs: 10,
            user_agent: "gator".to_string(),
            max_feed_bytes: 10 * 1024 * 1024,
            allow_private_hosts: false,
        }
    }
}

impl Config {
    /// Maximum config file size (1 MB).
    const MAX_FILE_SIZE: u64 = 1_048_576;

    const KNOWN_KEYS: [&'static str; 5] = [
        "database_path",
        "fetch_timeout_secs",
        "user_agent",
        "max_feed_bytes",
        "allow_private_hosts",
    ];

    /// Load configuration from a TOML file.
    ///
    /// - Missing file → `Ok(Config::default())`
    /// - Empty file → `Ok(Config::default())`
    /// - Invalid TOML → `Err(ConfigError::Parse)` with line number info
    /// - Unknown keys → accepted, logged as warning
    /// - Zero timeout or size limit, or blank user agent → `Err(ConfigError::Invalid)`
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        // Check size before reading so a corrupted file cannot exhaust memory
        match std::fs::metadata(path) {
            Ok(meta) if meta.len() > Self::MAX_FILE_SIZE => {
                return Err(ConfigError::TooLarge(format!(
                    "Config file is {} bytes (max {} bytes)",
                    meta.len(),
                    Self::MAX_FILE_SIZE
                )));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No config file found, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
            Ok(_) => {}
        }

        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                // File deleted between metadata and read
                tracing::debug!(path = %path.display(), "Config file disappeared, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
        };

        if content.trim().is_empty() {
            tracing::debug!(path = %path.display(), "Config file is empty, using defaults");
            return Ok(Self::default());
        }

        if let Ok(raw) = content.parse::<toml::Table>() {
            for key in raw.keys() {
                if !Self::KNOWN_KEYS.contains(&key.as_str()) {
                    tracing::warn!(key = %key, "Unknown key in config file, ignoring");
                }
            }
        }

        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        tracing::info!(
            path = %path.display(),
            timeout_secs = config.fetch_timeout_secs,
            user_agent = %config.user_agent,
            "Loaded configuration"
        );
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.fetch_timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                key: "fetch_timeout_secs",
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.max_feed_bytes == 0 {
            return Err(ConfigError::Invalid {
                key: "max_feed_bytes",
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.user_agent.trim().is_empty() {
            return Err(ConfigError::Invalid {
                key: "user_agent",
                reason: "must not be empty".to_string(),
            });
        }
        Ok(())
    }

    /// Database location: `$GATOR_DB`, then `database_path`, then
    /// `gator.db` inside `config_dir`.
    pub fn database_path(&self, config_dir: &Path) -> PathBuf {
        self.resolve_database_path(config_dir, std::env::var_os(DATABASE_ENV_VAR))
    }

    fn resolve_database_path(&self, config_dir: &Path, env: Option<OsString>) -> PathBuf {
        env.filter(|v| !v.is_empty())
            .map(PathBuf::from)
            .or_else(|| self.database_path.clone())
            .unwrap_or_else(|| config_dir.join("gator.db"))
    }
}

// ============================================================================
// Tests
// ============================================================================
