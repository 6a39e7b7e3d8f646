//! Configuration management for devicelog

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::context::Environment;
use crate::logging::{LogLevel, RetentionPolicy, Sink};

/// Environment variable that overrides the configured environment tag
pub const ENVIRONMENT_VAR: &str = "DEVICELOG_ENV";

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Environment tag: "development", "staging" or "production"
    #[serde(default = "default_environment")]
    pub environment: String,

    /// Application-private document root holding log files and the key-value file
    pub documents_dir: PathBuf,

    /// Timeout applied to every file and key-value store operation (default: 5000ms)
    #[serde(default = "default_store_timeout_ms")]
    pub store_timeout_ms: u64,

    /// App version stamped on every record
    #[serde(default)]
    pub app_version: Option<String>,

    /// Device descriptor stamped on every record
    #[serde(default)]
    pub device_info: Option<String>,

    /// Overrides on top of the environment's retention profile
    #[serde(default)]
    pub policy: PolicyOverrides,
}

/// Optional overrides for the resolved retention policy
///
/// Zero sizes are ignored so the resolved policy keeps positive limits.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PolicyOverrides {
    #[serde(default)]
    pub max_file_bytes: Option<u64>,
    #[serde(default)]
    pub max_buffer_entries: Option<usize>,
    #[serde(default)]
    pub retention_days: Option<u64>,
    #[serde(default)]
    pub file_name_prefix: Option<String>,
    #[serde(default)]
    pub enabled_levels: Option<BTreeSet<LogLevel>>,
    #[serde(default)]
    pub enabled_sinks: Option<BTreeSet<Sink>>,
}

fn default_environment() -> String {
    Environment::Development.as_str().to_string()
}

fn default_store_timeout_ms() -> u64 {
    5_000
}

impl Default for Config {
    fn default() -> Self {
        Self {
            environment: default_environment(),
            documents_dir: config_dir().join("documents"),
            store_timeout_ms: default_store_timeout_ms(),
            app_version: Some(env!("CARGO_PKG_VERSION").to_string()),
            device_info: None,
            policy: PolicyOverrides::default(),
        }
    }
}

impl Config {
    /// Load configuration from file, or return default if not found
    ///
    /// `DEVICELOG_ENV` takes precedence over the file's environment tag.
    pub fn load() -> Result<Self> {
        let mut config = Self::load_from(&config_file_path())?;

        if let Ok(tag) = std::env::var(ENVIRONMENT_VAR) {
            config.environment = tag;
        }

        Ok(config)
    }

    /// Load configuration from a specific file, or return default if it does not exist
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path).context("Failed to read config file")?;
        toml::from_str(&content).context("Failed to parse config file")
    }

    /// Save configuration to file
    pub fn save(&self) -> Result<()> {
        self.save_to(&config_file_path())
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(path, content).context("Failed to write config file")?;
        Ok(())
    }

    /// Resolved environment (unknown tags fall back to development)
    pub fn environment(&self) -> Environment {
        Environment::from_tag(&self.environment)
    }

    /// Store operation timeout
    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms)
    }

    /// Resolve the retention policy: environment profile plus overrides
    pub fn resolve_policy(&self) -> RetentionPolicy {
        let mut policy = RetentionPolicy::for_environment(self.environment());
        let overrides = &self.policy;

        if let Some(bytes) = overrides.max_file_bytes.filter(|b| *b > 0) {
            policy.max_file_bytes = bytes;
        }
        if let Some(entries) = overrides.max_buffer_entries.filter(|e| *e > 0) {
            policy.max_buffer_entries = entries;
        }
        if let Some(days) = overrides.retention_days.filter(|d| *d > 0) {
            policy.retention = Duration::from_secs(days * 24 * 60 * 60);
        }
        if let Some(prefix) = &overrides.file_name_prefix {
            policy.file_name_prefix = prefix.clone();
        }
        if let Some(levels) = &overrides.enabled_levels {
            policy.enabled_levels = levels.clone();
        }
        if let Some(sinks) = &overrides.enabled_sinks {
            policy.enabled_sinks = sinks.clone();
        }

        policy
    }

    /// Path of the key-value store file inside the document root
    pub fn kv_store_path(&self) -> PathBuf {
        self.documents_dir.join(KV_STORE_FILE)
    }
}

const KV_STORE_FILE: &str = "devicelog_store.json";

/// Get the base configuration directory (~/.devicelog)
/// Falls back to ./.devicelog if home directory cannot be determined
pub fn config_dir() -> PathBuf {
    try_config_dir().unwrap_or_else(|| PathBuf::from(".devicelog"))
}

/// Try to get the base configuration directory, returning None if home dir is unavailable
pub fn try_config_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|h| h.join(".devicelog"))
}

/// Get the path to the config file
pub fn config_file_path() -> PathBuf {
    config_dir().join("config.toml")
}

/// Ensure the config directory and the configured document root exist
pub fn ensure_directories(config: &Config) -> Result<()> {
    std::fs::create_dir_all(config_dir()).context("Failed to create config directory")?;

    std::fs::create_dir_all(&config.documents_dir)
        .context("Failed to create documents directory")?;

    Ok(())
}
