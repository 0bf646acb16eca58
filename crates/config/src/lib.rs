//! Configuration loading, validation, and management for ContextRank.
//!
//! Loads configuration from `~/.contextrank/config.toml` with environment
//! variable overrides. Validates all settings at startup.
//!
//! The ranking thresholds and windows are not configurable; they live as
//! constants next to the decision table.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.contextrank/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Conversation store behaviour
    #[serde(default)]
    pub store: StoreConfig,

    /// Classifier adapter settings
    #[serde(default)]
    pub classifier: ClassifierConfig,

    /// Context window assembly
    #[serde(default)]
    pub window: WindowConfig,

    /// Log output
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Make every appended user message the current instruction.
    #[serde(default = "default_true")]
    pub promote_user_messages: bool,

    /// Capacity of the store event bus.
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,

    /// Text of the synthetic notice that reseeds a cleared project.
    #[serde(default = "default_clear_notice")]
    pub clear_notice: String,
}

fn default_true() -> bool {
    true
}
fn default_event_capacity() -> usize {
    256
}
fn default_clear_notice() -> String {
    "Conversation history cleared.".into()
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            promote_user_messages: true,
            event_capacity: default_event_capacity(),
            clear_notice: default_clear_notice(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifierConfig {
    /// Maximum memoized classifier answers per kind.
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,
}

fn default_cache_capacity() -> usize {
    1024
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            cache_capacity: default_cache_capacity(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WindowConfig {
    /// Token budget for the conversation part of a prompt.
    #[serde(default = "default_token_budget")]
    pub token_budget: usize,

    /// Include `background_context` messages when budget allows.
    #[serde(default)]
    pub include_background: bool,

    /// Skip resolved messages sitting at the `low` tier.
    #[serde(default = "default_true")]
    pub drop_resolved_low: bool,
}

fn default_token_budget() -> usize {
    4096
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            token_budget: default_token_budget(),
            include_background: false,
            drop_resolved_low: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// `tracing_subscriber::EnvFilter` directive used when `RUST_LOG` is unset.
    #[serde(default = "default_log_filter")]
    pub filter: String,

    /// Emit JSON lines instead of human-readable output.
    #[serde(default)]
    pub json: bool,
}

fn default_log_filter() -> String {
    "info".into()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: default_log_filter(),
            json: false,
        }
    }
}

impl AppConfig {
    /// Load configuration from the default location.
    ///
    /// Falls back to defaults if the file doesn't exist.
    /// Environment variables override file values.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&path)?;
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Apply `CONTEXTRANK_*` environment overrides.
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Ok(filter) = std::env::var("CONTEXTRANK_LOG") {
            self.logging.filter = filter;
        }

        if let Ok(raw) = std::env::var("CONTEXTRANK_PROMOTE_USER_MESSAGES") {
            self.store.promote_user_messages = parse_bool(&raw).ok_or_else(|| {
                ConfigError::ValidationError(format!(
                    "CONTEXTRANK_PROMOTE_USER_MESSAGES must be true or false, got '{raw}'"
                ))
            })?;
        }

        Ok(())
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".contextrank")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.store.event_capacity == 0 {
            return Err(ConfigError::ValidationError(
                "store.event_capacity must be > 0".into(),
            ));
        }

        if self.store.clear_notice.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "store.clear_notice must not be empty".into(),
            ));
        }

        if self.classifier.cache_capacity == 0 {
            return Err(ConfigError::ValidationError(
                "classifier.cache_capacity must be > 0".into(),
            ));
        }

        if self.window.token_budget == 0 {
            return Err(ConfigError::ValidationError(
                "window.token_budget must be > 0".into(),
            ));
        }

        Ok(())
    }

    /// Generate a default config TOML string.
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

impl From<ConfigError> for contextrank_core::Error {
    fn from(err: ConfigError) -> Self {
        contextrank_core::Error::Config {
            message: err.to_string(),
        }
    }
}
