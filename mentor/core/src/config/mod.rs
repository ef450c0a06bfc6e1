//! TOML Configuration File Support
//!
//! Centralized configuration loading for the mentor chat, supporting a TOML
//! file at `~/.config/renovar/mentor.toml`.
//!
//! # Configuration Priority
//!
//! Values are applied in this order (later wins):
//! 1. Default values
//! 2. TOML configuration file
//! 3. Environment variables
//! 4. CLI arguments ([`ConfigOverrides`])
//!
//! # Example Configuration
//!
//! ```toml
//! [api]
//! base_url = "https://api.renovar.app"
//! request_timeout_secs = 60
//! connect_timeout_secs = 10
//!
//! [streaming]
//! enabled = true
//! chunked_body = true
//! event_push = true
//!
//! [history]
//! dir = "/var/lib/renovar"
//! namespace = "chat_history_v1"
//! welcome_message = "Hi! How can I help?"
//! ```

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::controller::ControllerConfig;
use crate::transport::TransportCapabilities;

/// Default API base URL
pub const DEFAULT_BASE_URL: &str = "http://localhost:3333";

/// Default history namespace
pub const DEFAULT_NAMESPACE: &str = "chat_history_v1";

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur when loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read config file
    #[error("Failed to read config file at {path}: {source}")]
    ReadError {
        /// The path that was attempted
        path: PathBuf,
        /// The underlying IO error
        source: std::io::Error,
    },

    /// Failed to parse TOML
    #[error("Failed to parse TOML config: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Invalid configuration value
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

// =============================================================================
// Configuration Source Tracking
// =============================================================================

/// Tracks where the configuration came from
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfigSource {
    /// Value from command-line argument
    Cli,
    /// Value from environment variable
    Env,
    /// Value from TOML configuration file
    File,
    /// Default value
    Default,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cli => write!(f, "CLI"),
            Self::Env => write!(f, "environment"),
            Self::File => write!(f, "config file"),
            Self::Default => write!(f, "default"),
        }
    }
}

// =============================================================================
// TOML Configuration Structures
// =============================================================================

/// API section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiToml {
    /// Backend base URL
    pub base_url: Option<String>,
    /// Timeout of the buffered call in seconds
    pub request_timeout_secs: Option<u64>,
    /// Connect timeout in seconds
    pub connect_timeout_secs: Option<u64>,
}

/// Streaming section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamingToml {
    /// Start new controllers in streaming mode
    pub enabled: Option<bool>,
    /// Chunked response bodies are available
    pub chunked_body: Option<bool>,
    /// Server-sent events are available
    pub event_push: Option<bool>,
}

/// History section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryToml {
    /// Directory holding the history file
    pub dir: Option<PathBuf>,
    /// Storage key of the history
    pub namespace: Option<String>,
    /// Seeded welcome message
    pub welcome_message: Option<String>,
}

/// Top-level TOML configuration structure
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MentorToml {
    /// API section
    pub api: ApiToml,
    /// Streaming section
    pub streaming: StreamingToml,
    /// History section
    pub history: HistoryToml,
}

// =============================================================================
// Main Configuration Struct
// =============================================================================

/// Backend connection settings
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ApiConfig {
    /// Base URL, without trailing slash
    pub base_url: String,
    /// Timeout of the buffered call
    pub request_timeout: Duration,
    /// Connect timeout
    pub connect_timeout: Duration,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            request_timeout: Duration::from_secs(60),
            connect_timeout: Duration::from_secs(10),
        }
    }
}

/// Streaming settings
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StreamingConfig {
    /// Initial value of the controller's `supports_stream` flag
    pub enabled: bool,
    /// Mechanisms available in this environment
    pub capabilities: TransportCapabilities,
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            capabilities: TransportCapabilities::default(),
        }
    }
}

/// History settings
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HistoryConfig {
    /// Directory of the history file; platform data dir when unset
    pub dir: Option<PathBuf>,
    /// Storage key
    pub namespace: String,
    /// Seeded welcome message
    pub welcome_message: String,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            dir: None,
            namespace: DEFAULT_NAMESPACE.to_string(),
            welcome_message: ControllerConfig::default().welcome_message,
        }
    }
}

/// Centralized configuration for the mentor chat
#[derive(Clone, Debug)]
pub struct MentorConfig {
    /// Backend connection
    pub api: ApiConfig,
    /// Streaming
    pub streaming: StreamingConfig,
    /// History persistence
    pub history: HistoryConfig,
    /// Path to the config file that was loaded (if any)
    pub config_file_path: Option<PathBuf>,
    /// Source of configuration values
    source: ConfigSource,
}

impl Default for MentorConfig {
    fn default() -> Self {
        Self {
            api: ApiConfig::default(),
            streaming: StreamingConfig::default(),
            history: HistoryConfig::default(),
            config_file_path: None,
            source: ConfigSource::Default,
        }
    }
}

impl MentorConfig {
    /// Create a new configuration with default values
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the primary source of this configuration
    #[must_use]
    pub fn source(&self) -> ConfigSource {
        self.source
    }

    /// Directory holding the history file
    ///
    /// Falls back to `<data dir>/renovar`, then to `./.renovar`.
    #[must_use]
    pub fn history_dir(&self) -> PathBuf {
        self.history.dir.clone().unwrap_or_else(|| {
            dirs::data_dir().map_or_else(|| PathBuf::from(".renovar"), |p| p.join("renovar"))
        })
    }

    /// Controller settings derived from this configuration
    #[must_use]
    pub fn controller_config(&self) -> ControllerConfig {
        ControllerConfig {
            welcome_message: self.history.welcome_message.clone(),
            streaming: self.streaming.enabled,
            ..ControllerConfig::default()
        }
    }

    /// Check values that would only fail later at request time
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ValidationError`] describing the first bad value.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let url = &self.api.base_url;
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(ConfigError::ValidationError(format!(
                "api.base_url must be an http(s) URL, got {url:?}"
            )));
        }
        if self.history.namespace.trim().is_empty()
            || self.history.namespace.contains(['/', '\\'])
        {
            return Err(ConfigError::ValidationError(format!(
                "history.namespace must be a plain file name, got {:?}",
                self.history.namespace
            )));
        }
        if self.api.request_timeout.is_zero() {
            return Err(ConfigError::ValidationError(
                "api.request_timeout_secs must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// CLI overrides, applied last
#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    /// Backend base URL
    pub base_url: Option<String>,
    /// Force streaming on or off
    pub streaming: Option<bool>,
    /// History directory
    pub history_dir: Option<PathBuf>,
}

impl ConfigOverrides {
    /// Apply the overrides to `config`
    ///
    /// # Errors
    ///
    /// Returns an error if the resulting configuration is invalid.
    pub fn apply(&self, config: &mut MentorConfig) -> Result<(), ConfigError> {
        if let Some(ref url) = self.base_url {
            config.api.base_url = normalize_url(url);
            config.source = ConfigSource::Cli;
        }
        if let Some(streaming) = self.streaming {
            config.streaming.enabled = streaming;
            config.source = ConfigSource::Cli;
        }
        if let Some(ref dir) = self.history_dir {
            config.history.dir = Some(dir.clone());
            config.source = ConfigSource::Cli;
        }
        config.validate()
    }
}

// =============================================================================
// Configuration Loading
// =============================================================================

/// Get the default configuration file path
///
/// Returns `$XDG_CONFIG_HOME/renovar/mentor.toml` or the platform equivalent.
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("renovar").join("mentor.toml"))
}

/// Load configuration from all sources with proper priority
///
/// # Errors
///
/// Returns an error if the config file exists but cannot be parsed, or the
/// result fails validation. A missing config file is not an error.
pub fn load_config() -> Result<MentorConfig, ConfigError> {
    load_config_from_path(default_config_path())
}

/// Load configuration from a specific path
///
/// # Errors
///
/// Returns an error if the specified config file cannot be read or parsed,
/// or the result fails validation.
pub fn load_config_from_path(path: Option<PathBuf>) -> Result<MentorConfig, ConfigError> {
    let mut config = MentorConfig::default();

    if let Some(ref config_path) = path {
        if config_path.exists() {
            let toml_content =
                std::fs::read_to_string(config_path).map_err(|e| ConfigError::ReadError {
                    path: config_path.clone(),
                    source: e,
                })?;

            let toml_config: MentorToml = toml::from_str(&toml_content)?;
            apply_toml_config(&mut config, &toml_config);
            config.config_file_path = Some(config_path.clone());
            config.source = ConfigSource::File;

            tracing::info!(
                path = %config_path.display(),
                "Loaded configuration from file"
            );
        } else {
            tracing::debug!(
                path = %config_path.display(),
                "Config file not found, using defaults"
            );
        }
    }

    apply_env_config(&mut config, |key| std::env::var(key).ok());

    config.validate()?;
    Ok(config)
}

/// Apply TOML configuration values to the config struct
fn apply_toml_config(config: &mut MentorConfig, toml: &MentorToml) {
    if let Some(ref url) = toml.api.base_url {
        config.api.base_url = normalize_url(url);
    }
    if let Some(secs) = toml.api.request_timeout_secs {
        config.api.request_timeout = Duration::from_secs(secs);
    }
    if let Some(secs) = toml.api.connect_timeout_secs {
        config.api.connect_timeout = Duration::from_secs(secs);
    }

    if let Some(enabled) = toml.streaming.enabled {
        config.streaming.enabled = enabled;
    }
    if let Some(chunked) = toml.streaming.chunked_body {
        config.streaming.capabilities.chunked_body = chunked;
    }
    if let Some(push) = toml.streaming.event_push {
        config.streaming.capabilities.event_push = push;
    }

    if toml.history.dir.is_some() {
        config.history.dir.clone_from(&toml.history.dir);
    }
    if let Some(ref namespace) = toml.history.namespace {
        config.history.namespace.clone_from(namespace);
    }
    if let Some(ref welcome) = toml.history.welcome_message {
        config.history.welcome_message.clone_from(welcome);
    }
}

/// Apply environment variable overrides to the config
///
/// `lookup` resolves a variable name; production passes `std::env::var`.
fn apply_env_config(config: &mut MentorConfig, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(url) = lookup("RENOVAR_API_URL").or_else(|| lookup("API_URL")) {
        config.api.base_url = normalize_url(&url);
        config.source = ConfigSource::Env;
    }
    if let Some(secs) = lookup("RENOVAR_REQUEST_TIMEOUT_SECS").and_then(|v| v.parse().ok()) {
        config.api.request_timeout = Duration::from_secs(secs);
        config.source = ConfigSource::Env;
    }
    if let Some(enabled) = lookup("RENOVAR_STREAMING") {
        config.streaming.enabled = parse_flag(&enabled);
        config.source = ConfigSource::Env;
    }
    if let Some(chunked) = lookup("RENOVAR_CHUNKED_STREAM") {
        config.streaming.capabilities.chunked_body = parse_flag(&chunked);
        config.source = ConfigSource::Env;
    }
    if let Some(push) = lookup("RENOVAR_EVENT_STREAM") {
        config.streaming.capabilities.event_push = parse_flag(&push);
        config.source = ConfigSource::Env;
    }
    if let Some(dir) = lookup("RENOVAR_HISTORY_DIR") {
        config.history.dir = Some(PathBuf::from(dir));
        config.source = ConfigSource::Env;
    }
}

fn parse_flag(value: &str) -> bool {
    value != "0" && !value.eq_ignore_ascii_case("false")
}

fn normalize_url(url: &str) -> String {
    url.trim().trim_end_matches('/').to_string()
}
