//! TOML Configuration File Support
//!
//! Centralized configuration loading for the tutor daemon, supporting a TOML
//! configuration file at `~/.config/ai-teacher/tutor.toml`.
//!
//! # Configuration Priority
//!
//! Configuration values are loaded with the following priority (highest first):
//! 1. CLI arguments (via [`ConfigOverrides`])
//! 2. Environment variables
//! 3. TOML configuration file
//! 4. Default values
//!
//! # XDG Base Directory Compliance
//!
//! - `$XDG_CONFIG_HOME/ai-teacher/tutor.toml` (typically `~/.config/ai-teacher/tutor.toml`)
//!
//! # Example Configuration
//!
//! ```toml
//! [server]
//! host = "0.0.0.0"
//! port = 3001
//! cors_permissive = true
//! shutdown_grace_secs = 10
//!
//! [stream]
//! idle_timeout_secs = 30
//! channel_capacity = 16
//! max_message_length = 32768
//! ```

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::session::{SessionConfig, DEFAULT_IDLE_TIMEOUT};

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

/// Tracks where a configuration value came from
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

/// Server section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerToml {
    /// Interface to bind
    pub host: Option<String>,

    /// Port to listen on
    pub port: Option<u16>,

    /// Whether to reflect any request origin in CORS headers
    pub cors_permissive: Option<bool>,

    /// Seconds to wait for open streams on shutdown
    pub shutdown_grace_secs: Option<u64>,
}

/// Stream section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamToml {
    /// Longest wait for the next fragment, in seconds
    pub idle_timeout_secs: Option<u64>,

    /// Frames buffered between session and connection
    pub channel_capacity: Option<usize>,

    /// Maximum prompt length in characters
    pub max_message_length: Option<usize>,
}

/// Top-level TOML configuration structure
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TutorToml {
    /// Server configuration section
    pub server: ServerToml,

    /// Stream configuration section
    pub stream: StreamToml,
}

// =============================================================================
// Main Configuration Struct
// =============================================================================

/// Centralized configuration for the tutor daemon
///
/// Use [`load_config`] to load configuration with proper priority handling.
#[derive(Clone, Debug)]
pub struct TutorConfig {
    /// Interface to bind
    pub host: String,

    /// Port to listen on
    pub port: u16,

    /// Reflect any request origin in CORS headers
    pub cors_permissive: bool,

    /// How long shutdown waits for open streams
    pub shutdown_grace: Duration,

    /// Longest wait for the next fragment before a session is cancelled
    pub idle_timeout: Duration,

    /// Frames buffered between session and connection
    pub channel_capacity: usize,

    /// Maximum prompt length in characters
    pub max_message_length: usize,

    /// Path to the config file that was loaded (if any)
    pub config_file_path: Option<PathBuf>,

    /// Source of configuration values
    source: ConfigSource,
}

impl Default for TutorConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3001,
            cors_permissive: true,
            shutdown_grace: Duration::from_secs(10),
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            channel_capacity: 16,
            max_message_length: 32_768,
            config_file_path: None,
            source: ConfigSource::Default,
        }
    }
}

impl TutorConfig {
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

    /// Set the configuration source
    pub fn set_source(&mut self, source: ConfigSource) {
        self.source = source;
    }

    /// Address to bind, as `host:port`
    #[must_use]
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Per-session settings derived from this configuration
    #[must_use]
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            idle_timeout: self.idle_timeout,
        }
    }

    /// Check that the values are usable
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationError` for an empty host, a zero idle
    /// timeout, a zero channel capacity or a zero message length.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.host.trim().is_empty() {
            return Err(ConfigError::ValidationError("host must not be empty".to_string()));
        }
        if self.idle_timeout.is_zero() {
            return Err(ConfigError::ValidationError(
                "idle_timeout_secs must be greater than zero".to_string(),
            ));
        }
        if self.channel_capacity == 0 {
            return Err(ConfigError::ValidationError(
                "channel_capacity must be greater than zero".to_string(),
            ));
        }
        if self.max_message_length == 0 {
            return Err(ConfigError::ValidationError(
                "max_message_length must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

// =============================================================================
// Configuration Loading
// =============================================================================

/// Get the default configuration file path
///
/// Returns `$XDG_CONFIG_HOME/ai-teacher/tutor.toml` or
/// `~/.config/ai-teacher/tutor.toml` if `XDG_CONFIG_HOME` is not set.
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("ai-teacher").join("tutor.toml"))
}

/// Load configuration from all sources with proper priority
///
/// CLI arguments are not handled here; apply [`ConfigOverrides`] after.
///
/// # Errors
///
/// Returns an error if the config file exists but cannot be parsed, or if
/// the merged values fail validation. A missing config file is not an error.
pub fn load_config() -> Result<TutorConfig, ConfigError> {
    load_config_from_path(default_config_path())
}

/// Load configuration from a specific path
///
/// # Arguments
///
/// * `path` - Optional path to the configuration file. If `None`, only defaults
///   and environment variables are used.
///
/// # Errors
///
/// Returns an error if the specified config file cannot be read or parsed,
/// or if the merged values fail validation.
pub fn load_config_from_path(path: Option<PathBuf>) -> Result<TutorConfig, ConfigError> {
    load_with_env(path, |key| std::env::var(key).ok())
}

fn load_with_env<E>(path: Option<PathBuf>, env: E) -> Result<TutorConfig, ConfigError>
where
    E: Fn(&str) -> Option<String>,
{
    let mut config = TutorConfig::default();

    if let Some(ref config_path) = path {
        if config_path.exists() {
            let toml_content =
                std::fs::read_to_string(config_path).map_err(|e| ConfigError::ReadError {
                    path: config_path.clone(),
                    source: e,
                })?;

            let toml_config: TutorToml = toml::from_str(&toml_content)?;
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

    // Environment overrides file values
    apply_env_config(&mut config, env);

    config.validate()?;
    Ok(config)
}

/// Apply TOML configuration values to the config struct
fn apply_toml_config(config: &mut TutorConfig, toml: &TutorToml) {
    // Server settings
    if let Some(ref host) = toml.server.host {
        config.host.clone_from(host);
    }
    if let Some(port) = toml.server.port {
        config.port = port;
    }
    if let Some(permissive) = toml.server.cors_permissive {
        config.cors_permissive = permissive;
    }
    if let Some(grace) = toml.server.shutdown_grace_secs {
        config.shutdown_grace = Duration::from_secs(grace);
    }

    // Stream settings
    if let Some(idle) = toml.stream.idle_timeout_secs {
        config.idle_timeout = Duration::from_secs(idle);
    }
    if let Some(capacity) = toml.stream.channel_capacity {
        config.channel_capacity = capacity;
    }
    if let Some(length) = toml.stream.max_message_length {
        config.max_message_length = length;
    }
}

/// Apply environment variable overrides to the config
///
/// Unparseable values are ignored with a warning.
fn apply_env_config<E>(config: &mut TutorConfig, env: E)
where
    E: Fn(&str) -> Option<String>,
{
    fn parsed<T: std::str::FromStr>(key: &str, raw: &str) -> Option<T> {
        let value = raw.trim().parse::<T>().ok();
        if value.is_none() {
            tracing::warn!(key, value = raw, "Ignoring unparseable environment value");
        }
        value
    }

    // Server settings from environment
    if let Some(host) = env("HOST") {
        if !host.trim().is_empty() {
            config.host = host;
            config.source = ConfigSource::Env;
        }
    }
    if let Some(port) = env("PORT").and_then(|raw| parsed::<u16>("PORT", &raw)) {
        config.port = port;
        config.source = ConfigSource::Env;
    }
    if let Some(grace) = env("TUTOR_SHUTDOWN_GRACE_SECS")
        .and_then(|raw| parsed::<u64>("TUTOR_SHUTDOWN_GRACE_SECS", &raw))
    {
        config.shutdown_grace = Duration::from_secs(grace);
        config.source = ConfigSource::Env;
    }

    // Stream settings from environment
    if let Some(idle) = env("TUTOR_IDLE_TIMEOUT_SECS")
        .and_then(|raw| parsed::<u64>("TUTOR_IDLE_TIMEOUT_SECS", &raw))
    {
        config.idle_timeout = Duration::from_secs(idle);
        config.source = ConfigSource::Env;
    }
    if let Some(capacity) = env("TUTOR_CHANNEL_CAPACITY")
        .and_then(|raw| parsed::<usize>("TUTOR_CHANNEL_CAPACITY", &raw))
    {
        config.channel_capacity = capacity;
        config.source = ConfigSource::Env;
    }
    if let Some(length) = env("TUTOR_MAX_MESSAGE_LENGTH")
        .and_then(|raw| parsed::<usize>("TUTOR_MAX_MESSAGE_LENGTH", &raw))
    {
        config.max_message_length = length;
        config.source = ConfigSource::Env;
    }
}

// =============================================================================
// CLI Override Support
// =============================================================================

/// Builder for applying CLI overrides to configuration
///
/// Use this after [`load_config`] to apply command-line argument overrides.
#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    /// Host override
    pub host: Option<String>,

    /// Port override
    pub port: Option<u16>,

    /// Idle timeout override (seconds)
    pub idle_timeout_secs: Option<u64>,
}

impl ConfigOverrides {
    /// Create a new empty set of overrides
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set host override
    #[must_use]
    pub fn with_host(mut self, host: String) -> Self {
        self.host = Some(host);
        self
    }

    /// Set port override
    #[must_use]
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Set idle timeout override
    #[must_use]
    pub fn with_idle_timeout_secs(mut self, secs: u64) -> Self {
        self.idle_timeout_secs = Some(secs);
        self
    }

    /// Apply overrides to a configuration
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationError` if the result is unusable.
    pub fn apply(&self, config: &mut TutorConfig) -> Result<(), ConfigError> {
        if self.host.is_some() || self.port.is_some() || self.idle_timeout_secs.is_some() {
            config.source = ConfigSource::Cli;
        }

        if let Some(ref host) = self.host {
            config.host.clone_from(host);
        }

        if let Some(port) = self.port {
            config.port = port;
        }

        if let Some(secs) = self.idle_timeout_secs {
            config.idle_timeout = Duration::from_secs(secs);
        }

        config.validate()
    }
}

// =============================================================================
// Tests
// =============================================================================
