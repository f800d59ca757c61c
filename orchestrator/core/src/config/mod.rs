//! TOML Configuration File Support
//!
//! Centralized configuration loading for the orchestrator, supporting a TOML
//! configuration file at `~/.config/parley/parley.toml`.
//!
//! # Configuration Priority
//!
//! Configuration values are loaded with the following priority (highest first):
//! 1. CLI arguments (when applicable)
//! 2. Environment variables
//! 3. TOML configuration file
//! 4. Default values
//!
//! API keys are the exception: they are read from the environment only
//! (`PARLEY_REALTIME_API_KEY`, `PARLEY_AGENT_API_KEY`) and never from the
//! file, so a shared config file cannot leak credentials.
//!
//! # XDG Base Directory Compliance
//!
//! The configuration file follows the XDG Base Directory specification:
//! - `$XDG_CONFIG_HOME/parley/parley.toml` (typically `~/.config/parley/parley.toml`)
//!
//! # Example Configuration
//!
//! ```toml
//! [providers]
//! default = "realtime_voice"
//!
//! [providers.realtime]
//! control_url = "https://api.openai.com/v1"
//! socket_url = "wss://api.openai.com/v1/realtime"
//! model = "gpt-realtime"
//! voice = "verse"
//!
//! [providers.agent_platform]
//! control_url = "https://api.elevenlabs.io/v1"
//! agent_id = "agent_xxxx"
//!
//! [connection]
//! max_reconnect_attempts = 3
//! base_delay_ms = 500
//! max_delay_ms = 10000
//!
//! [tools]
//! dispatch_timeout_secs = 10
//!
//! [daemon]
//! bind_addr = "127.0.0.1:8200"
//! admin_token = "change-me"
//! ```

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::connection::ReconnectPolicy;
use crate::provider::{AgentPlatformConfig, RealtimeConfig};

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

/// Realtime-speech provider section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RealtimeToml {
    /// Control-plane base URL
    pub control_url: Option<String>,

    /// Duplex socket URL
    pub socket_url: Option<String>,

    /// Model identifier
    pub model: Option<String>,

    /// Voice identifier
    pub voice: Option<String>,
}

/// Agent-platform provider section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentPlatformToml {
    /// Control-plane base URL
    pub control_url: Option<String>,

    /// Dashboard-configured agent id
    pub agent_id: Option<String>,
}

/// Providers section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvidersToml {
    /// Which provider family to use by default
    pub default: Option<String>,

    /// Realtime-speech family settings
    pub realtime: RealtimeToml,

    /// Agent-platform family settings
    pub agent_platform: AgentPlatformToml,
}

/// Connection section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionToml {
    /// Total dial attempts per connect call
    pub max_reconnect_attempts: Option<u32>,

    /// Backoff base delay in milliseconds
    pub base_delay_ms: Option<u64>,

    /// Backoff delay ceiling in milliseconds
    pub max_delay_ms: Option<u64>,
}

/// Tools section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsToml {
    /// Per-call dispatch timeout in seconds
    pub dispatch_timeout_secs: Option<u64>,
}

/// Daemon section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonToml {
    /// Address the admin HTTP surface binds to
    pub bind_addr: Option<String>,

    /// Bearer token guarding the admin surface
    pub admin_token: Option<String>,
}

/// Top-level TOML configuration structure
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ParleyToml {
    /// Provider configuration section
    pub providers: ProvidersToml,

    /// Connection configuration section
    pub connection: ConnectionToml,

    /// Tools configuration section
    pub tools: ToolsToml,

    /// Daemon configuration section
    pub daemon: DaemonToml,
}

// =============================================================================
// Main Configuration Struct
// =============================================================================

/// Default provider family when none is configured
pub const DEFAULT_PROVIDER: &str = "realtime_voice";

/// Centralized configuration for the orchestrator
///
/// Consolidates all configuration sources and tracks where the values came
/// from. Use [`load_config`] to load with proper priority handling.
#[derive(Clone, Debug)]
pub struct ParleyConfig {
    /// Which provider family to use by default
    pub default_provider: String,

    /// Realtime-speech endpoints; `api_key` is filled from the environment
    pub realtime: RealtimeConfig,

    /// Voice identifier for the realtime family
    pub realtime_voice: Option<String>,

    /// Agent-platform endpoints; `api_key` is filled from the environment
    pub agent_platform: AgentPlatformConfig,

    /// Dial/backoff schedule for the connection manager
    pub reconnect: ReconnectPolicy,

    /// Per-call tool dispatch timeout
    pub tool_timeout: Duration,

    /// Address the admin HTTP surface binds to
    pub bind_addr: String,

    /// Bearer token guarding the admin surface, if set
    pub admin_token: Option<String>,

    /// Path to the config file that was loaded (if any)
    pub config_file_path: Option<PathBuf>,

    /// Source of configuration values
    source: ConfigSource,
}

impl Default for ParleyConfig {
    fn default() -> Self {
        Self {
            default_provider: DEFAULT_PROVIDER.to_string(),
            realtime: RealtimeConfig {
                control_url: "https://api.openai.com/v1".to_string(),
                socket_url: "wss://api.openai.com/v1/realtime".to_string(),
                model: "gpt-realtime".to_string(),
                api_key: String::new(),
            },
            realtime_voice: None,
            agent_platform: AgentPlatformConfig {
                control_url: "https://api.elevenlabs.io/v1".to_string(),
                agent_id: String::new(),
                api_key: String::new(),
            },
            reconnect: ReconnectPolicy::default(),
            tool_timeout: Duration::from_secs(10),
            bind_addr: "127.0.0.1:8200".to_string(),
            admin_token: None,
            config_file_path: None,
            source: ConfigSource::Default,
        }
    }
}

impl ParleyConfig {
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

    /// Reject configurations that cannot possibly work
    ///
    /// # Errors
    ///
    /// [`ConfigError::ValidationError`] when the default provider is unknown
    /// or the reconnect schedule is degenerate.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !matches!(
            self.default_provider.as_str(),
            "realtime_voice" | "agent_platform" | "mock"
        ) {
            return Err(ConfigError::ValidationError(format!(
                "unknown default provider: {}",
                self.default_provider
            )));
        }
        if self.reconnect.max_attempts == 0 {
            return Err(ConfigError::ValidationError(
                "max_reconnect_attempts must be at least 1".to_string(),
            ));
        }
        if self.reconnect.base_delay > self.reconnect.max_delay {
            return Err(ConfigError::ValidationError(
                "base_delay_ms exceeds max_delay_ms".to_string(),
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
/// Returns `$XDG_CONFIG_HOME/parley/parley.toml` or
/// `~/.config/parley/parley.toml` if `XDG_CONFIG_HOME` is not set.
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("parley").join("parley.toml"))
}

/// Load configuration from all sources with proper priority
///
/// Priority order (highest first):
/// 1. CLI arguments (not handled here - caller should apply after)
/// 2. Environment variables
/// 3. TOML configuration file
/// 4. Default values
///
/// # Errors
///
/// Returns an error if the config file exists but cannot be parsed.
/// A missing config file is not an error (defaults are used).
pub fn load_config() -> Result<ParleyConfig, ConfigError> {
    load_config_from_path(default_config_path())
}

/// Load configuration from a specific path
///
/// # Errors
///
/// Returns an error if the specified config file cannot be read or parsed,
/// or if the resulting configuration fails validation.
pub fn load_config_from_path(path: Option<PathBuf>) -> Result<ParleyConfig, ConfigError> {
    let mut config = ParleyConfig::default();

    if let Some(ref config_path) = path {
        if config_path.exists() {
            let toml_content =
                std::fs::read_to_string(config_path).map_err(|e| ConfigError::ReadError {
                    path: config_path.clone(),
                    source: e,
                })?;

            let toml_config: ParleyToml = toml::from_str(&toml_content)?;
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

    // Environment overrides the file; API keys come from here only.
    apply_env_config(&mut config);

    config.validate()?;
    Ok(config)
}

/// Apply TOML configuration values to the config struct
fn apply_toml_config(config: &mut ParleyConfig, toml: &ParleyToml) {
    // Provider settings
    if let Some(default) = &toml.providers.default {
        config.default_provider = default.clone();
    }
    if let Some(url) = &toml.providers.realtime.control_url {
        config.realtime.control_url = url.clone();
    }
    if let Some(url) = &toml.providers.realtime.socket_url {
        config.realtime.socket_url = url.clone();
    }
    if let Some(model) = &toml.providers.realtime.model {
        config.realtime.model = model.clone();
    }
    if toml.providers.realtime.voice.is_some() {
        config.realtime_voice = toml.providers.realtime.voice.clone();
    }
    if let Some(url) = &toml.providers.agent_platform.control_url {
        config.agent_platform.control_url = url.clone();
    }
    if let Some(agent_id) = &toml.providers.agent_platform.agent_id {
        config.agent_platform.agent_id = agent_id.clone();
    }

    // Connection settings
    if let Some(attempts) = toml.connection.max_reconnect_attempts {
        config.reconnect.max_attempts = attempts;
    }
    if let Some(delay) = toml.connection.base_delay_ms {
        config.reconnect.base_delay = Duration::from_millis(delay);
    }
    if let Some(delay) = toml.connection.max_delay_ms {
        config.reconnect.max_delay = Duration::from_millis(delay);
    }

    // Tool settings
    if let Some(timeout) = toml.tools.dispatch_timeout_secs {
        config.tool_timeout = Duration::from_secs(timeout);
    }

    // Daemon settings
    if let Some(addr) = &toml.daemon.bind_addr {
        config.bind_addr = addr.clone();
    }
    if toml.daemon.admin_token.is_some() {
        config.admin_token = toml.daemon.admin_token.clone();
    }
}

/// Apply environment variable overrides to the config
fn apply_env_config(config: &mut ParleyConfig) {
    if let Ok(provider) = std::env::var("PARLEY_DEFAULT_PROVIDER") {
        config.default_provider = provider;
        config.source = ConfigSource::Env;
    }
    if let Ok(model) = std::env::var("PARLEY_REALTIME_MODEL") {
        config.realtime.model = model;
        config.source = ConfigSource::Env;
    }
    if let Ok(agent_id) = std::env::var("PARLEY_AGENT_ID") {
        config.agent_platform.agent_id = agent_id;
        config.source = ConfigSource::Env;
    }
    if let Ok(attempts) = std::env::var("PARLEY_RECONNECT_ATTEMPTS") {
        if let Ok(n) = attempts.parse::<u32>() {
            config.reconnect.max_attempts = n;
            config.source = ConfigSource::Env;
        }
    }
    if let Ok(timeout) = std::env::var("PARLEY_TOOL_TIMEOUT_SECS") {
        if let Ok(secs) = timeout.parse::<u64>() {
            config.tool_timeout = Duration::from_secs(secs);
            config.source = ConfigSource::Env;
        }
    }
    if let Ok(addr) = std::env::var("PARLEY_BIND_ADDR") {
        config.bind_addr = addr;
        config.source = ConfigSource::Env;
    }
    if let Ok(token) = std::env::var("PARLEY_ADMIN_TOKEN") {
        config.admin_token = Some(token);
        config.source = ConfigSource::Env;
    }

    // Credentials: environment only, never the file.
    if let Ok(key) = std::env::var("PARLEY_REALTIME_API_KEY") {
        config.realtime.api_key = key;
    }
    if let Ok(key) = std::env::var("PARLEY_AGENT_API_KEY") {
        config.agent_platform.api_key = key;
    }
}
