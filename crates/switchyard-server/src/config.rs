//! Gateway configuration loading from file and environment variables.

use serde::Deserialize;
use std::net::{IpAddr, Ipv4Addr};
use switchyard_drivers::DriversConfig;
use switchyard_router::ProcessorConfig;
use switchyard_store::StorageConfig;
use thiserror::Error;

/// Top-level gateway configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Server network settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Storage settings.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Conversation processor settings.
    #[serde(default)]
    pub processor: ProcessorConfig,

    /// Vendor driver settings.
    #[serde(default)]
    pub drivers: DriversConfig,

    /// Duplex channel settings.
    #[serde(default)]
    pub channel: ChannelConfig,

    /// Health cycle settings.
    #[serde(default)]
    pub health: HealthConfig,

    /// API and channel authentication settings.
    #[serde(default)]
    pub auth: AuthConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Network configuration for the HTTP server.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Host address to bind to.
    #[serde(default = "default_host")]
    pub host: IpAddr,

    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,
}

/// Duplex channel tunables.
#[derive(Debug, Clone, Deserialize)]
pub struct ChannelConfig {
    /// Hard ceiling on a single inbound frame (bytes).
    #[serde(default = "default_max_frame_bytes")]
    pub max_frame_bytes: usize,

    /// How often the reaper looks for silent sessions.
    #[serde(default = "default_heartbeat_interval_secs")]
    pub heartbeat_interval_secs: u64,

    /// Consecutive silent intervals tolerated before a session is closed.
    #[serde(default = "default_missed_heartbeat_limit")]
    pub missed_heartbeat_limit: u32,
}

/// Health cycle tunables.
#[derive(Debug, Clone, Deserialize)]
pub struct HealthConfig {
    /// Seconds between background check cycles.
    #[serde(default = "default_health_interval_secs")]
    pub interval_secs: u64,
}

/// Authentication settings.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuthConfig {
    /// Bearer key required on `/api/*` routes. Empty disables API auth,
    /// which is only sensible behind a trusted proxy.
    #[serde(default)]
    pub api_key: String,

    /// Secret the channel session tokens are signed with. Empty derives an
    /// ephemeral secret at startup, invalidating tokens across restarts.
    #[serde(default)]
    pub token_secret: String,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "switchyard_server=debug,info").
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Whether to output logs in JSON format.
    #[serde(default)]
    pub json: bool,
}

fn default_host() -> IpAddr {
    IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1))
}

fn default_port() -> u16 {
    8080
}

fn default_max_frame_bytes() -> usize {
    512 * 1024
}

fn default_heartbeat_interval_secs() -> u64 {
    30
}

fn default_missed_heartbeat_limit() -> u32 {
    3
}

fn default_health_interval_secs() -> u64 {
    15
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            max_frame_bytes: default_max_frame_bytes(),
            heartbeat_interval_secs: default_heartbeat_interval_secs(),
            missed_heartbeat_limit: default_missed_heartbeat_limit(),
        }
    }
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_health_interval_secs(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

/// Errors that can occur when loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    /// Failed to parse the configuration file.
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Loads configuration from a TOML file, falling back to defaults.
///
/// Environment variable overrides:
/// - `SWITCHYARD_HOST` overrides `server.host`
/// - `SWITCHYARD_PORT` overrides `server.port`
/// - `SWITCHYARD_DB_PATH` overrides `storage.path`
/// - `SWITCHYARD_PROCESSOR_URL` overrides `processor.endpoint`
/// - `SWITCHYARD_ACTIVE_DRIVER` overrides `drivers.active`
/// - `SWITCHYARD_API_KEY` overrides `auth.api_key`
/// - `SWITCHYARD_TOKEN_SECRET` overrides `auth.token_secret`
/// - `SWITCHYARD_LOG_LEVEL` overrides `logging.level`
/// - `SWITCHYARD_LOG_JSON` overrides `logging.json` (set to "true" to enable)
///
/// # Errors
///
/// Returns `ConfigError` if the file exists but cannot be read or parsed.
pub fn load_config(path: Option<&str>) -> Result<Config, ConfigError> {
    let mut config = match path {
        Some(p) => match std::fs::read_to_string(p) {
            Ok(contents) => toml::from_str(&contents)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = p, "config file not found, using defaults");
                Config::default()
            }
            Err(e) => return Err(ConfigError::FileRead(e)),
        },
        None => Config::default(),
    };

    // Environment variable overrides
    if let Ok(host) = std::env::var("SWITCHYARD_HOST") {
        if let Ok(parsed) = host.parse() {
            config.server.host = parsed;
        }
    }
    if let Ok(port) = std::env::var("SWITCHYARD_PORT") {
        if let Ok(parsed) = port.parse() {
            config.server.port = parsed;
        }
    }
    if let Ok(db_path) = std::env::var("SWITCHYARD_DB_PATH") {
        config.storage.path = db_path;
    }
    if let Ok(url) = std::env::var("SWITCHYARD_PROCESSOR_URL") {
        config.processor.endpoint = url;
    }
    if let Ok(active) = std::env::var("SWITCHYARD_ACTIVE_DRIVER") {
        config.drivers.active = active;
    }
    if let Ok(key) = std::env::var("SWITCHYARD_API_KEY") {
        config.auth.api_key = key;
    }
    if let Ok(secret) = std::env::var("SWITCHYARD_TOKEN_SECRET") {
        config.auth.token_secret = secret;
    }
    if let Ok(level) = std::env::var("SWITCHYARD_LOG_LEVEL") {
        config.logging.level = level;
    }
    if let Ok(json) = std::env::var("SWITCHYARD_LOG_JSON") {
        config.logging.json = json == "true" || json == "1";
    }

    Ok(config)
}
