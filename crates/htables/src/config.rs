//! Configuration loading from file and environment variables.

use serde::Deserialize;
use thiserror::Error;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Database settings.
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Database configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DatabaseConfig {
    /// `postgresql://…` address, SQLite file path or `:memory:`.
    #[serde(default = "default_uri")]
    pub uri: String,

    /// Reject non-string row values on save.
    #[serde(default)]
    pub debug: bool,

    /// Upper bound on pooled PostgreSQL connections.
    #[serde(default = "default_pool_max_size")]
    pub pool_max_size: u32,

    /// How long a checkout waits for a free PostgreSQL connection.
    #[serde(default = "default_connection_timeout_ms")]
    pub connection_timeout_ms: u64,

    /// Busy timeout for SQLite connections, in milliseconds.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,

    /// Rows fetched per round trip while iterating `find` results.
    #[serde(default = "default_scan_page_size")]
    pub scan_page_size: u32,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "htables=trace,info").
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Whether to output logs in JSON format.
    #[serde(default)]
    pub json: bool,
}

fn default_uri() -> String {
    crate::uri::MEMORY.to_string()
}

fn default_pool_max_size() -> u32 {
    5
}

fn default_connection_timeout_ms() -> u64 {
    30_000
}

fn default_busy_timeout_ms() -> u64 {
    5_000
}

fn default_scan_page_size() -> u32 {
    100
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            uri: default_uri(),
            debug: false,
            pool_max_size: default_pool_max_size(),
            connection_timeout_ms: default_connection_timeout_ms(),
            busy_timeout_ms: default_busy_timeout_ms(),
            scan_page_size: default_scan_page_size(),
        }
    }
}

impl DatabaseConfig {
    /// Defaults with the given address.
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            ..Self::default()
        }
    }

    /// Same configuration with debug checks switched on or off.
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
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
/// - `HTABLES_DATABASE_URI` overrides `database.uri`
/// - `HTABLES_DEBUG` overrides `database.debug` (set to "true" to enable)
/// - `HTABLES_POOL_MAX_SIZE` overrides `database.pool_max_size`
/// - `HTABLES_LOG_LEVEL` overrides `logging.level`
/// - `HTABLES_LOG_JSON` overrides `logging.json` (set to "true" to enable)
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

    if let Ok(uri) = std::env::var("HTABLES_DATABASE_URI") {
        config.database.uri = uri;
    }
    if let Ok(debug) = std::env::var("HTABLES_DEBUG") {
        config.database.debug = debug == "true" || debug == "1";
    }
    if let Ok(size) = std::env::var("HTABLES_POOL_MAX_SIZE") {
        if let Ok(parsed) = size.parse() {
            config.database.pool_max_size = parsed;
        }
    }
    if let Ok(level) = std::env::var("HTABLES_LOG_LEVEL") {
        config.logging.level = level;
    }
    if let Ok(json) = std::env::var("HTABLES_LOG_JSON") {
        config.logging.json = json == "true" || json == "1";
    }

    Ok(config)
}
