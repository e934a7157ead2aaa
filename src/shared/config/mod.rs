//! Server configuration module
//!
//! [`ServerConfig`] is assembled from built-in defaults, an optional TOML
//! file and environment variables, in that order of precedence.
//!
//! ```toml
//! port = 4000
//! bind_addr = "127.0.0.1"
//! max_message_length = 2000
//! ```

use serde::Deserialize;
use std::path::Path;
use thiserror::Error;

/// Environment variable naming an optional TOML config file
pub const CONFIG_PATH_ENV: &str = "PEERCHAT_CONFIG";

pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0";
pub const DEFAULT_MAX_MESSAGE_LENGTH: usize = 10_000;
pub const DEFAULT_ROOM_CLEANUP_SECS: u64 = 300;
pub const DEFAULT_PREVIEW_LENGTH: usize = 60;
pub const DEFAULT_LOG_FILTER: &str = "info,peerchat=debug";

/// Server configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub port: u16,
    pub bind_addr: String,
    /// Postgres URL. `None` runs the server on the in-memory store.
    pub database_url: Option<String>,
    /// Longest accepted message, in characters
    pub max_message_length: usize,
    /// Interval between sweeps of empty broadcast topics
    pub room_cleanup_secs: u64,
    /// Characters kept in a last-message preview
    pub preview_length: usize,
    pub log_filter: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
            database_url: None,
            max_message_length: DEFAULT_MAX_MESSAGE_LENGTH,
            room_cleanup_secs: DEFAULT_ROOM_CLEANUP_SECS,
            preview_length: DEFAULT_PREVIEW_LENGTH,
            log_filter: DEFAULT_LOG_FILTER.to_string(),
        }
    }
}

impl ServerConfig {
    /// Create a new ServerConfigBuilder
    pub fn builder() -> ServerConfigBuilder {
        ServerConfigBuilder::default()
    }

    /// Address string suitable for `TcpListener::bind`
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.bind_addr, self.port)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.port == 0 {
            return Err(ConfigError::InvalidValue {
                key: "port",
                value: "0".to_string(),
            });
        }
        if self.bind_addr.trim().is_empty() {
            return Err(ConfigError::MissingValue("bind_addr"));
        }
        if self.max_message_length == 0 {
            return Err(ConfigError::InvalidValue {
                key: "max_message_length",
                value: "0".to_string(),
            });
        }
        if self.room_cleanup_secs == 0 {
            return Err(ConfigError::InvalidValue {
                key: "room_cleanup_secs",
                value: "0".to_string(),
            });
        }
        if let Some(url) = &self.database_url {
            if !url.starts_with("postgres://") && !url.starts_with("postgresql://") {
                return Err(ConfigError::InvalidUrl(url.clone()));
            }
        }
        Ok(())
    }

    /// Load defaults, then `$PEERCHAT_CONFIG` if set, then the environment.
    pub fn load() -> Result<Self, ConfigError> {
        let mut builder = match std::env::var(CONFIG_PATH_ENV) {
            Ok(path) => ServerConfigBuilder::from_toml_file(path)?,
            Err(_) => ServerConfig::builder(),
        };
        builder = builder.merge_env(|key| std::env::var(key).ok())?;
        builder.build()
    }
}

/// Builder for ServerConfig
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfigBuilder {
    port: Option<u16>,
    bind_addr: Option<String>,
    database_url: Option<String>,
    max_message_length: Option<usize>,
    room_cleanup_secs: Option<u64>,
    preview_length: Option<usize>,
    log_filter: Option<String>,
}

impl ServerConfigBuilder {
    pub fn port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    pub fn bind_addr(mut self, addr: impl Into<String>) -> Self {
        self.bind_addr = Some(addr.into());
        self
    }

    pub fn database_url(mut self, url: impl Into<String>) -> Self {
        self.database_url = Some(url.into());
        self
    }

    pub fn max_message_length(mut self, len: usize) -> Self {
        self.max_message_length = Some(len);
        self
    }

    pub fn room_cleanup_secs(mut self, secs: u64) -> Self {
        self.room_cleanup_secs = Some(secs);
        self
    }

    pub fn preview_length(mut self, len: usize) -> Self {
        self.preview_length = Some(len);
        self
    }

    pub fn log_filter(mut self, filter: impl Into<String>) -> Self {
        self.log_filter = Some(filter.into());
        self
    }

    /// Parse builder values from TOML text
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Override values with environment variables read through `lookup`.
    pub fn merge_env<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup("SERVER_PORT") {
            self.port = Some(parse_env("SERVER_PORT", &value)?);
        }
        if let Some(value) = lookup("BIND_ADDR") {
            self.bind_addr = Some(value);
        }
        if let Some(value) = lookup("DATABASE_URL") {
            self.database_url = Some(value);
        }
        if let Some(value) = lookup("MAX_MESSAGE_LENGTH") {
            self.max_message_length = Some(parse_env("MAX_MESSAGE_LENGTH", &value)?);
        }
        if let Some(value) = lookup("ROOM_CLEANUP_SECS") {
            self.room_cleanup_secs = Some(parse_env("ROOM_CLEANUP_SECS", &value)?);
        }
        if let Some(value) = lookup("RUST_LOG") {
            self.log_filter = Some(value);
        }
        Ok(self)
    }

    /// Build and validate the configuration
    pub fn build(self) -> Result<ServerConfig, ConfigError> {
        let defaults = ServerConfig::default();
        let config = ServerConfig {
            port: self.port.unwrap_or(defaults.port),
            bind_addr: self.bind_addr.unwrap_or(defaults.bind_addr),
            database_url: self.database_url.filter(|url| !url.trim().is_empty()),
            max_message_length: self.max_message_length.unwrap_or(defaults.max_message_length),
            room_cleanup_secs: self.room_cleanup_secs.unwrap_or(defaults.room_cleanup_secs),
            preview_length: self.preview_length.unwrap_or(defaults.preview_length),
            log_filter: self.log_filter.unwrap_or(defaults.log_filter),
        };
        config.validate()?;
        Ok(config)
    }
}

fn parse_env<T: std::str::FromStr>(key: &'static str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key,
        value: value.to_string(),
    })
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid URL: {0}")]
    InvalidUrl(String),
    #[error("missing value: {0}")]
    MissingValue(&'static str),
    #[error("invalid value for {key}: {value:?}")]
    InvalidValue { key: &'static str, value: String },
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config file: {0}")]
    Toml(#[from] toml::de::Error),
}
