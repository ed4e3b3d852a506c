//! Configuration loading and management.
//!
//! A single TOML file describes one connection: where to connect, who we are
//! on the network, which channels to join and how to react to errors.

use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config: {}", .0.join("; "))]
    Invalid(Vec<String>),
}

/// Client configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Server to connect to.
    pub server: ServerConfig,
    /// How we present ourselves.
    #[serde(default)]
    pub identity: IdentityConfig,
    /// Channels joined once the server welcomes us.
    #[serde(default)]
    pub channels: Vec<String>,
    /// Runtime behaviour.
    #[serde(default)]
    pub behavior: BehaviorConfig,
    /// Optional persistence.
    pub database: Option<DatabaseConfig>,
}

/// Server connection details.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Hostname or address.
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Wrap the connection in TLS.
    #[serde(default)]
    pub secure: bool,
}

/// Nick, username and real name sent during registration.
#[derive(Debug, Clone, Deserialize)]
pub struct IdentityConfig {
    #[serde(default = "default_nick")]
    pub nick: String,
    #[serde(default = "default_username")]
    pub username: String,
    #[serde(default = "default_realname")]
    pub realname: String,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            nick: default_nick(),
            username: default_username(),
            realname: default_realname(),
        }
    }
}

/// What to do when a line cannot be processed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorPolicy {
    /// Log the problem, drop the line and keep reading.
    #[default]
    Log,
    /// Close the connection and report the error to the host.
    Terminate,
}

/// Runtime behaviour knobs.
#[derive(Debug, Clone, Deserialize)]
pub struct BehaviorConfig {
    #[serde(default)]
    pub error_policy: ErrorPolicy,
    /// Seconds between keepalive PINGs once registered.
    #[serde(default = "default_keepalive_secs")]
    pub keepalive_secs: u64,
    /// Enable debug logging.
    #[serde(default)]
    pub debug: bool,
}

impl Default for BehaviorConfig {
    fn default() -> Self {
        Self {
            error_policy: ErrorPolicy::default(),
            keepalive_secs: default_keepalive_secs(),
            debug: false,
        }
    }
}

impl BehaviorConfig {
    pub fn keepalive(&self) -> Duration {
        Duration::from_secs(self.keepalive_secs)
    }
}

/// Database configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Path to SQLite database file (or `:memory:`).
    pub path: String,
}

fn default_port() -> u16 {
    6667
}

fn default_nick() -> String {
    "pircel".to_string()
}

fn default_username() -> String {
    "pircel".to_string()
}

fn default_realname() -> String {
    "pircel IRC".to_string()
}

fn default_keepalive_secs() -> u64 {
    60
}

impl Config {
    /// Load and validate configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        content.parse()
    }

    /// Check the fields the engine cannot work without.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors = Vec::new();

        if self.server.host.trim().is_empty() {
            errors.push("server.host is required".to_string());
        }
        if self.server.port == 0 {
            errors.push("server.port must be non-zero".to_string());
        }
        for (field, value) in [
            ("identity.nick", &self.identity.nick),
            ("identity.username", &self.identity.username),
        ] {
            if value.is_empty() || value.contains(char::is_whitespace) {
                errors.push(format!("{} must be a single non-empty word", field));
            }
        }
        if self.behavior.keepalive_secs == 0 {
            errors.push("behavior.keepalive_secs must be non-zero".to_string());
        }
        for channel in &self.channels {
            if !pircel_proto::is_channel_name(channel) {
                errors.push(format!("'{}' is not a channel name", channel));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Invalid(errors))
        }
    }
}

impl std::str::FromStr for Config {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let config: Config = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }
}
