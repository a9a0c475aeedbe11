//! Config - Application Configuration

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::constants::{CONFIG_FILE_NAME, CONNECT_TIMEOUT_SECS, DEFAULT_PORT, ENV_PREFIX};
use crate::error::{Error, Result};
use crate::helpers::get_or_create_config_dir;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    /// Device connection settings
    pub connection: ConnectionConfig,
    /// Log output settings
    pub logging: LoggingConfig,
}

/// Device connection configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ConnectionConfig {
    /// IP address of the Vita
    pub ip: Option<String>,
    /// Control port of the Vita server
    pub port: u16,
    /// TCP connect timeout in seconds
    pub connect_timeout_secs: u64,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            ip: None,
            port: DEFAULT_PORT,
            connect_timeout_secs: CONNECT_TIMEOUT_SECS,
        }
    }
}

impl ConnectionConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is unset
    pub level: String,
    /// Also write a daily rotated log file into the data directory
    pub file: bool,
    /// Trace everything, same as `--debug`
    pub debug: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: false,
            debug: false,
        }
    }
}

impl AppConfig {
    /// Default location: `<config dir>/config.toml`
    pub fn default_path() -> Result<PathBuf> {
        Ok(get_or_create_config_dir()?.join(CONFIG_FILE_NAME))
    }

    /// Load from `path`, or from the default location when `None`, then
    /// apply `VITAPAD_*` environment overrides.
    ///
    /// A missing file yields the default configuration.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => Self::default_path()?,
        };

        let mut config = if path.exists() {
            let content = fs::read_to_string(&path)?;
            let config = Self::parse(&content)?;
            tracing::debug!("Loaded config from {}", path.display());
            config
        } else {
            tracing::info!("Config file {} not found, using defaults", path.display());
            Self::default()
        };

        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Override fields from variables named `VITAPAD_<KEY>`, looked up through `lookup`.
    ///
    /// Keys: `IP`, `PORT`, `CONNECT_TIMEOUT_SECS`, `LOG_LEVEL`, `LOG_FILE`, `DEBUG`.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        let var = |key: &str| {
            let name = format!("{ENV_PREFIX}{key}");
            lookup(name.as_str()).map(|value| (name, value))
        };

        if let Some((_, ip)) = var("IP") {
            self.connection.ip = Some(ip);
        }
        if let Some((name, port)) = var("PORT") {
            self.connection.port = parse_env(&name, &port)?;
        }
        if let Some((name, secs)) = var("CONNECT_TIMEOUT_SECS") {
            self.connection.connect_timeout_secs = parse_env(&name, &secs)?;
        }
        if let Some((_, level)) = var("LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some((name, file)) = var("LOG_FILE") {
            self.logging.file = parse_env(&name, &file)?;
        }
        if let Some((name, debug)) = var("DEBUG") {
            self.logging.debug = parse_env(&name, &debug)?;
        }
        Ok(())
    }

    pub fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        fs::write(path, content)?;
        tracing::info!("Saved config to {}", path.display());
        Ok(())
    }

    /// Commented sample configuration file
    pub fn sample() -> &'static str {
        r#"# Sample configuration file for VitaPad GUI

[connection]
# IP address of the Vita
ip = "192.168.0.100"

# Control port of the Vita server
port = 5000

# Seconds to wait for the TCP connection
connect_timeout_secs = 25

[logging]
# Default log filter when RUST_LOG is not set
level = "info"

# Also write a daily log file into the data directory
file = false

# Trace everything, same as --debug
debug = false

# Every key can be overridden from the environment:
# VITAPAD_IP, VITAPAD_PORT, VITAPAD_CONNECT_TIMEOUT_SECS,
# VITAPAD_LOG_LEVEL, VITAPAD_LOG_FILE, VITAPAD_DEBUG
"#
    }
}

fn parse_env<T: std::str::FromStr>(name: &str, value: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    value.trim().parse().map_err(|err| Error::Invalid {
        message: format!("{name}={value}: {err}"),
    })
}
