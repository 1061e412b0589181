//! Configuration module for the ip-echo server.
//!
//! Supports both command-line arguments and TOML configuration file.
//! CLI arguments take precedence over config file values.

use clap::Parser;
use serde::Deserialize;
use std::path::PathBuf;

/// Command-line arguments for the ip-echo server
#[derive(Parser, Debug)]
#[command(name = "ip-echo")]
#[command(author = "ip-echo authors")]
#[command(version = "0.1.0")]
#[command(about = "A what-is-my-IP echo server", long_about = None)]
pub struct CliArgs {
    /// Path to TOML configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// TCP port to listen for connections
    #[arg(short, long, value_parser = clap::value_parser!(u16).range(1..=65534))]
    pub port: Option<u16>,

    /// Receive backlog passed to listen
    #[arg(short, long, value_parser = clap::value_parser!(i32).range(1..))]
    pub backlog: Option<i32>,

    /// Maximum number of readiness events delivered per poll wait
    #[arg(long)]
    pub maxevents: Option<usize>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

/// TOML configuration file structure
#[derive(Debug, Deserialize, Default)]
pub struct TomlConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Server-related configuration
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    /// TCP port to bind
    #[serde(default = "default_port")]
    pub port: u16,
    /// Pending-connection queue depth
    #[serde(default = "default_backlog")]
    pub backlog: i32,
    /// Readiness events per poll wait
    #[serde(default = "default_maxevents")]
    pub maxevents: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            backlog: default_backlog(),
            maxevents: default_maxevents(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_port() -> u16 {
    60359
}

fn default_backlog() -> i32 {
    100
}

fn default_maxevents() -> usize {
    100
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Final resolved configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub backlog: i32,
    pub maxevents: usize,
    pub log_level: String,
}

impl Config {
    /// Load configuration from CLI args and optional TOML file.
    /// CLI arguments take precedence over TOML file values.
    pub fn load() -> Result<Self, ConfigError> {
        let cli = CliArgs::parse();

        // Load TOML config if specified
        let toml_config = if let Some(ref config_path) = cli.config {
            let contents = std::fs::read_to_string(config_path)
                .map_err(|e| ConfigError::FileRead(config_path.clone(), e))?;
            toml::from_str(&contents)
                .map_err(|e| ConfigError::TomlParse(config_path.clone(), e))?
        } else {
            TomlConfig::default()
        };

        Self::merge(cli, toml_config)
    }

    /// Merge CLI args with TOML config (CLI takes precedence) and validate
    /// the result. TOML values bypass clap's range checks entirely, and
    /// clap has no ranged parser for `usize`, so bounds are enforced here.
    fn merge(cli: CliArgs, toml_config: TomlConfig) -> Result<Self, ConfigError> {
        let config = Config {
            port: cli.port.unwrap_or(toml_config.server.port),
            backlog: cli.backlog.unwrap_or(toml_config.server.backlog),
            maxevents: cli.maxevents.unwrap_or(toml_config.server.maxevents),
            log_level: if cli.log_level != "info" {
                cli.log_level
            } else {
                toml_config.logging.level
            },
        };

        if config.port == 0 || config.port == u16::MAX {
            return Err(ConfigError::InvalidPort(config.port));
        }
        if config.backlog <= 0 {
            return Err(ConfigError::InvalidBacklog(config.backlog));
        }
        if config.maxevents == 0 {
            return Err(ConfigError::InvalidMaxevents(config.maxevents));
        }

        Ok(config)
    }
}

/// Configuration loading errors
#[derive(Debug)]
pub enum ConfigError {
    FileRead(PathBuf, std::io::Error),
    TomlParse(PathBuf, toml::de::Error),
    InvalidPort(u16),
    InvalidBacklog(i32),
    InvalidMaxevents(usize),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::FileRead(path, e) => {
                write!(f, "Failed to read config file '{}': {}", path.display(), e)
            }
            ConfigError::TomlParse(path, e) => {
                write!(f, "Failed to parse config file '{}': {}", path.display(), e)
            }
            ConfigError::InvalidPort(port) => {
                write!(f, "{port} is not a usable port (must be between 1 and 65534)")
            }
            ConfigError::InvalidBacklog(backlog) => {
                write!(f, "backlog must be positive, got {backlog}")
            }
            ConfigError::InvalidMaxevents(maxevents) => {
                write!(f, "maxevents must be at least 1, got {maxevents}")
            }
        }
    }
}

impl std::error::Error for ConfigError {}
