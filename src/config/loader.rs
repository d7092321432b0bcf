//! Configuration loading from disk and environment.

use std::net::SocketAddr;
use std::path::Path;
use std::{env, fs};

use crate::config::schema::ServiceConfig;
use crate::observability::logging::LogFormat;

/// Error type for configuration loading.
#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(toml::de::Error),
    Invalid(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "IO error: {}", e),
            ConfigError::Parse(e) => write!(f, "Parse error: {}", e),
            ConfigError::Invalid(reason) => write!(f, "Invalid configuration: {}", reason),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Load the configuration: defaults, then the optional TOML file, then
/// per-option environment overrides, then semantic validation.
pub fn load(path: Option<&Path>) -> Result<ServiceConfig, ConfigError> {
    let mut config = match path {
        Some(path) => {
            let content = fs::read_to_string(path).map_err(ConfigError::Io)?;
            toml::from_str(&content).map_err(ConfigError::Parse)?
        }
        None => ServiceConfig::default(),
    };

    overlay(&mut config, |key| env::var(key).ok())?;
    validate(&config)?;
    Ok(config)
}

/// Apply environment-style overrides from `lookup`.
///
/// Factored over a lookup function so the overlay is testable without
/// mutating process-global state.
fn overlay(
    config: &mut ServiceConfig,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<(), ConfigError> {
    if let Some(value) = lookup("PROMFRONT_BIND") {
        config.server.bind_address = value;
    }
    if let Some(value) = lookup("PROMFRONT_METRICS_BIND") {
        config.metrics.bind_address = value;
    }
    if let Some(value) = lookup("PROMFRONT_WORKERS") {
        config.server.workers = value
            .parse()
            .map_err(|_| ConfigError::Invalid(format!("PROMFRONT_WORKERS=`{value}`")))?;
    }
    if let Some(value) = lookup("PROMFRONT_THREADS") {
        config.server.threads = value
            .parse()
            .map_err(|_| ConfigError::Invalid(format!("PROMFRONT_THREADS=`{value}`")))?;
    }
    if let Some(value) = lookup("PROMFRONT_SHARD_DIR") {
        config.metrics.shard_dir = Some(value.into());
    }
    if let Some(value) = lookup("LOG_LEVEL") {
        config.log.level = value;
    }
    if let Some(value) = lookup("LOG_FORMAT") {
        config.log.format = value
            .parse::<LogFormat>()
            .map_err(ConfigError::Invalid)?;
    }
    Ok(())
}

fn validate(config: &ServiceConfig) -> Result<(), ConfigError> {
    let app: SocketAddr = config
        .server
        .bind_address
        .parse()
        .map_err(|_| ConfigError::Invalid(format!("server.bind_address `{}`", config.server.bind_address)))?;
    let metrics: SocketAddr = config
        .metrics
        .bind_address
        .parse()
        .map_err(|_| ConfigError::Invalid(format!("metrics.bind_address `{}`", config.metrics.bind_address)))?;

    if app == metrics {
        return Err(ConfigError::Invalid(
            "metrics.bind_address must differ from server.bind_address".to_string(),
        ));
    }
    if !config.metrics.path.starts_with('/') {
        return Err(ConfigError::Invalid(format!(
            "metrics.path `{}` must start with '/'",
            config.metrics.path
        )));
    }
    if config.server.workers == 0 {
        return Err(ConfigError::Invalid("server.workers must be at least 1".to_string()));
    }
    if config.server.threads == 0 {
        return Err(ConfigError::Invalid("server.threads must be at least 1".to_string()));
    }
    Ok(())
}
