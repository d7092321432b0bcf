//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for a worker.
//! All types derive Serde traits for deserialization from config files.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::observability::logging::LogFormat;

/// Root configuration for one worker process.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ServiceConfig {
    /// Application listener and worker sizing.
    pub server: ServerConfig,

    /// Metrics listener and aggregation settings.
    pub metrics: MetricsConfig,

    /// Log level and render mode.
    pub log: LogConfig,
}

/// Application-traffic listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address for application traffic (e.g., "127.0.0.1:8001").
    pub bind_address: String,

    /// Worker processes the external supervisor should run. Advisory for
    /// the supervisor; one promfront process is one worker.
    pub workers: usize,

    /// Request-handling threads per worker.
    pub threads: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1:8001".to_string(),
            workers: 3,
            threads: 4,
        }
    }
}

/// Metrics endpoint configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Bind address for the metrics listener, separate from app traffic.
    pub bind_address: String,

    /// Reserved scrape path on the metrics port.
    pub path: String,

    /// Shared shard directory for multiprocess aggregation. When absent
    /// the worker runs in single-process mode.
    pub shard_dir: Option<PathBuf>,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1:9090".to_string(),
            path: "/_metrics".to_string(),
            shard_dir: None,
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LogConfig {
    /// Log level (trace, debug, info, warn, error).
    pub level: String,

    /// Render mode, fixed for the process's lifetime.
    pub format: LogFormat,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Console,
        }
    }
}
