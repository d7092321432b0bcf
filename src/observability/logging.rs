//! Structured logging.
//!
//! # Responsibilities
//! - Initialize the logging subsystem once per process
//! - Bridge lifecycle/error events and per-request access records into
//!   one structured event schema
//!
//! # Design Decisions
//! - Render mode (human-readable vs JSON) is chosen at startup and fixed
//!   for the process's lifetime
//! - Level filtering happens once, centrally, in the subscriber; call
//!   sites never filter
//! - Rendering never fails on a missing field: absent values become "-"

use std::str::FromStr;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::LogConfig;

/// How log events are rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable lines for a terminal.
    Console,
    /// One JSON object per event.
    Json,
}

impl Default for LogFormat {
    fn default() -> Self {
        LogFormat::Console
    }
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "console" => Ok(LogFormat::Console),
            "json" => Ok(LogFormat::Json),
            other => Err(format!("unknown log format `{other}`")),
        }
    }
}

/// Install the global subscriber. Call once, before anything logs.
///
/// `RUST_LOG` wins over the configured level when set, matching how the
/// rest of the stack is debugged in development.
pub fn init(config: &LogConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.level.clone()));

    match config.format {
        LogFormat::Console => {
            tracing_subscriber::registry()
                .with(filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_file(true)
                        .with_line_number(true),
                )
                .init();
        }
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_file(true)
                        .with_line_number(true),
                )
                .init();
        }
    }
}

/// Canonical access-log fields for one completed request.
///
/// A dumb value type: it carries what was observed, and the renderers
/// substitute "-" for anything absent.
#[derive(Debug, Clone)]
pub struct AccessRecord {
    pub remote_addr: String,
    pub method: String,
    pub target: String,
    pub protocol: String,
    pub status: u16,
    pub response_bytes: Option<u64>,
    pub user_agent: Option<String>,
}

impl AccessRecord {
    /// `METHOD target PROTOCOL`, the classic request line.
    pub fn request_line(&self) -> String {
        format!("{} {} {}", self.method, self.target, self.protocol)
    }

    /// The fixed-order human summary:
    /// `remote - request_line status bytes user_agent`.
    pub fn summary_line(&self) -> String {
        let bytes = self
            .response_bytes
            .map(|b| b.to_string())
            .unwrap_or_else(|| "-".to_string());
        format!(
            "{} - {} {} {} {}",
            self.remote_addr,
            self.request_line(),
            self.status,
            bytes,
            self.user_agent.as_deref().unwrap_or("-"),
        )
    }
}

/// Funnels supervisor lifecycle events and access records into the
/// subscriber under two logger names, the way the process manager's own
/// logger is split.
#[derive(Debug, Clone, Copy, Default)]
pub struct ServerLogger;

impl ServerLogger {
    pub fn new() -> Self {
        Self
    }

    pub fn critical(&self, msg: &str) {
        tracing::error!(target: "promfront.error", "{msg}");
    }

    pub fn error(&self, msg: &str) {
        tracing::error!(target: "promfront.error", "{msg}");
    }

    pub fn warning(&self, msg: &str) {
        tracing::warn!(target: "promfront.error", "{msg}");
    }

    pub fn info(&self, msg: &str) {
        tracing::info!(target: "promfront.access", "{msg}");
    }

    pub fn debug(&self, msg: &str) {
        tracing::debug!(target: "promfront.access", "{msg}");
    }

    /// Emit one access event carrying the canonical field set plus the
    /// human summary as the message.
    pub fn access(&self, record: &AccessRecord) {
        tracing::info!(
            target: "promfront.access",
            remote_addr = %record.remote_addr,
            request = %record.request_line(),
            status = record.status,
            response_bytes = record.response_bytes,
            user_agent = record.user_agent.as_deref().unwrap_or("-"),
            "{}",
            record.summary_line(),
        );
    }
}
