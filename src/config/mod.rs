//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML, optional)
//!     → loader.rs (parse & deserialize)
//!     → environment overlay (per-option overrides)
//!     → semantic validation
//!     → ServiceConfig (validated, immutable for the process lifetime)
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; a worker restarts to change it
//! - All fields have defaults to allow a bare `promfront` invocation
//! - Environment variables override file values, one option at a time

pub mod loader;
pub mod schema;

pub use loader::{load, ConfigError};
pub use schema::{LogConfig, MetricsConfig, ServerConfig, ServiceConfig};
