//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured log events, console or JSON)
//!
//! Consumers:
//!     → stdout (terminal or log shipper)
//!     → metrics endpoint lives in the metrics subsystem, not here
//! ```

pub mod logging;

pub use logging::{AccessRecord, LogFormat, ServerLogger};
