//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection (app or metrics listener)
//!     → server.rs (instrumentation around every request)
//!     → router.rs (metrics port+path → exposition; else pass through)
//!     → wrapped application
//! ```

pub mod app;
pub mod router;
pub mod server;

pub use router::{MetricsRouter, MetricsRouterLayer};
pub use server::{AppServer, InstrumentLayer};
