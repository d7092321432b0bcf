//! Lifecycle subsystem.
//!
//! # Data Flow
//! ```text
//! Request accepted:
//!     hooks.rs pre_request → count attempt, stamp start
//! Response produced:
//!     hooks.rs post_request → count completion, record timing
//! Worker leaving (shutdown.rs signal → drain):
//!     hooks.rs worker_exit → retire this worker's shard
//! ```

pub mod hooks;
pub mod shutdown;

pub use hooks::{LifecycleHooks, RequestContext};
pub use shutdown::Shutdown;
