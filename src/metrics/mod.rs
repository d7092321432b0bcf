//! Metrics subsystem.
//!
//! # Data Flow
//! ```text
//! Request hooks mutate:
//!     → registry.rs (per-process samples)
//!     → merge.rs flush (write-through to this worker's shard)
//!
//! Scrape reads:
//!     → merge.rs (every retained shard, live and dead)
//!     → exposition.rs (deterministic text rendering)
//! ```
//!
//! # Design Decisions
//! - The shard directory is the only thing processes share; each worker
//!   writes its own shard and reads everyone's at scrape time
//! - Counters only ever merge by summation; a dead worker's totals stay
//! - catalog.rs fixes the metric families once, at startup

pub mod catalog;
pub mod exposition;
pub mod merge;
pub mod registry;
pub mod shard;

pub use catalog::HttpMetrics;
pub use merge::Aggregator;
pub use registry::{MetricError, Registry};
pub use shard::{DirShardStore, ShardStore};
