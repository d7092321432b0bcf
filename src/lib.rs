//! promfront: a metrics-aggregating front for a worker-process HTTP app.
//!
//! # Architecture Overview
//!
//! ```text
//!              ┌─────────────────────────────────────────────────────┐
//!              │                  ONE WORKER PROCESS                  │
//!              │                                                      │
//! app traffic  │  ┌──────────┐    ┌────────────┐    ┌─────────────┐  │
//! ─────────────┼─▶│   app    │───▶│ instrument │───▶│   metrics   │──┼─▶ application
//!              │  │ listener │    │  (hooks +  │    │   router    │  │
//!              │  └──────────┘    │   access)  │    │(pass-through)│ │
//! scrapes      │  ┌──────────┐    └────────────┘    └──────┬──────┘  │
//! ─────────────┼─▶│ metrics  │──────────┘                  │         │
//!              │  │ listener │                    merged exposition  │
//!              │  └──────────┘                              │        │
//!              │                                            ▼        │
//!              │   registry ──flush──▶ shard file ◀──merge── every   │
//!              │   (this process)      (shared dir)          shard   │
//!              └─────────────────────────────────────────────────────┘
//! ```
//!
//! Each worker owns a process-local metric registry and writes it through
//! to its own shard file in a shared directory. A scrape, answered by
//! whichever worker receives it, merges every retained shard (live and
//! dead) into one deterministic exposition. Without a shard directory
//! the aggregator degrades to single-process mode.
//!
//! This crate is consumed by the binary (`main.rs`) and by the
//! integration tests.

// Core subsystems
pub mod config;
pub mod http;
pub mod metrics;

// Cross-cutting concerns
pub mod lifecycle;
pub mod observability;

pub use config::ServiceConfig;
pub use http::AppServer;
pub use lifecycle::Shutdown;
