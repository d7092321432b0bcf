//! The HTTP metric catalog.
//!
//! Every worker registers the same four families at startup, so a merged
//! scrape carries the full catalog no matter which worker answers it.

use crate::metrics::registry::{Counter, MetricError, MetricSpec, Registry, Summary};

/// Label keys shared by the request counters.
const REQUEST_LABELS: &[&str] = &["method", "path", "host"];
/// Label keys for everything recorded after a response exists.
const RESPONSE_LABELS: &[&str] = &["method", "path", "host", "status"];

/// Typed handles to the request-lifecycle metrics.
#[derive(Clone)]
pub struct HttpMetrics {
    /// Requests accepted, counted before the application runs.
    pub incoming: Counter,
    /// Requests that produced a response.
    pub processed: Counter,
    /// Seconds between accept and response.
    pub processing_seconds: Summary,
    /// Request payload bytes, when the request declared them.
    pub payload_size: Summary,
}

impl HttpMetrics {
    /// Register the catalog. Idempotent per registry.
    pub fn register(registry: &Registry) -> Result<Self, MetricError> {
        Ok(Self {
            incoming: registry
                .define(MetricSpec::counter(
                    "http_incoming_requests",
                    "Total HTTP Requests",
                    REQUEST_LABELS,
                ))?
                .into_counter()?,
            processed: registry
                .define(MetricSpec::counter(
                    "http_incoming_processed_requests",
                    "Total HTTP Requests Processed",
                    RESPONSE_LABELS,
                ))?
                .into_counter()?,
            processing_seconds: registry
                .define(MetricSpec::summary(
                    "http_incoming_requests_processing_seconds",
                    "Time spent processing request",
                    RESPONSE_LABELS,
                ))?
                .into_summary()?,
            payload_size: registry
                .define(MetricSpec::summary(
                    "http_incoming_requests_payload_size",
                    "Request Payload Size",
                    RESPONSE_LABELS,
                ))?
                .into_summary()?,
        })
    }
}
