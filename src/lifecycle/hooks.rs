//! Request lifecycle instrumentation.
//!
//! # Responsibilities
//! - pre-request: stamp the start instant, count the attempt
//! - post-request: count the completion, record elapsed time and payload
//! - worker-exit: retire this worker's shard
//!
//! # Design Decisions
//! - Hooks are infallible at the boundary: an instrumentation failure is
//!   logged at error level and swallowed, never surfaced to the request
//! - A missing start instant skips the duration observation; it is never
//!   fabricated
//! - The host label carries the client address, matching the dashboards
//!   this system already feeds

use std::sync::Arc;
use std::time::Instant;

use crate::metrics::{Aggregator, HttpMetrics};

/// Per-request state filled in by the hook invocations.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub started_at: Option<Instant>,
    pub remote_addr: String,
    pub method: String,
    pub path: String,
}

impl RequestContext {
    pub fn new(remote_addr: &str, method: &str, path: &str) -> Self {
        Self {
            started_at: None,
            remote_addr: remote_addr.to_string(),
            method: method.to_string(),
            path: path.to_string(),
        }
    }
}

/// The three integration points the serving glue invokes around requests.
#[derive(Clone)]
pub struct LifecycleHooks {
    aggregator: Arc<Aggregator>,
    metrics: HttpMetrics,
}

impl LifecycleHooks {
    pub fn new(aggregator: Arc<Aggregator>, metrics: HttpMetrics) -> Self {
        Self {
            aggregator,
            metrics,
        }
    }

    /// Fires when a request is accepted, before the application runs.
    /// Counts attempts, not successes.
    pub fn pre_request(&self, ctx: &mut RequestContext) {
        ctx.started_at = Some(Instant::now());
        if let Err(error) = self
            .metrics
            .incoming
            .inc(&[&ctx.method, &ctx.path, &ctx.remote_addr])
        {
            tracing::error!(%error, "pre-request instrumentation failed");
        }
        self.aggregator.flush();
    }

    /// Fires once a response exists.
    pub fn post_request(&self, ctx: &RequestContext, status: u16, payload_bytes: Option<u64>) {
        let status = status.to_string();
        let labels = [
            ctx.method.as_str(),
            ctx.path.as_str(),
            ctx.remote_addr.as_str(),
            status.as_str(),
        ];

        if let Err(error) = self.metrics.processed.inc(&labels) {
            tracing::error!(%error, "post-request instrumentation failed");
        }
        if let Some(started_at) = ctx.started_at {
            let elapsed = started_at.elapsed().as_secs_f64();
            if let Err(error) = self.metrics.processing_seconds.observe(&labels, elapsed) {
                tracing::error!(%error, "processing-time observation failed");
            }
        }
        if let Some(bytes) = payload_bytes {
            if let Err(error) = self.metrics.payload_size.observe(&labels, bytes as f64) {
                tracing::error!(%error, "payload-size observation failed");
            }
        }
        self.aggregator.flush();
    }

    /// Fires when the worker leaves. Safe to call more than once.
    pub fn worker_exit(&self, worker_id: &str) {
        self.aggregator.mark_dead(worker_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::registry::{Registry, SampleValue};

    fn hooks() -> (Registry, LifecycleHooks) {
        let registry = Registry::new();
        let metrics = HttpMetrics::register(&registry).unwrap();
        let aggregator = Arc::new(Aggregator::attach(registry.clone(), None, "1"));
        (registry, LifecycleHooks::new(aggregator, metrics))
    }

    fn counter_value(registry: &Registry, metric: &str, labels: &[&str]) -> Option<u64> {
        let key: Vec<String> = labels.iter().map(|l| l.to_string()).collect();
        registry
            .snapshot()
            .into_iter()
            .find(|f| f.spec.name == metric)?
            .samples
            .into_iter()
            .find(|(l, _)| *l == key)
            .and_then(|(_, v)| match v {
                SampleValue::Counter(total) => Some(total),
                _ => None,
            })
    }

    #[test]
    fn completed_request_pairs_incoming_and_processed() {
        let (registry, hooks) = hooks();
        let mut ctx = RequestContext::new("10.0.0.1", "GET", "/ping");

        hooks.pre_request(&mut ctx);
        hooks.post_request(&ctx, 200, None);

        assert_eq!(
            counter_value(&registry, "http_incoming_requests", &["GET", "/ping", "10.0.0.1"]),
            Some(1)
        );
        assert_eq!(
            counter_value(
                &registry,
                "http_incoming_processed_requests",
                &["GET", "/ping", "10.0.0.1", "200"]
            ),
            Some(1)
        );

        let snap = registry.snapshot();
        let seconds = snap
            .iter()
            .find(|f| f.spec.name == "http_incoming_requests_processing_seconds")
            .unwrap();
        match &seconds.samples[0].1 {
            SampleValue::Summary(s) => {
                assert_eq!(s.count, 1);
                assert!(s.sum >= 0.0);
            }
            other => panic!("unexpected sample {other:?}"),
        }
    }

    #[test]
    fn observed_duration_grows_with_delay() {
        let (registry, hooks) = hooks();
        let mut ctx = RequestContext::new("10.0.0.1", "GET", "/slow");

        hooks.pre_request(&mut ctx);
        std::thread::sleep(std::time::Duration::from_millis(20));
        hooks.post_request(&ctx, 200, None);

        let snap = registry.snapshot();
        let seconds = snap
            .iter()
            .find(|f| f.spec.name == "http_incoming_requests_processing_seconds")
            .unwrap();
        match &seconds.samples[0].1 {
            SampleValue::Summary(s) => assert!(s.sum >= 0.02),
            other => panic!("unexpected sample {other:?}"),
        }
    }

    #[test]
    fn missing_start_skips_the_duration_observation() {
        let (registry, hooks) = hooks();
        let ctx = RequestContext::new("10.0.0.1", "GET", "/ping");

        // No pre_request: the post hook must not invent an elapsed time.
        hooks.post_request(&ctx, 500, None);

        let snap = registry.snapshot();
        let seconds = snap
            .iter()
            .find(|f| f.spec.name == "http_incoming_requests_processing_seconds")
            .unwrap();
        assert!(seconds.samples.is_empty());
        assert_eq!(
            counter_value(
                &registry,
                "http_incoming_processed_requests",
                &["GET", "/ping", "10.0.0.1", "500"]
            ),
            Some(1)
        );
    }

    #[test]
    fn payload_size_is_observed_when_declared() {
        let (registry, hooks) = hooks();
        let mut ctx = RequestContext::new("10.0.0.1", "POST", "/upload");

        hooks.pre_request(&mut ctx);
        hooks.post_request(&ctx, 201, Some(512));

        let snap = registry.snapshot();
        let payload = snap
            .iter()
            .find(|f| f.spec.name == "http_incoming_requests_payload_size")
            .unwrap();
        match &payload.samples[0].1 {
            SampleValue::Summary(s) => {
                assert_eq!(s.count, 1);
                assert_eq!(s.sum, 512.0);
            }
            other => panic!("unexpected sample {other:?}"),
        }
    }

    #[test]
    fn worker_exit_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store: Arc<dyn crate::metrics::ShardStore> =
            Arc::new(crate::metrics::DirShardStore::new(dir.path()).unwrap());
        let registry = Registry::new();
        let metrics = HttpMetrics::register(&registry).unwrap();
        let aggregator = Arc::new(Aggregator::attach(registry, Some(store), "7"));
        let hooks = LifecycleHooks::new(aggregator.clone(), metrics);

        let mut ctx = RequestContext::new("10.0.0.1", "GET", "/ping");
        hooks.pre_request(&mut ctx);
        hooks.post_request(&ctx, 200, None);

        hooks.worker_exit("7");
        hooks.worker_exit("7");

        let merged = aggregator.merge();
        let incoming = merged
            .iter()
            .find(|f| f.spec.name == "http_incoming_requests")
            .unwrap();
        assert_eq!(incoming.samples.len(), 1);
    }
}
