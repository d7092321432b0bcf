//! Per-process metric storage.
//!
//! # Responsibilities
//! - Register counter and summary families once at startup
//! - Validate label arity at every increment/observe call
//! - Produce ordered, internally consistent snapshots
//!
//! # Design Decisions
//! - Registration order is snapshot order (stable scrape output)
//! - Sample tables are DashMaps: one mutation holds only the lock
//!   for that sample's map shard
//! - No I/O here; cross-process persistence belongs to the aggregator

use std::fmt;
use std::sync::{Arc, RwLock};

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// What a metric family measures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricKind {
    /// Monotonically non-decreasing total.
    Counter,
    /// Running observation count and sum.
    Summary,
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetricKind::Counter => write!(f, "counter"),
            MetricKind::Summary => write!(f, "summary"),
        }
    }
}

/// Identity of a metric family. Immutable after registration.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricSpec {
    pub name: String,
    pub kind: MetricKind,
    pub help: String,
    /// Ordered label keys; every sample carries one value per key.
    pub label_names: Vec<String>,
}

impl MetricSpec {
    pub fn counter(name: &str, help: &str, label_names: &[&str]) -> Self {
        Self::new(name, MetricKind::Counter, help, label_names)
    }

    pub fn summary(name: &str, help: &str, label_names: &[&str]) -> Self {
        Self::new(name, MetricKind::Summary, help, label_names)
    }

    fn new(name: &str, kind: MetricKind, help: &str, label_names: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            kind,
            help: help.to_string(),
            label_names: label_names.iter().map(|l| l.to_string()).collect(),
        }
    }
}

/// Running state of one summary sample.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SummaryValue {
    pub count: u64,
    pub sum: f64,
}

/// Value of one (family, label set) sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SampleValue {
    Counter(u64),
    Summary(SummaryValue),
}

/// Errors surfaced at metric definition or call sites.
///
/// These are programmer errors, not runtime conditions: they are returned
/// immediately and never retried.
#[derive(Debug, Error)]
pub enum MetricError {
    /// A family with this name exists with a different kind or label set.
    #[error("metric `{name}` already registered with a different shape")]
    Duplicate { name: String },

    /// The caller supplied the wrong number of label values.
    #[error("metric `{metric}` expects {expected} label values, got {got}")]
    LabelMismatch {
        metric: String,
        expected: usize,
        got: usize,
    },

    /// The operation does not apply to this family's kind.
    #[error("metric `{metric}` is a {actual}, not a {expected}")]
    KindMismatch {
        metric: String,
        expected: MetricKind,
        actual: MetricKind,
    },
}

enum SampleTable {
    Counters(DashMap<Vec<String>, u64>),
    Summaries(DashMap<Vec<String>, SummaryValue>),
}

struct Family {
    spec: MetricSpec,
    samples: SampleTable,
}

impl Family {
    fn new(spec: MetricSpec) -> Self {
        let samples = match spec.kind {
            MetricKind::Counter => SampleTable::Counters(DashMap::new()),
            MetricKind::Summary => SampleTable::Summaries(DashMap::new()),
        };
        Self { spec, samples }
    }

    fn label_key(&self, label_values: &[&str]) -> Result<Vec<String>, MetricError> {
        if label_values.len() != self.spec.label_names.len() {
            return Err(MetricError::LabelMismatch {
                metric: self.spec.name.clone(),
                expected: self.spec.label_names.len(),
                got: label_values.len(),
            });
        }
        Ok(label_values.iter().map(|v| v.to_string()).collect())
    }
}

/// Point-in-time view of one family: samples sorted by label values.
#[derive(Debug, Clone, PartialEq)]
pub struct FamilySnapshot {
    pub spec: MetricSpec,
    pub samples: Vec<(Vec<String>, SampleValue)>,
}

/// Handle to a counter family.
#[derive(Clone)]
pub struct Counter {
    family: Arc<Family>,
}

impl Counter {
    /// Add 1 to the sample for this label set, creating it at zero first.
    pub fn inc(&self, label_values: &[&str]) -> Result<(), MetricError> {
        self.inc_by(label_values, 1)
    }

    /// Add `amount` to the sample for this label set.
    pub fn inc_by(&self, label_values: &[&str], amount: u64) -> Result<(), MetricError> {
        let key = self.family.label_key(label_values)?;
        match &self.family.samples {
            SampleTable::Counters(map) => {
                let mut cell = map.entry(key).or_insert(0);
                *cell = cell.saturating_add(amount);
                Ok(())
            }
            SampleTable::Summaries(_) => Err(MetricError::KindMismatch {
                metric: self.family.spec.name.clone(),
                expected: MetricKind::Counter,
                actual: MetricKind::Summary,
            }),
        }
    }
}

/// Handle to a summary family.
#[derive(Clone)]
pub struct Summary {
    family: Arc<Family>,
}

impl Summary {
    /// Record one observation: count += 1, sum += value.
    pub fn observe(&self, label_values: &[&str], value: f64) -> Result<(), MetricError> {
        let key = self.family.label_key(label_values)?;
        match &self.family.samples {
            SampleTable::Summaries(map) => {
                let mut cell = map.entry(key).or_insert_with(SummaryValue::default);
                cell.count = cell.count.saturating_add(1);
                cell.sum += value;
                Ok(())
            }
            SampleTable::Counters(_) => Err(MetricError::KindMismatch {
                metric: self.family.spec.name.clone(),
                expected: MetricKind::Summary,
                actual: MetricKind::Counter,
            }),
        }
    }
}

/// Untyped handle produced by table-driven registration.
pub enum Handle {
    Counter(Counter),
    Summary(Summary),
}

impl Handle {
    pub fn into_counter(self) -> Result<Counter, MetricError> {
        match self {
            Handle::Counter(c) => Ok(c),
            Handle::Summary(s) => Err(MetricError::KindMismatch {
                metric: s.family.spec.name.clone(),
                expected: MetricKind::Counter,
                actual: MetricKind::Summary,
            }),
        }
    }

    pub fn into_summary(self) -> Result<Summary, MetricError> {
        match self {
            Handle::Summary(s) => Ok(s),
            Handle::Counter(c) => Err(MetricError::KindMismatch {
                metric: c.family.spec.name.clone(),
                expected: MetricKind::Summary,
                actual: MetricKind::Counter,
            }),
        }
    }
}

/// Process-local metric registry.
///
/// Cheap to clone; all clones share the same families.
#[derive(Clone)]
pub struct Registry {
    families: Arc<RwLock<Vec<Arc<Family>>>>,
}

impl Registry {
    pub fn new() -> Self {
        Self {
            families: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Register a family from a spec.
    ///
    /// Idempotent when name, kind, and label names all match the existing
    /// registration; fails with [`MetricError::Duplicate`] otherwise.
    pub fn define(&self, spec: MetricSpec) -> Result<Handle, MetricError> {
        let mut families = self.families.write().expect("metric registry poisoned");

        if let Some(existing) = families.iter().find(|f| f.spec.name == spec.name) {
            if existing.spec.kind == spec.kind && existing.spec.label_names == spec.label_names {
                return Ok(Self::handle_for(existing.clone()));
            }
            return Err(MetricError::Duplicate { name: spec.name });
        }

        let family = Arc::new(Family::new(spec));
        families.push(family.clone());
        Ok(Self::handle_for(family))
    }

    /// Register (or re-fetch) a counter family.
    pub fn counter(
        &self,
        name: &str,
        help: &str,
        label_names: &[&str],
    ) -> Result<Counter, MetricError> {
        self.define(MetricSpec::counter(name, help, label_names))?
            .into_counter()
    }

    /// Register (or re-fetch) a summary family.
    pub fn summary(
        &self,
        name: &str,
        help: &str,
        label_names: &[&str],
    ) -> Result<Summary, MetricError> {
        self.define(MetricSpec::summary(name, help, label_names))?
            .into_summary()
    }

    /// Point-in-time view of every family, in registration order, with
    /// samples sorted by label values.
    ///
    /// Each sample read is atomic with respect to concurrent mutation; no
    /// cross-sample transaction is implied.
    pub fn snapshot(&self) -> Vec<FamilySnapshot> {
        let families = self.families.read().expect("metric registry poisoned");
        families
            .iter()
            .map(|family| {
                let mut samples: Vec<(Vec<String>, SampleValue)> = match &family.samples {
                    SampleTable::Counters(map) => map
                        .iter()
                        .map(|e| (e.key().clone(), SampleValue::Counter(*e.value())))
                        .collect(),
                    SampleTable::Summaries(map) => map
                        .iter()
                        .map(|e| (e.key().clone(), SampleValue::Summary(*e.value())))
                        .collect(),
                };
                samples.sort_by(|(a, _), (b, _)| a.cmp(b));
                FamilySnapshot {
                    spec: family.spec.clone(),
                    samples,
                }
            })
            .collect()
    }

    fn handle_for(family: Arc<Family>) -> Handle {
        match family.spec.kind {
            MetricKind::Counter => Handle::Counter(Counter { family }),
            MetricKind::Summary => Handle::Summary(Summary { family }),
        }
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counter_accumulates() {
        let registry = Registry::new();
        let reqs = registry.counter("reqs", "Requests", &["method"]).unwrap();

        reqs.inc(&["GET"]).unwrap();
        reqs.inc(&["GET"]).unwrap();
        reqs.inc_by(&["POST"], 3).unwrap();

        let snap = registry.snapshot();
        assert_eq!(snap.len(), 1);
        assert_eq!(
            snap[0].samples,
            vec![
                (vec!["GET".to_string()], SampleValue::Counter(2)),
                (vec!["POST".to_string()], SampleValue::Counter(3)),
            ]
        );
    }

    #[test]
    fn summary_accumulates_count_and_sum() {
        let registry = Registry::new();
        let latency = registry.summary("latency", "Seconds", &["path"]).unwrap();

        latency.observe(&["/x"], 0.5).unwrap();
        latency.observe(&["/x"], 1.5).unwrap();

        let snap = registry.snapshot();
        assert_eq!(
            snap[0].samples,
            vec![(
                vec!["/x".to_string()],
                SampleValue::Summary(SummaryValue { count: 2, sum: 2.0 })
            )]
        );
    }

    #[test]
    fn define_is_idempotent_for_identical_shape() {
        let registry = Registry::new();
        let a = registry.counter("reqs", "Requests", &["method"]).unwrap();
        let b = registry.counter("reqs", "Requests", &["method"]).unwrap();

        a.inc(&["GET"]).unwrap();
        b.inc(&["GET"]).unwrap();

        let snap = registry.snapshot();
        assert_eq!(snap.len(), 1);
        assert_eq!(snap[0].samples[0].1, SampleValue::Counter(2));
    }

    #[test]
    fn redefining_with_different_labels_fails() {
        let registry = Registry::new();
        registry.counter("reqs", "Requests", &["method"]).unwrap();

        let err = registry
            .counter("reqs", "Requests", &["method", "path"])
            .unwrap_err();
        assert!(matches!(err, MetricError::Duplicate { .. }));
    }

    #[test]
    fn redefining_with_different_kind_fails() {
        let registry = Registry::new();
        registry.counter("reqs", "Requests", &["method"]).unwrap();

        let err = registry.summary("reqs", "Requests", &["method"]).unwrap_err();
        assert!(matches!(err, MetricError::Duplicate { .. }));
    }

    #[test]
    fn label_arity_is_enforced() {
        let registry = Registry::new();
        let reqs = registry
            .counter("reqs", "Requests", &["method", "path"])
            .unwrap();

        let err = reqs.inc(&["GET"]).unwrap_err();
        assert!(matches!(
            err,
            MetricError::LabelMismatch {
                expected: 2,
                got: 1,
                ..
            }
        ));
    }

    #[test]
    fn untyped_handle_checks_kind() {
        let registry = Registry::new();
        let handle = registry
            .define(MetricSpec::summary("latency", "Seconds", &["path"]))
            .unwrap();

        let err = handle.into_counter().unwrap_err();
        assert!(matches!(err, MetricError::KindMismatch { .. }));
    }

    #[test]
    fn zero_amount_creates_the_sample() {
        let registry = Registry::new();
        let reqs = registry.counter("reqs", "Requests", &["method"]).unwrap();

        reqs.inc_by(&["GET"], 0).unwrap();

        let snap = registry.snapshot();
        assert_eq!(snap[0].samples[0].1, SampleValue::Counter(0));
    }

    #[test]
    fn snapshot_orders_families_and_samples() {
        let registry = Registry::new();
        let b = registry.counter("b_metric", "B", &["l"]).unwrap();
        let a = registry.counter("a_metric", "A", &["l"]).unwrap();

        b.inc(&["z"]).unwrap();
        b.inc(&["a"]).unwrap();
        a.inc(&["m"]).unwrap();

        let snap = registry.snapshot();
        // Registration order, not name order.
        assert_eq!(snap[0].spec.name, "b_metric");
        assert_eq!(snap[1].spec.name, "a_metric");
        // Samples sorted by label values.
        assert_eq!(snap[0].samples[0].0, vec!["a".to_string()]);
        assert_eq!(snap[0].samples[1].0, vec!["z".to_string()]);
    }

    #[test]
    fn concurrent_increments_do_not_lose_updates() {
        use std::thread;

        let registry = Registry::new();
        let reqs = registry.counter("reqs", "Requests", &["method"]).unwrap();

        let mut handles = vec![];
        for _ in 0..8 {
            let reqs = reqs.clone();
            handles.push(thread::spawn(move || {
                for _ in 0..1000 {
                    reqs.inc(&["GET"]).unwrap();
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }

        let snap = registry.snapshot();
        assert_eq!(snap[0].samples[0].1, SampleValue::Counter(8000));
    }
}
