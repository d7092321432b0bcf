//! Multiprocess aggregation.
//!
//! # Responsibilities
//! - Attach one shard per worker process (fresh token per attach)
//! - Write local registry state through to the shard store
//! - Merge every retained shard into one deterministic view at scrape time
//! - Retire dead workers' shards without dropping their totals
//!
//! # Design Decisions
//! - Counters sum across shards; summaries sum count and sum independently
//! - Dead shards keep contributing: their values already happened
//! - A merge is always produced; a bad shard costs a warning, not the scrape
//! - Without a shard store the aggregator degrades to single-process mode
//!   (one shared in-process registry, no cross-process merge step)

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use uuid::Uuid;

use crate::metrics::registry::{
    FamilySnapshot, MetricKind, Registry, SampleValue, SummaryValue,
};
use crate::metrics::shard::{ShardSample, ShardSnapshot, ShardStore};

enum Mode {
    /// No shard store configured: local registry is the whole truth.
    SingleProcess,
    /// Shard-backed: this process owns exactly one live shard.
    Multiprocess {
        store: Arc<dyn ShardStore>,
        token: Uuid,
        dead: AtomicBool,
    },
}

/// Merges worker shards into one scrape view.
pub struct Aggregator {
    registry: Registry,
    worker_id: String,
    mode: Mode,
}

impl Aggregator {
    /// Establish this worker's shard, or enter single-process mode when no
    /// store is configured.
    pub fn attach(registry: Registry, store: Option<Arc<dyn ShardStore>>, worker_id: &str) -> Self {
        let mode = match store {
            Some(store) => {
                let token = Uuid::new_v4();
                tracing::info!(worker_id, shard_token = %token, "Multiprocess aggregation enabled");
                Mode::Multiprocess {
                    store,
                    token,
                    dead: AtomicBool::new(false),
                }
            }
            None => {
                tracing::info!(worker_id, "No shard directory configured; single-process aggregation");
                Mode::SingleProcess
            }
        };
        Self {
            registry,
            worker_id: worker_id.to_string(),
            mode,
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn worker_id(&self) -> &str {
        &self.worker_id
    }

    pub fn multiprocess(&self) -> bool {
        matches!(self.mode, Mode::Multiprocess { .. })
    }

    /// Persist the local registry state to this worker's shard.
    ///
    /// No-op in single-process mode and after the local shard is dead.
    /// Write failures are logged and swallowed; the next flush retries
    /// with the then-current totals.
    pub fn flush(&self) {
        let Mode::Multiprocess { store, token, dead } = &self.mode else {
            return;
        };
        if dead.load(Ordering::Acquire) {
            return;
        }

        let samples = self
            .registry
            .snapshot()
            .into_iter()
            .flat_map(|family| {
                let name = family.spec.name;
                family
                    .samples
                    .into_iter()
                    .map(move |(labels, value)| ShardSample {
                        metric: name.clone(),
                        labels,
                        value,
                    })
            })
            .collect();

        let shard = ShardSnapshot {
            worker_id: self.worker_id.clone(),
            token: *token,
            samples,
        };
        if let Err(error) = store.write(&shard) {
            tracing::warn!(worker_id = %self.worker_id, %error, "Shard flush failed");
        }
    }

    /// Flag a worker's shard dead. Safe to call repeatedly.
    pub fn mark_dead(&self, worker_id: &str) {
        let Mode::Multiprocess { store, dead, .. } = &self.mode else {
            return;
        };
        if worker_id == self.worker_id {
            // Stop writing first so the rename below is final.
            dead.store(true, Ordering::Release);
        }
        if let Err(error) = store.mark_dead(worker_id) {
            tracing::warn!(worker_id, %error, "Failed to mark shard dead");
        }
    }

    /// Merge every retained shard into one ordered view.
    ///
    /// Output order is family registration order, then label values; two
    /// merges over identical shard state produce identical output. Every
    /// defined family appears, samples or not.
    pub fn merge(&self) -> Vec<FamilySnapshot> {
        let local = self.registry.snapshot();
        let Mode::Multiprocess { store, .. } = &self.mode else {
            return local;
        };

        self.flush();

        let records = match store.read_all() {
            Ok(records) => records,
            Err(error) => {
                tracing::warn!(%error, "Shard directory unreadable; serving local data only");
                return local;
            }
        };

        let index: HashMap<&str, usize> = local
            .iter()
            .enumerate()
            .map(|(i, family)| (family.spec.name.as_str(), i))
            .collect();
        let mut totals: Vec<BTreeMap<Vec<String>, SampleValue>> =
            local.iter().map(|_| BTreeMap::new()).collect();

        for record in records {
            for sample in record.snapshot.samples {
                let Some(&i) = index.get(sample.metric.as_str()) else {
                    tracing::debug!(metric = %sample.metric, "Unknown metric in shard; skipped");
                    continue;
                };
                accumulate(&mut totals[i], local[i].spec.kind, sample);
            }
        }

        local
            .into_iter()
            .zip(totals)
            .map(|(family, merged)| FamilySnapshot {
                spec: family.spec,
                samples: merged.into_iter().collect(),
            })
            .collect()
    }
}

fn accumulate(
    samples: &mut BTreeMap<Vec<String>, SampleValue>,
    kind: MetricKind,
    sample: ShardSample,
) {
    match (kind, sample.value) {
        (MetricKind::Counter, SampleValue::Counter(v)) => {
            let entry = samples
                .entry(sample.labels)
                .or_insert(SampleValue::Counter(0));
            if let SampleValue::Counter(total) = entry {
                *total = total.saturating_add(v);
            }
        }
        (MetricKind::Summary, SampleValue::Summary(v)) => {
            let entry = samples
                .entry(sample.labels)
                .or_insert(SampleValue::Summary(SummaryValue::default()));
            if let SampleValue::Summary(total) = entry {
                total.count = total.count.saturating_add(v.count);
                total.sum += v.sum;
            }
        }
        (kind, _) => {
            tracing::warn!(metric = %sample.metric, %kind, "Shard sample kind mismatch; skipped");
        }
    }
}
