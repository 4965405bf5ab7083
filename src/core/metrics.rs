//! Named gauges and counters published by the engine.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

pub const QUEUE_DEPTH: &str = "queueDepth";
pub const WORKER_COUNT: &str = "workerCount";
pub const WRITES_PER_SECOND: &str = "writesPerSecond";
pub const SYNC_WRITES_PER_SECOND: &str = "syncWritesPerSecond";
pub const ASYNC_WRITES_PER_SECOND: &str = "asyncWritesPerSecond";
pub const DROPPED_ENTRIES: &str = "droppedEntries";
pub const RECOVERY_QUEUE_DEPTH: &str = "recoveryQueueDepth";
pub const SAMPLES_MIGRATED: &str = "samplesMigrated";

pub trait MetricsSink: Send + Sync {
    fn set_gauge(&self, name: &'static str, value: i64);
    fn add_counter(&self, name: &'static str, delta: u64);
}

/// Discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopMetrics;

impl MetricsSink for NoopMetrics {
    fn set_gauge(&self, _name: &'static str, _value: i64) {}
    fn add_counter(&self, _name: &'static str, _delta: u64) {}
}

/// In-process registry; each name maps to one atomic.
#[derive(Debug, Default)]
pub struct Metrics {
    gauges: RwLock<HashMap<&'static str, Arc<AtomicI64>>>,
    counters: RwLock<HashMap<&'static str, Arc<AtomicU64>>>,
}

fn slot<T: Default>(map: &RwLock<HashMap<&'static str, Arc<T>>>, name: &'static str) -> Arc<T> {
    if let Some(existing) = map
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .get(name)
    {
        return Arc::clone(existing);
    }
    let mut map = map.write().unwrap_or_else(PoisonError::into_inner);
    Arc::clone(map.entry(name).or_default())
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn gauge(&self, name: &str) -> Option<i64> {
        self.gauges
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .map(|g| g.load(Ordering::Acquire))
    }

    pub fn counter(&self, name: &str) -> u64 {
        self.counters
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .map(|c| c.load(Ordering::Acquire))
            .unwrap_or(0)
    }

    /// All gauges and counters, sorted by name.
    pub fn snapshot(&self) -> BTreeMap<&'static str, i64> {
        let mut out = BTreeMap::new();
        for (name, gauge) in self.gauges.read().unwrap_or_else(PoisonError::into_inner).iter() {
            out.insert(*name, gauge.load(Ordering::Acquire));
        }
        for (name, counter) in self
            .counters
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
        {
            out.insert(*name, counter.load(Ordering::Acquire) as i64);
        }
        out
    }
}

impl MetricsSink for Metrics {
    fn set_gauge(&self, name: &'static str, value: i64) {
        slot(&self.gauges, name).store(value, Ordering::Release);
    }

    fn add_counter(&self, name: &'static str, delta: u64) {
        slot(&self.counters, name).fetch_add(delta, Ordering::AcqRel);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gauges_and_counters() {
        let metrics = Metrics::new();
        assert_eq!(metrics.gauge(QUEUE_DEPTH), None);
        metrics.set_gauge(QUEUE_DEPTH, 12);
        metrics.set_gauge(QUEUE_DEPTH, 3);
        metrics.add_counter(DROPPED_ENTRIES, 5);
        metrics.add_counter(DROPPED_ENTRIES, 2);
        assert_eq!(metrics.gauge(QUEUE_DEPTH), Some(3));
        assert_eq!(metrics.counter(DROPPED_ENTRIES), 7);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.get(QUEUE_DEPTH), Some(&3));
        assert_eq!(snapshot.get(DROPPED_ENTRIES), Some(&7));
    }
}
