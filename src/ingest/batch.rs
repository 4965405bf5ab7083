//! Multi-row insertion with bounded retry.
//!
//! After `batch_retries` transient failures a chunk is logged and dropped.
//! The loss is reported through the log and the `droppedEntries` counter
//! only; no caller waits on a background batch.

use std::sync::Arc;
use std::time::Duration;

use crate::core::metrics::{DROPPED_ENTRIES, WRITES_PER_SECOND};
use crate::core::{BatchEntry, Clock, EventRate, MeasurementStore, MetricsSink};
use crate::ingest::IngestConfig;

pub struct BatchWriter {
    store: Arc<dyn MeasurementStore>,
    clock: Arc<dyn Clock>,
    metrics: Arc<dyn MetricsSink>,
    retries: u32,
    backoff_step: Duration,
    writes: EventRate,
}

impl BatchWriter {
    pub fn new(
        store: Arc<dyn MeasurementStore>,
        clock: Arc<dyn Clock>,
        metrics: Arc<dyn MetricsSink>,
        config: &IngestConfig,
    ) -> Self {
        Self {
            store,
            clock,
            metrics,
            retries: config.batch_retries,
            backoff_step: config.batch_backoff_step(),
            writes: EventRate::new(config.rate_bucket_ms, config.rate_buckets),
        }
    }

    /// Inserts `entries` in one statement and returns how many were written.
    ///
    /// Returns 0 when the chunk was dropped.
    pub fn write_batch(&self, entries: &[BatchEntry]) -> usize {
        if entries.is_empty() {
            return 0;
        }

        let mut attempt = 0u32;
        loop {
            match self.store.insert_batch(entries) {
                Ok(written) => {
                    self.record_written(written);
                    return written;
                }
                Err(err) if err.is_transient() => {
                    attempt += 1;
                    if attempt > self.retries {
                        log::error!(
                            "transient failure saving {} point values after {} retries, data lost: {}",
                            entries.len(),
                            self.retries,
                            err
                        );
                        self.record_dropped(entries.len());
                        return 0;
                    }
                    let wait = self.backoff_step * attempt;
                    log::debug!(
                        "batch insert of {} values failed (attempt {}), retrying in {:?}: {}",
                        entries.len(),
                        attempt,
                        wait,
                        err
                    );
                    self.clock.sleep(wait);
                }
                Err(err) => {
                    log::error!("error saving {} point values, data lost: {}", entries.len(), err);
                    self.record_dropped(entries.len());
                    return 0;
                }
            }
        }
    }

    /// Batch write throughput over the current rate bucket.
    pub fn writes_per_second(&self) -> i64 {
        self.writes.per_second(self.clock.now())
    }

    fn record_written(&self, written: usize) {
        let now = self.clock.now();
        self.writes.hit_many(now, written as u64);
        self.metrics
            .set_gauge(WRITES_PER_SECOND, self.writes.per_second(now));
    }

    fn record_dropped(&self, dropped: usize) {
        self.metrics.add_counter(DROPPED_ENTRIES, dropped as u64);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{ManualClock, MemoryStore, Metrics, StoreError, StoreErrorKind, StoreOp};

    struct Fixture {
        store: Arc<MemoryStore>,
        clock: Arc<ManualClock>,
        metrics: Arc<Metrics>,
        writer: BatchWriter,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::new(0));
        let metrics = Arc::new(Metrics::new());
        let writer = BatchWriter::new(
            store.clone(),
            clock.clone(),
            metrics.clone(),
            &IngestConfig::default(),
        );
        Fixture {
            store,
            clock,
            metrics,
            writer,
        }
    }

    fn entries(n: usize) -> Vec<BatchEntry> {
        (0..n)
            .map(|i| {
                crate::core::Measurement::numeric(1, i as f64, i as i64)
                    .batch_entry(|v| v)
                    .unwrap()
            })
            .collect()
    }

    #[test]
    fn test_writes_whole_chunk() {
        let f = fixture();
        assert_eq!(f.writer.write_batch(&entries(25)), 25);
        assert_eq!(f.store.sample_count(), 25);
        assert!(f.clock.sleeps().is_empty());
    }

    #[test]
    fn test_empty_chunk_is_noop() {
        let f = fixture();
        assert_eq!(f.writer.write_batch(&[]), 0);
        assert_eq!(f.store.calls(StoreOp::InsertBatch), 0);
    }

    #[test]
    fn test_transient_exhaustion_drops_chunk() {
        let f = fixture();
        f.store.fail_next(
            StoreOp::InsertBatch,
            (0..11).map(|_| StoreError::new(StoreErrorKind::ConnectionUnavailable, "down")),
        );
        assert_eq!(f.writer.write_batch(&entries(4)), 0);
        assert_eq!(f.store.calls(StoreOp::InsertBatch), 11);
        assert_eq!(f.clock.sleeps().len(), 10);
        // 100 + 200 + ... + 1000
        assert_eq!(f.clock.total_slept(), Duration::from_millis(5_500));
        assert_eq!(f.metrics.counter(DROPPED_ENTRIES), 4);
        assert_eq!(f.store.sample_count(), 0);
    }

    #[test]
    fn test_permanent_failure_not_retried() {
        let f = fixture();
        f.store
            .fail_next(StoreOp::InsertBatch, [StoreError::new(StoreErrorKind::Constraint, "dup")]);
        assert_eq!(f.writer.write_batch(&entries(3)), 0);
        assert_eq!(f.store.calls(StoreOp::InsertBatch), 1);
        assert!(f.clock.sleeps().is_empty());
        assert_eq!(f.metrics.counter(DROPPED_ENTRIES), 3);
    }
}
