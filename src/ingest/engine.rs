//! Ingestion entry points.
//!
//! Single measurements take either the synchronous single-row path or the
//! asynchronous write-behind path; streams are chunked into multi-row
//! inserts. Values that cannot be batched (text, images, annotated values)
//! always take the single-row path.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::core::metrics::{
    ASYNC_WRITES_PER_SECOND, RECOVERY_QUEUE_DEPTH, SYNC_WRITES_PER_SECOND,
};
use crate::core::{
    BatchEntry, Clock, EventRate, Executor, Measurement, MeasurementStore, MetricsSink,
    NoopMetrics, Result, SystemClock, UnsavedMeasurement,
};
use crate::ingest::{BatchWriter, IngestConfig, WriteBehindPool};

/// Result of handing one measurement to the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// Written to the store before returning.
    Persisted,
    /// Accepted by the write-behind queue.
    Queued,
    /// Transient failures exhausted the retries; parked on the recovery queue.
    Deferred,
    /// Permanent failure; the measurement is gone.
    Dropped,
}

/// Tally of one `write_stream` call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamSummary {
    /// Rows written through multi-row inserts.
    pub batched: usize,
    /// Rows of chunks dropped by the batch writer.
    pub batch_dropped: usize,
    /// Single-row writes that succeeded.
    pub persisted: usize,
    pub deferred: usize,
    pub dropped: usize,
}

impl StreamSummary {
    fn record(&mut self, outcome: WriteOutcome) {
        match outcome {
            WriteOutcome::Persisted => self.persisted += 1,
            WriteOutcome::Deferred => self.deferred += 1,
            WriteOutcome::Dropped => self.dropped += 1,
            WriteOutcome::Queued => {}
        }
    }

    pub fn written(&self) -> usize {
        self.batched + self.persisted
    }
}

/// Point-in-time view of the engine for monitoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IngestStats {
    pub sync_writes_per_second: i64,
    pub async_writes_per_second: i64,
    pub writes_per_second: i64,
    pub queue_depth: usize,
    pub workers: usize,
    pub recovery_depth: usize,
}

pub struct IngestEngine {
    store: Arc<dyn MeasurementStore>,
    clock: Arc<dyn Clock>,
    metrics: Arc<dyn MetricsSink>,
    writer: Arc<BatchWriter>,
    pool: WriteBehindPool,
    recovery: Mutex<VecDeque<UnsavedMeasurement>>,
    sync_retries: u32,
    batch_insert_size: usize,
    sync_calls: EventRate,
    async_calls: EventRate,
}

impl IngestEngine {
    /// Engine on the wall clock with metrics discarded.
    pub fn new(
        store: Arc<dyn MeasurementStore>,
        executor: Arc<dyn Executor>,
        config: IngestConfig,
    ) -> Result<Self> {
        Self::with_parts(
            store,
            executor,
            Arc::new(SystemClock),
            Arc::new(NoopMetrics),
            config,
        )
    }

    pub fn with_parts(
        store: Arc<dyn MeasurementStore>,
        executor: Arc<dyn Executor>,
        clock: Arc<dyn Clock>,
        metrics: Arc<dyn MetricsSink>,
        config: IngestConfig,
    ) -> Result<Self> {
        config.validate()?;
        let writer = Arc::new(BatchWriter::new(
            Arc::clone(&store),
            Arc::clone(&clock),
            Arc::clone(&metrics),
            &config,
        ));
        let pool = WriteBehindPool::new(
            Arc::clone(&writer),
            executor,
            Arc::clone(&clock),
            Arc::clone(&metrics),
            &config,
        );
        Ok(Self {
            store,
            clock,
            metrics,
            writer,
            pool,
            recovery: Mutex::new(VecDeque::new()),
            sync_retries: config.sync_retries,
            batch_insert_size: config.batch_insert_size,
            sync_calls: EventRate::new(config.rate_bucket_ms, config.rate_buckets),
            async_calls: EventRate::new(config.rate_bucket_ms, config.rate_buckets),
        })
    }

    /// Writes one measurement before returning.
    ///
    /// Measurements parked by earlier calls are retried first. This call
    /// never fails; the outcome says what happened to the value.
    pub fn write_sync(&self, measurement: Measurement) -> WriteOutcome {
        self.drain_recovery();
        self.hit_sync(1);
        self.persist(UnsavedMeasurement {
            measurement,
            attempts: 0,
        })
    }

    /// Queues a measurement for the write-behind pool if it can be batched,
    /// otherwise writes it synchronously.
    ///
    /// Fails only when the pool could not schedule a needed worker.
    pub fn write_async(&self, measurement: Measurement) -> Result<WriteOutcome> {
        match self.batch_entry(&measurement) {
            Some(entry) => {
                self.pool.enqueue(entry)?;
                self.hit_async(1);
                Ok(WriteOutcome::Queued)
            }
            None => Ok(self.write_sync(measurement)),
        }
    }

    /// Writes a stream in multi-row chunks of `batch_insert_size`.
    ///
    /// Values that cannot be batched are written one by one as they are
    /// encountered, so relative order only holds within each path.
    pub fn write_stream<I>(&self, measurements: I) -> StreamSummary
    where
        I: IntoIterator<Item = Measurement>,
    {
        let mut summary = StreamSummary::default();
        let mut chunk: Vec<BatchEntry> = Vec::with_capacity(self.batch_insert_size);
        for measurement in measurements {
            match self.batch_entry(&measurement) {
                Some(entry) => {
                    chunk.push(entry);
                    if chunk.len() >= self.batch_insert_size {
                        self.write_chunk(&mut chunk, &mut summary);
                    }
                }
                None => {
                    let outcome = self.write_sync(measurement);
                    summary.record(outcome);
                }
            }
        }
        if !chunk.is_empty() {
            self.write_chunk(&mut chunk, &mut summary);
        }
        summary
    }

    /// Blocks until the write-behind queue has been seen empty.
    pub fn flush(&self) {
        self.pool.flush();
    }

    pub fn pool(&self) -> &WriteBehindPool {
        &self.pool
    }

    pub fn recovery_len(&self) -> usize {
        self.recovery_queue().len()
    }

    pub fn stats(&self) -> IngestStats {
        let now = self.clock.now();
        let (queue_depth, workers) = self.pool.snapshot();
        IngestStats {
            sync_writes_per_second: self.sync_calls.per_second(now),
            async_writes_per_second: self.async_calls.per_second(now),
            writes_per_second: self.writer.writes_per_second(),
            queue_depth,
            workers,
            recovery_depth: self.recovery_len(),
        }
    }

    fn batch_entry(&self, measurement: &Measurement) -> Option<BatchEntry> {
        measurement.batch_entry(|value| self.store.apply_bounds(value))
    }

    fn write_chunk(&self, chunk: &mut Vec<BatchEntry>, summary: &mut StreamSummary) {
        let written = self.writer.write_batch(chunk);
        summary.batched += written;
        summary.batch_dropped += chunk.len() - written;
        self.hit_sync(written as u64);
        chunk.clear();
    }

    fn persist(&self, mut unsaved: UnsavedMeasurement) -> WriteOutcome {
        let bounded = unsaved
            .measurement
            .bounded(|value| self.store.apply_bounds(value));
        let mut retries = 0;
        loop {
            unsaved.attempts += 1;
            match self.store.insert(&bounded) {
                Ok(()) => return WriteOutcome::Persisted,
                Err(err) if err.is_transient() => {
                    if retries >= self.sync_retries {
                        log::warn!(
                            "saving value for series {} at {} failed after {} attempts, deferring: {}",
                            bounded.series_id,
                            bounded.timestamp,
                            unsaved.attempts,
                            err
                        );
                        self.defer(unsaved);
                        return WriteOutcome::Deferred;
                    }
                    retries += 1;
                }
                Err(err) => {
                    log::error!(
                        "error saving value for series {} at {}, value lost: {}",
                        bounded.series_id,
                        bounded.timestamp,
                        err
                    );
                    return WriteOutcome::Dropped;
                }
            }
        }
    }

    /// Retries the measurements parked when this drain started, oldest first.
    fn drain_recovery(&self) {
        let pending = self.recovery_queue().len();
        for _ in 0..pending {
            let next = self.recovery_queue().pop_front();
            let Some(unsaved) = next else {
                break;
            };
            self.publish_recovery_depth();
            self.persist(unsaved);
        }
    }

    fn defer(&self, unsaved: UnsavedMeasurement) {
        self.recovery_queue().push_back(unsaved);
        self.publish_recovery_depth();
    }

    fn recovery_queue(&self) -> MutexGuard<'_, VecDeque<UnsavedMeasurement>> {
        self.recovery.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish_recovery_depth(&self) {
        let depth = self.recovery_queue().len();
        self.metrics.set_gauge(RECOVERY_QUEUE_DEPTH, depth as i64);
    }

    fn hit_sync(&self, events: u64) {
        let now = self.clock.now();
        self.sync_calls.hit_many(now, events);
        self.metrics
            .set_gauge(SYNC_WRITES_PER_SECOND, self.sync_calls.per_second(now));
    }

    fn hit_async(&self, events: u64) {
        let now = self.clock.now();
        self.async_calls.hit_many(now, events);
        self.metrics
            .set_gauge(ASYNC_WRITES_PER_SECOND, self.async_calls.per_second(now));
    }
}
