//! In-process [`MeasurementStore`] used by tests, the CLI and benchmarks.
//!
//! Samples are kept per series in timestamp order. Failures can be queued per
//! operation with [`MemoryStore::fail_next`] to exercise the retry paths.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::ops::Range;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, RwLock};
use std::time::Duration;

use crate::core::aggregate::{rollup, AggregateValue};
use crate::core::error::StoreError;
use crate::core::measurement::{BatchEntry, Measurement, SeriesDescriptor, SeriesId};
use crate::core::store::{
    MeasurementStore, SampleChunks, SeriesDirectory, StoreResult, TimeOrder, ValueBounds,
};
use crate::core::Result;

/// Operations that can have failures injected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    Insert,
    InsertBatch,
    Write,
    Query,
    EarliestSample,
    AggregateQuery,
    AggregateWrite,
}

type AggregateKey = (SeriesId, u128);

#[derive(Default)]
pub struct MemoryStore {
    samples: RwLock<BTreeMap<SeriesId, Vec<Measurement>>>,
    aggregates: RwLock<BTreeMap<AggregateKey, BTreeMap<i64, AggregateValue>>>,
    bounds: ValueBounds,
    failures: Mutex<HashMap<StoreOp, VecDeque<StoreError>>>,
    calls: Mutex<HashMap<StoreOp, usize>>,
    rows_written: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_bounds(bounds: ValueBounds) -> Self {
        Self {
            bounds,
            ..Self::default()
        }
    }

    /// Queue errors to be returned by the next calls of `op`, one per call.
    pub fn fail_next(&self, op: StoreOp, errors: impl IntoIterator<Item = StoreError>) {
        if let Ok(mut failures) = self.failures.lock() {
            failures.entry(op).or_default().extend(errors);
        }
    }

    /// How many times `op` has been invoked, failed calls included.
    pub fn calls(&self, op: StoreOp) -> usize {
        self.calls
            .lock()
            .map(|calls| calls.get(&op).copied().unwrap_or(0))
            .unwrap_or(0)
    }

    /// Total rows written through any write path.
    pub fn rows_written(&self) -> usize {
        self.rows_written.load(Ordering::Relaxed)
    }

    pub fn samples(&self, series: SeriesId) -> Vec<Measurement> {
        self.samples
            .read()
            .map(|samples| samples.get(&series).cloned().unwrap_or_default())
            .unwrap_or_default()
    }

    pub fn sample_count(&self) -> usize {
        self.samples
            .read()
            .map(|samples| samples.values().map(Vec::len).sum())
            .unwrap_or(0)
    }

    /// Rollups previously stored through `aggregate_write`.
    pub fn stored_aggregates(&self, series: SeriesId, interval: Duration) -> Vec<AggregateValue> {
        self.aggregates
            .read()
            .map(|aggs| {
                aggs.get(&(series, interval.as_millis()))
                    .map(|values| values.values().copied().collect())
                    .unwrap_or_default()
            })
            .unwrap_or_default()
    }

    fn enter(&self, op: StoreOp) -> StoreResult<()> {
        if let Ok(mut calls) = self.calls.lock() {
            *calls.entry(op).or_insert(0) += 1;
        }
        let injected = self
            .failures
            .lock()
            .ok()
            .and_then(|mut failures| failures.get_mut(&op).and_then(VecDeque::pop_front));
        match injected {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn poisoned() -> StoreError {
        StoreError::permanent("memory store lock poisoned")
    }

    fn push_all<I>(&self, rows: I) -> StoreResult<usize>
    where
        I: IntoIterator<Item = Measurement>,
    {
        let mut samples = self.samples.write().map_err(|_| Self::poisoned())?;
        let mut count = 0;
        for row in rows {
            let series = samples.entry(row.series_id).or_default();
            let at = series.partition_point(|m| m.timestamp <= row.timestamp);
            series.insert(at, row);
            count += 1;
        }
        self.rows_written.fetch_add(count, Ordering::Relaxed);
        Ok(count)
    }

    fn chunk(
        &self,
        series: SeriesId,
        range: &Range<i64>,
        order: TimeOrder,
        offset: usize,
        limit: usize,
    ) -> StoreResult<Vec<Measurement>> {
        let samples = self.samples.read().map_err(|_| Self::poisoned())?;
        let Some(rows) = samples.get(&series) else {
            return Ok(Vec::new());
        };
        let lo = rows.partition_point(|m| m.timestamp < range.start);
        let hi = rows.partition_point(|m| m.timestamp < range.end);
        let window = &rows[lo..hi.max(lo)];
        let chunk = match order {
            TimeOrder::Ascending => window.iter().skip(offset).take(limit).cloned().collect(),
            TimeOrder::Descending => window.iter().rev().skip(offset).take(limit).cloned().collect(),
        };
        Ok(chunk)
    }
}

impl MeasurementStore for MemoryStore {
    fn apply_bounds(&self, value: f64) -> f64 {
        self.bounds.apply(value)
    }

    fn insert(&self, measurement: &Measurement) -> StoreResult<()> {
        self.enter(StoreOp::Insert)?;
        self.push_all(std::iter::once(measurement.clone()))?;
        Ok(())
    }

    fn insert_batch(&self, entries: &[BatchEntry]) -> StoreResult<usize> {
        self.enter(StoreOp::InsertBatch)?;
        self.push_all(entries.iter().map(|entry| entry.into_measurement()))
    }

    fn write(&self, batch: &[Measurement]) -> StoreResult<usize> {
        self.enter(StoreOp::Write)?;
        self.push_all(batch.iter().cloned())
    }

    fn query(
        &self,
        series: SeriesId,
        range: Range<i64>,
        order: TimeOrder,
        chunk_size: usize,
    ) -> StoreResult<SampleChunks<'_>> {
        self.enter(StoreOp::Query)?;
        let limit = chunk_size.max(1);
        let mut offset = 0;
        let mut done = false;
        Ok(Box::new(std::iter::from_fn(move || {
            if done {
                return None;
            }
            match self.chunk(series, &range, order, offset, limit) {
                Ok(chunk) if chunk.is_empty() => None,
                Ok(chunk) => {
                    offset += chunk.len();
                    done = chunk.len() < limit;
                    Some(Ok(chunk))
                }
                Err(err) => {
                    done = true;
                    Some(Err(err))
                }
            }
        })))
    }

    fn earliest_sample(&self, series: SeriesId) -> StoreResult<Option<i64>> {
        self.enter(StoreOp::EarliestSample)?;
        let samples = self.samples.read().map_err(|_| Self::poisoned())?;
        Ok(samples
            .get(&series)
            .and_then(|rows| rows.first())
            .map(|m| m.timestamp))
    }

    fn aggregate_query(
        &self,
        series: SeriesId,
        interval: Duration,
        range: Range<i64>,
    ) -> StoreResult<Vec<AggregateValue>> {
        self.enter(StoreOp::AggregateQuery)?;
        let interval_ms = (interval.as_millis() as i64).max(1);
        let raw = self.chunk(series, &range, TimeOrder::Ascending, 0, usize::MAX)?;
        let mut merged: BTreeMap<i64, AggregateValue> = rollup(
            raw.iter()
                .filter_map(|m| m.value.as_f64().map(|v| (m.timestamp, v))),
            interval_ms,
        )
        .into_iter()
        .map(|agg| (agg.period_start, agg))
        .collect();

        let aggregates = self.aggregates.read().map_err(|_| Self::poisoned())?;
        let stored = aggregates
            .get(&(series, interval.as_millis()))
            .filter(|_| range.start < range.end);
        if let Some(stored) = stored {
            for (start, agg) in stored.range(range.start..range.end) {
                merged
                    .entry(*start)
                    .and_modify(|existing| existing.merge(agg))
                    .or_insert(*agg);
            }
        }
        Ok(merged.into_values().collect())
    }

    fn aggregate_write(
        &self,
        series: SeriesId,
        interval: Duration,
        values: &[AggregateValue],
        chunk_size: usize,
    ) -> StoreResult<usize> {
        let mut written = 0;
        for chunk in values.chunks(chunk_size.max(1)) {
            self.enter(StoreOp::AggregateWrite)?;
            let mut aggregates = self.aggregates.write().map_err(|_| Self::poisoned())?;
            let stored = aggregates.entry((series, interval.as_millis())).or_default();
            for agg in chunk {
                stored.insert(agg.period_start, *agg);
            }
            written += chunk.len();
        }
        self.rows_written.fetch_add(written, Ordering::Relaxed);
        Ok(written)
    }
}

/// Descriptor registry backed by a map.
#[derive(Default)]
pub struct MemoryDirectory {
    series: RwLock<HashMap<SeriesId, SeriesDescriptor>>,
}

impl MemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, descriptor: SeriesDescriptor) {
        if let Ok(mut series) = self.series.write() {
            series.insert(descriptor.series_id, descriptor);
        }
    }
}

impl SeriesDirectory for MemoryDirectory {
    fn descriptor(&self, series_id: SeriesId) -> Result<Option<SeriesDescriptor>> {
        let series = self
            .series
            .read()
            .map_err(|_| StoreError::permanent("directory lock poisoned"))?;
        Ok(series.get(&series_id).cloned())
    }
}
