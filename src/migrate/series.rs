//! Per-series migration state machine.

use std::ops::Range;
use std::sync::atomic::{AtomicI64, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock, RwLockReadGuard, TryLockError};
use std::time::{Duration, Instant};

use crate::core::{
    Clock, DataKind, Error, MeasurementStore, Memoized, Result, SeriesDescriptor,
    SeriesDirectory, SeriesId, SystemClock, TimeOrder,
};
use crate::migrate::{
    MigrationConfig, MigrationProgress, MigrationStatus, NoopProgress, ProgressSink, RetryPolicy,
};

const NO_WATERMARK: i64 = i64::MIN;

type SeriesFilter = Box<dyn Fn(&SeriesDescriptor) -> bool + Send + Sync>;

/// Everything shared by the series of one migration.
pub struct MigrationContext {
    source: Arc<dyn MeasurementStore>,
    destination: Arc<dyn MeasurementStore>,
    directory: Arc<dyn SeriesDirectory>,
    clock: Arc<dyn Clock>,
    retry: RetryPolicy,
    progress: Arc<dyn ProgressSink>,
    filter: SeriesFilter,
    config: MigrationConfig,
}

impl MigrationContext {
    pub fn new(
        source: Arc<dyn MeasurementStore>,
        destination: Arc<dyn MeasurementStore>,
        directory: Arc<dyn SeriesDirectory>,
        config: MigrationConfig,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            source,
            destination,
            directory,
            clock: Arc::new(SystemClock),
            retry: RetryPolicy::from_config(&config),
            progress: Arc::new(NoopProgress),
            filter: Box::new(|_| true),
            config,
        })
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_progress(mut self, progress: Arc<dyn ProgressSink>) -> Self {
        self.progress = progress;
        self
    }

    /// Series rejected by `filter` end up `Skipped`.
    pub fn with_filter<F>(mut self, filter: F) -> Self
    where
        F: Fn(&SeriesDescriptor) -> bool + Send + Sync + 'static,
    {
        self.filter = Box::new(filter);
        self
    }

    pub fn config(&self) -> &MigrationConfig {
        &self.config
    }
}

/// Copies one series from the source store to the destination, one period
/// per [`run`](Self::run).
///
/// Steps are serialized by an internal mutex. The initial pass and the
/// final close-out period additionally hold the write side of the boundary
/// lock, so live writers that take [`live_write_guard`](Self::live_write_guard)
/// never observe the series half-migrated.
pub struct MigrationSeries {
    series_id: SeriesId,
    context: Arc<MigrationContext>,
    run_lock: Mutex<()>,
    boundary: RwLock<()>,
    status: AtomicU8,
    watermark: AtomicI64,
    descriptor: Memoized<SeriesDescriptor>,
}

impl MigrationSeries {
    pub fn new(context: Arc<MigrationContext>, series_id: SeriesId) -> Self {
        Self::resume(context, series_id, MigrationStatus::NotStarted, None)
    }

    /// Restores a series from previously reported progress.
    pub fn resume(
        context: Arc<MigrationContext>,
        series_id: SeriesId,
        status: MigrationStatus,
        watermark: Option<i64>,
    ) -> Self {
        Self {
            series_id,
            context,
            run_lock: Mutex::new(()),
            boundary: RwLock::new(()),
            status: AtomicU8::new(status as u8),
            watermark: AtomicI64::new(watermark.unwrap_or(NO_WATERMARK)),
            descriptor: Memoized::new(),
        }
    }

    pub fn series_id(&self) -> SeriesId {
        self.series_id
    }

    pub fn status(&self) -> MigrationStatus {
        MigrationStatus::from_u8(self.status.load(Ordering::Acquire))
    }

    pub fn watermark(&self) -> Option<i64> {
        match self.watermark.load(Ordering::Acquire) {
            NO_WATERMARK => None,
            ts => Some(ts),
        }
    }

    pub fn progress(&self) -> MigrationProgress {
        MigrationProgress {
            series_id: self.series_id,
            status: self.status(),
            watermark: self.watermark(),
        }
    }

    /// Whether live writes must also go to the destination store.
    ///
    /// Waits for an in-flight initial pass or close-out to finish.
    pub fn is_migrated(&self) -> bool {
        let _guard = self.boundary.read().unwrap_or_else(PoisonError::into_inner);
        self.status() == MigrationStatus::Migrated
    }

    /// Held by live writers for the duration of a write to this series.
    pub fn live_write_guard(&self) -> RwLockReadGuard<'_, ()> {
        self.boundary.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// `None` while an initial pass or close-out holds the boundary.
    pub fn try_live_write_guard(&self) -> Option<RwLockReadGuard<'_, ()>> {
        match self.boundary.try_read() {
            Ok(guard) => Some(guard),
            Err(TryLockError::Poisoned(poisoned)) => Some(poisoned.into_inner()),
            Err(TryLockError::WouldBlock) => None,
        }
    }

    /// Drops the cached descriptor so the next step re-reads it.
    pub fn invalidate_descriptor(&self) {
        self.descriptor.invalidate();
    }

    /// Executes one bounded step and returns how many samples it copied.
    ///
    /// A no-op once the series is terminal. Errors that survive the retry
    /// policy leave the series in `Error` with its watermark untouched.
    pub fn run(&self) -> u64 {
        let _step = self.run_lock.lock().unwrap_or_else(PoisonError::into_inner);
        if self.status().is_terminal() {
            return 0;
        }

        let started = Instant::now();
        let retry = self.context.retry;
        let samples = match retry.execute(self.context.clock.as_ref(), || self.step()) {
            Ok(samples) => samples,
            Err(err) => {
                log::error!("migration of series {} failed: {}", self.series_id, err);
                self.set_status(MigrationStatus::Error);
                0
            }
        };

        self.context
            .progress
            .update_progress(&self.progress(), samples, started.elapsed());
        samples
    }

    fn step(&self) -> Result<u64> {
        let descriptor = self.descriptor()?;
        if self.status() == MigrationStatus::NotStarted || self.watermark().is_none() {
            self.initial_pass(&descriptor)?;
            return Ok(0);
        }
        self.migrate_next_period(&descriptor)
    }

    fn initial_pass(&self, descriptor: &SeriesDescriptor) -> Result<()> {
        if !(self.context.filter)(descriptor) {
            log::debug!("series {} ({}) skipped", self.series_id, descriptor.name);
            self.set_status(MigrationStatus::Skipped);
            return Ok(());
        }

        let _boundary = self.boundary.write().unwrap_or_else(PoisonError::into_inner);
        match self.context.source.earliest_sample(self.series_id)? {
            Some(earliest) => {
                let start = match self.context.config.migrate_from {
                    Some(floor) => earliest.max(floor),
                    None => earliest,
                };
                self.advance(start);
                self.set_status(MigrationStatus::InitialPassComplete);
                log::debug!("series {} starts migrating at {}", self.series_id, start);
            }
            None => {
                log::debug!("series {} has no data", self.series_id);
                self.set_status(MigrationStatus::NoData);
            }
        }
        Ok(())
    }

    fn migrate_next_period(&self, descriptor: &SeriesDescriptor) -> Result<u64> {
        let period = self.context.config.period();
        let watermark = self.watermark().unwrap_or(NO_WATERMARK);
        let period_start = watermark - watermark.rem_euclid(period);
        let to = period_start.saturating_add(period);
        let from = match self.context.config.migrate_from {
            Some(floor) => period_start.max(floor),
            None => period_start,
        };

        if self.context.clock.now() < to {
            // The open period plus one more, so samples written during the
            // close-out itself are covered.
            let _boundary = self.boundary.write().unwrap_or_else(PoisonError::into_inner);
            let end = to.saturating_add(period);
            let samples = self.copy(descriptor, from..end)?;
            self.advance(end);
            self.set_status(MigrationStatus::Migrated);
            log::info!(
                "series {} migrated, {} samples in final period",
                self.series_id,
                samples
            );
            Ok(samples)
        } else {
            let samples = self.copy(descriptor, from..to)?;
            self.advance(to);
            if self.status() == MigrationStatus::Error {
                self.set_status(MigrationStatus::InitialPassComplete);
            }
            Ok(samples)
        }
    }

    fn copy(&self, descriptor: &SeriesDescriptor, range: Range<i64>) -> Result<u64> {
        let config = &self.context.config;
        match (config.aggregation_interval(), descriptor.kind) {
            (Some(interval), DataKind::Numeric) => self.copy_aggregates(interval, range),
            _ => {
                let source = &self.context.source;
                let destination = &self.context.destination;
                let mut copied = 0u64;
                let mut pending = Vec::with_capacity(config.write_chunk_size);
                for chunk in source.query(
                    self.series_id,
                    range,
                    TimeOrder::Ascending,
                    config.read_chunk_size,
                )? {
                    for measurement in chunk? {
                        pending.push(measurement);
                        if pending.len() >= config.write_chunk_size {
                            copied += destination.write(&pending)? as u64;
                            pending.clear();
                        }
                    }
                }
                if !pending.is_empty() {
                    copied += destination.write(&pending)? as u64;
                }
                Ok(copied)
            }
        }
    }

    fn copy_aggregates(&self, interval: Duration, range: Range<i64>) -> Result<u64> {
        let values = self
            .context
            .source
            .aggregate_query(self.series_id, interval, range)?;
        if values.is_empty() {
            return Ok(0);
        }
        let written = self.context.destination.aggregate_write(
            self.series_id,
            interval,
            &values,
            self.context.config.write_chunk_size,
        )?;
        Ok(written as u64)
    }

    fn descriptor(&self) -> Result<Arc<SeriesDescriptor>> {
        self.descriptor.get_or_try_init(|| {
            self.context
                .directory
                .descriptor(self.series_id)?
                .ok_or(Error::SeriesNotFound(self.series_id))
        })
    }

    fn advance(&self, ts: i64) {
        self.watermark.fetch_max(ts, Ordering::AcqRel);
    }

    fn set_status(&self, status: MigrationStatus) {
        self.status.store(status as u8, Ordering::Release);
    }
}
