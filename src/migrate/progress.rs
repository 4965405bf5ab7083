//! Reporting of per-run migration progress.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use crate::core::metrics::SAMPLES_MIGRATED;
use crate::core::{MetricsSink, SeriesId};
use crate::migrate::{MigrationProgress, MigrationStatus};

/// Receives the outcome of every `MigrationSeries::run`.
pub trait ProgressSink: Send + Sync {
    fn update_progress(&self, progress: &MigrationProgress, samples: u64, duration: Duration);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoopProgress;

impl ProgressSink for NoopProgress {
    fn update_progress(&self, _progress: &MigrationProgress, _samples: u64, _duration: Duration) {}
}

/// Latest progress and running totals per series.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeriesTotals {
    pub progress: MigrationProgress,
    pub samples: u64,
    pub runs: u64,
    pub elapsed: Duration,
}

/// Aggregates progress across series and feeds the metrics sink.
pub struct ProgressTracker {
    series: Mutex<BTreeMap<SeriesId, SeriesTotals>>,
    metrics: Arc<dyn MetricsSink>,
}

impl ProgressTracker {
    pub fn new(metrics: Arc<dyn MetricsSink>) -> Self {
        Self {
            series: Mutex::new(BTreeMap::new()),
            metrics,
        }
    }

    pub fn get(&self, series_id: SeriesId) -> Option<SeriesTotals> {
        self.series
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&series_id)
            .copied()
    }

    pub fn total_samples(&self) -> u64 {
        self.series
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .map(|totals| totals.samples)
            .sum()
    }

    /// Number of series currently in each status.
    pub fn status_counts(&self) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for totals in self
            .series
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
        {
            *counts.entry(totals.progress.status.to_string()).or_insert(0) += 1;
        }
        counts
    }

    pub fn all_terminal(&self) -> bool {
        self.series
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .all(|totals| totals.progress.status.is_terminal())
    }
}

impl ProgressSink for ProgressTracker {
    fn update_progress(&self, progress: &MigrationProgress, samples: u64, duration: Duration) {
        self.metrics.add_counter(SAMPLES_MIGRATED, samples);
        let mut series = self.series.lock().unwrap_or_else(PoisonError::into_inner);
        let totals = series.entry(progress.series_id).or_insert(SeriesTotals {
            progress: *progress,
            samples: 0,
            runs: 0,
            elapsed: Duration::ZERO,
        });
        totals.progress = *progress;
        totals.samples += samples;
        totals.runs += 1;
        totals.elapsed += duration;
        if progress.status == MigrationStatus::Error {
            log::warn!("series {} is in error after {} runs", progress.series_id, totals.runs);
        }
    }
}
