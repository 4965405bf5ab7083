//! The storage capability the engine and the migration are layered on.

use std::ops::Range;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::aggregate::AggregateValue;
use crate::core::error::StoreError;
use crate::core::measurement::{BatchEntry, Measurement, SeriesDescriptor, SeriesId};
use crate::core::Result;

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Lazily fetched chunks of samples.
pub type SampleChunks<'a> = Box<dyn Iterator<Item = StoreResult<Vec<Measurement>>> + 'a>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimeOrder {
    #[default]
    Ascending,
    Descending,
}

/// Durable backend holding point values per series.
///
/// Time ranges are half open: `from` inclusive, `to` exclusive.
pub trait MeasurementStore: Send + Sync {
    /// Backend-specific bounding of numeric values before they are written.
    fn apply_bounds(&self, value: f64) -> f64 {
        value
    }

    /// Single-row insert of any value kind, annotation included.
    fn insert(&self, measurement: &Measurement) -> StoreResult<()>;

    /// Multi-row insert; all rows are written or none are.
    fn insert_batch(&self, entries: &[BatchEntry]) -> StoreResult<usize>;

    /// Writes full measurements, returning how many were written.
    fn write(&self, batch: &[Measurement]) -> StoreResult<usize> {
        for measurement in batch {
            self.insert(measurement)?;
        }
        Ok(batch.len())
    }

    /// Streams samples of `series` in `range`, `chunk_size` at a time.
    fn query(
        &self,
        series: SeriesId,
        range: Range<i64>,
        order: TimeOrder,
        chunk_size: usize,
    ) -> StoreResult<SampleChunks<'_>>;

    /// Timestamp of the oldest sample of `series`, if it has any.
    fn earliest_sample(&self, series: SeriesId) -> StoreResult<Option<i64>>;

    /// Rollups of `series` over `range` at `interval`.
    fn aggregate_query(
        &self,
        series: SeriesId,
        interval: Duration,
        range: Range<i64>,
    ) -> StoreResult<Vec<AggregateValue>>;

    /// Stores rollups of `series` at `interval`, `chunk_size` per write.
    fn aggregate_write(
        &self,
        series: SeriesId,
        interval: Duration,
        values: &[AggregateValue],
        chunk_size: usize,
    ) -> StoreResult<usize>;
}

/// Resolves series descriptors by id.
pub trait SeriesDirectory: Send + Sync {
    fn descriptor(&self, series_id: SeriesId) -> Result<Option<SeriesDescriptor>>;
}

/// Clamp applied to numeric values by backends that cannot store the full
/// `f64` range.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ValueBounds {
    pub min: f64,
    pub max: f64,
}

impl ValueBounds {
    pub const UNBOUNDED: ValueBounds = ValueBounds {
        min: f64::MIN,
        max: f64::MAX,
    };

    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    /// NaN is stored as zero; everything else is clamped.
    pub fn apply(&self, value: f64) -> f64 {
        if value.is_nan() {
            0.0
        } else {
            value.clamp(self.min, self.max)
        }
    }
}

impl Default for ValueBounds {
    fn default() -> Self {
        Self::UNBOUNDED
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bounds_clamp() {
        let bounds = ValueBounds::new(-10.0, 10.0);
        assert_eq!(bounds.apply(42.0), 10.0);
        assert_eq!(bounds.apply(-42.0), -10.0);
        assert_eq!(bounds.apply(3.5), 3.5);
        assert_eq!(bounds.apply(f64::NAN), 0.0);
    }

    #[test]
    fn test_unbounded_clamps_infinity() {
        assert_eq!(ValueBounds::UNBOUNDED.apply(f64::INFINITY), f64::MAX);
        assert_eq!(ValueBounds::UNBOUNDED.apply(f64::NEG_INFINITY), f64::MIN);
    }
}
