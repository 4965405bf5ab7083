//! Synthetic point values for benchmarks and migration dry runs.

use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::core::{Measurement, SeriesId};

/// Produces numeric measurements at a fixed period, uniformly distributed in
/// `[minimum, maximum)`.
#[derive(Debug, Clone)]
pub struct RandomPointValueGenerator {
    start: i64,
    end: Option<i64>,
    period_ms: i64,
    minimum: f64,
    maximum: f64,
    seed: Option<u64>,
}

impl RandomPointValueGenerator {
    /// Values in `[0, 100)` starting at `start`, without an end.
    pub fn new(start: i64, period: Duration) -> Self {
        Self {
            start,
            end: None,
            period_ms: (period.as_millis() as i64).max(1),
            minimum: 0.0,
            maximum: 100.0,
            seed: None,
        }
    }

    /// Stops before `end` (exclusive).
    pub fn until(mut self, end: i64) -> Self {
        self.end = Some(end);
        self
    }

    pub fn with_range(mut self, minimum: f64, maximum: f64) -> Self {
        self.minimum = minimum;
        self.maximum = maximum;
        self
    }

    /// Makes the generated values reproducible.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn values(&self, series_id: SeriesId) -> RandomPointValues {
        let rng = match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed ^ series_id as u64),
            None => StdRng::from_os_rng(),
        };
        RandomPointValues {
            series_id,
            timestamp: self.start,
            end: self.end,
            period_ms: self.period_ms,
            minimum: self.minimum,
            span: self.maximum - self.minimum,
            rng,
        }
    }
}

/// Iterator over the values of one series.
#[derive(Debug)]
pub struct RandomPointValues {
    series_id: SeriesId,
    timestamp: i64,
    end: Option<i64>,
    period_ms: i64,
    minimum: f64,
    span: f64,
    rng: StdRng,
}

impl RandomPointValues {
    /// Timestamp of the next value.
    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }

    pub fn set_timestamp(&mut self, timestamp: i64) {
        self.timestamp = timestamp;
    }
}

impl Iterator for RandomPointValues {
    type Item = Measurement;

    fn next(&mut self) -> Option<Measurement> {
        if self.end.is_some_and(|end| self.timestamp >= end) {
            return None;
        }
        let value = self.rng.random::<f64>() * self.span + self.minimum;
        let measurement = Measurement::numeric(self.series_id, value, self.timestamp);
        self.timestamp = self.timestamp.checked_add(self.period_ms)?;
        Some(measurement)
    }
}
