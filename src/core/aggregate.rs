//! Statistical rollups used when migrating with downsampling.

use serde::{Deserialize, Serialize};

/// Summary of all samples in one aggregation interval.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AggregateValue {
    /// Start of the interval, milliseconds since the UNIX epoch.
    pub period_start: i64,
    pub count: u64,
    pub min: f64,
    pub max: f64,
    pub sum: f64,
    pub first: f64,
    pub last: f64,
}

impl AggregateValue {
    /// An empty aggregate for the interval starting at `period_start`.
    pub fn empty(period_start: i64) -> Self {
        Self {
            period_start,
            count: 0,
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
            sum: 0.0,
            first: 0.0,
            last: 0.0,
        }
    }

    /// Accumulates a value; values must arrive in time order for
    /// `first`/`last` to be meaningful.
    pub fn accumulate(&mut self, value: f64) {
        if self.count == 0 {
            self.min = value;
            self.max = value;
            self.sum = value;
            self.first = value;
            self.last = value;
            self.count = 1;
            return;
        }
        self.min = self.min.min(value);
        self.max = self.max.max(value);
        self.sum += value;
        self.last = value;
        self.count += 1;
    }

    /// Merges a later aggregate for the same interval into this one.
    pub fn merge(&mut self, other: &Self) {
        if other.count == 0 {
            return;
        }
        if self.count == 0 {
            *self = *other;
            return;
        }
        self.min = self.min.min(other.min);
        self.max = self.max.max(other.max);
        self.sum += other.sum;
        self.count += other.count;
        self.last = other.last;
    }

    /// Returns `0.0` if count is zero.
    pub fn average(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.sum / self.count as f64
        }
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }
}

/// Groups time-ordered `(timestamp, value)` samples into aggregates of
/// `interval_ms` aligned to the epoch.
pub fn rollup<I>(samples: I, interval_ms: i64) -> Vec<AggregateValue>
where
    I: IntoIterator<Item = (i64, f64)>,
{
    let mut out: Vec<AggregateValue> = Vec::new();
    for (timestamp, value) in samples {
        let start = timestamp - timestamp.rem_euclid(interval_ms);
        match out.last_mut() {
            Some(current) if current.period_start == start => current.accumulate(value),
            _ => {
                let mut agg = AggregateValue::empty(start);
                agg.accumulate(value);
                out.push(agg);
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accumulate() {
        let mut agg = AggregateValue::empty(0);
        assert!(agg.is_empty());
        agg.accumulate(3.0);
        agg.accumulate(1.0);
        agg.accumulate(5.0);
        assert_eq!(agg.count, 3);
        assert_eq!(agg.min, 1.0);
        assert_eq!(agg.max, 5.0);
        assert_eq!(agg.first, 3.0);
        assert_eq!(agg.last, 5.0);
        assert_eq!(agg.average(), 3.0);
    }

    #[test]
    fn test_merge_keeps_later_last() {
        let mut a = AggregateValue::empty(0);
        a.accumulate(1.0);
        let mut b = AggregateValue::empty(0);
        b.accumulate(9.0);
        a.merge(&b);
        assert_eq!(a.count, 2);
        assert_eq!(a.first, 1.0);
        assert_eq!(a.last, 9.0);
    }

    #[test]
    fn test_rollup_groups_by_interval() {
        let samples = vec![(0, 1.0), (500, 3.0), (1_000, 10.0), (2_500, 4.0)];
        let aggs = rollup(samples, 1_000);
        assert_eq!(aggs.len(), 3);
        assert_eq!(aggs[0].period_start, 0);
        assert_eq!(aggs[0].average(), 2.0);
        assert_eq!(aggs[1].period_start, 1_000);
        assert_eq!(aggs[2].period_start, 2_000);
    }
}
