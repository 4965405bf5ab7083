use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

struct Bucket {
    index: AtomicI64,
    count: AtomicU64,
}

/// Event counts over a ring of fixed-width time buckets.
///
/// Lock free; a hit racing a bucket rollover may be lost, which only skews
/// the reported rate.
pub struct EventRate {
    bucket_ms: i64,
    buckets: Box<[Bucket]>,
}

impl EventRate {
    pub fn new(bucket_ms: u64, buckets: usize) -> Self {
        let buckets = (0..buckets.max(1))
            .map(|_| Bucket {
                index: AtomicI64::new(i64::MIN),
                count: AtomicU64::new(0),
            })
            .collect();
        Self {
            bucket_ms: (bucket_ms as i64).max(1),
            buckets,
        }
    }

    pub fn hit(&self, now: i64) {
        self.hit_many(now, 1);
    }

    pub fn hit_many(&self, now: i64, events: u64) {
        if events == 0 {
            return;
        }
        let index = now.div_euclid(self.bucket_ms);
        let bucket = self.bucket(index);
        let seen = bucket.index.load(Ordering::Acquire);
        if seen != index
            && bucket
                .index
                .compare_exchange(seen, index, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
        {
            bucket.count.store(0, Ordering::Release);
        }
        bucket.count.fetch_add(events, Ordering::AcqRel);
    }

    /// Counts per bucket, newest first; stale buckets read as zero.
    pub fn counts(&self, now: i64) -> Vec<u64> {
        let current = now.div_euclid(self.bucket_ms);
        (0..self.buckets.len() as i64)
            .map(|age| {
                let index = current - age;
                let bucket = self.bucket(index);
                if bucket.index.load(Ordering::Acquire) == index {
                    bucket.count.load(Ordering::Acquire)
                } else {
                    0
                }
            })
            .collect()
    }

    /// Events per second in the current bucket.
    pub fn per_second(&self, now: i64) -> i64 {
        let current = self.counts(now).first().copied().unwrap_or(0) as i64;
        current * 1000 / self.bucket_ms
    }

    fn bucket(&self, index: i64) -> &Bucket {
        &self.buckets[index.rem_euclid(self.buckets.len() as i64) as usize]
    }
}
