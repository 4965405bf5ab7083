use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// A source of timestamps and a place to wait.
///
/// Period boundaries during migration and retry backoff both go through this
/// trait so that tests can substitute [`ManualClock`].
pub trait Clock: Send + Sync + 'static {
    /// Returns the current timestamp in milliseconds since the UNIX epoch.
    fn now(&self) -> i64;

    /// Blocks the calling thread for `duration`.
    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

fn wall_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as i64)
        .unwrap_or_default()
}

/// A clock that uses `std::time::SystemTime`.
///
/// Susceptible to NTP adjustments, but requires no calibration.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> i64 {
        wall_millis()
    }
}

/// A clock that uses the CPU's Time-Stamp Counter (TSC) via the `quanta` crate.
///
/// Anchors to SystemTime at initialization and then uses TSC ticks to
/// progress, so it never jumps backwards.
#[derive(Debug, Clone)]
pub struct QuantaClock {
    clock: quanta::Clock,
    start_wall_ms: i64,
    start_instant: quanta::Instant,
}

impl Default for QuantaClock {
    fn default() -> Self {
        let clock = quanta::Clock::new();
        let start_instant = clock.now();
        Self {
            clock,
            start_wall_ms: wall_millis(),
            start_instant,
        }
    }
}

impl QuantaClock {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Clock for QuantaClock {
    fn now(&self) -> i64 {
        let delta = self.clock.now().duration_since(self.start_instant);
        self.start_wall_ms + delta.as_millis() as i64
    }
}

/// A clock that only moves when told to.
///
/// `sleep` does not block; it advances the clock and records the requested
/// duration so tests can assert on backoff.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicI64,
    sleeps: Mutex<Vec<Duration>>,
}

impl ManualClock {
    pub fn new(now: i64) -> Self {
        Self {
            now: AtomicI64::new(now),
            sleeps: Mutex::new(Vec::new()),
        }
    }

    pub fn set(&self, now: i64) {
        self.now.store(now, Ordering::SeqCst);
    }

    pub fn advance(&self, by: Duration) {
        self.now.fetch_add(by.as_millis() as i64, Ordering::SeqCst);
    }

    /// Every duration passed to `sleep`, in call order.
    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.lock().map(|s| s.clone()).unwrap_or_default()
    }

    pub fn total_slept(&self) -> Duration {
        self.sleeps().iter().sum()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }

    fn sleep(&self, duration: Duration) {
        if let Ok(mut sleeps) = self.sleeps.lock() {
            sleeps.push(duration);
        }
        self.advance(duration);
    }
}
