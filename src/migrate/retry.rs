use std::time::Duration;

use crate::core::{Clock, Result};
use crate::migrate::MigrationConfig;

/// Re-runs a unit of work that failed with a transient error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub backoff: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, backoff: Duration) -> Self {
        Self {
            max_retries,
            backoff,
        }
    }

    /// Runs `work` exactly once.
    pub fn none() -> Self {
        Self::new(0, Duration::ZERO)
    }

    pub fn from_config(config: &MigrationConfig) -> Self {
        Self::new(
            config.retry_attempts,
            Duration::from_millis(config.retry_backoff_ms),
        )
    }

    pub fn execute<T, F>(&self, clock: &dyn Clock, mut work: F) -> Result<T>
    where
        F: FnMut() -> Result<T>,
    {
        let mut retries = 0;
        loop {
            match work() {
                Ok(value) => return Ok(value),
                Err(err) if err.is_transient() && retries < self.max_retries => {
                    retries += 1;
                    log::debug!("retry {} of {} after: {}", retries, self.max_retries, err);
                    clock.sleep(self.backoff);
                }
                Err(err) => return Err(err),
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&MigrationConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Error, ManualClock, StoreError};

    #[test]
    fn test_retries_transient() {
        let clock = ManualClock::new(0);
        let policy = RetryPolicy::new(2, Duration::from_millis(50));
        let mut calls = 0;
        let value = policy
            .execute(&clock, || {
                calls += 1;
                if calls < 3 {
                    Err(StoreError::transient("busy").into())
                } else {
                    Ok(calls)
                }
            })
            .unwrap();
        assert_eq!(value, 3);
        assert_eq!(clock.total_slept(), Duration::from_millis(100));
    }

    #[test]
    fn test_gives_up_after_max() {
        let clock = ManualClock::new(0);
        let policy = RetryPolicy::new(1, Duration::ZERO);
        let mut calls = 0;
        let result: Result<()> = policy.execute(&clock, || {
            calls += 1;
            Err(StoreError::transient("busy").into())
        });
        assert!(result.is_err());
        assert_eq!(calls, 2);
    }

    #[test]
    fn test_permanent_not_retried() {
        let clock = ManualClock::new(0);
        let mut calls = 0;
        let result: Result<()> = RetryPolicy::default().execute(&clock, || {
            calls += 1;
            Err(Error::SeriesNotFound(1))
        });
        assert!(result.is_err());
        assert_eq!(calls, 1);
    }
}
