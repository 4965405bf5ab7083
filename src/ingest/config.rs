//! Ingestion configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::{Error, Result};

/// Tuning for the write paths and the write-behind pool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    /// Rows per multi-row insert, for both the pool and `write_stream`.
    /// Default: 2000
    pub batch_insert_size: usize,

    /// Queued entries per active worker before another worker is started.
    /// Default: 10000
    pub spawn_threshold: usize,

    /// Upper bound on concurrently registered pool workers.
    /// Default: 5
    pub max_instances: usize,

    /// Retries of a single-row insert after a transient failure.
    /// Default: 5
    pub sync_retries: u32,

    /// Retries of a multi-row insert after a transient failure.
    /// Default: 10
    pub batch_retries: u32,

    /// Backoff step; failed attempt `n` sleeps `n * step`.
    /// Default: 100 ms
    pub batch_backoff_step_ms: u64,

    /// How often `flush` re-reads the queue depth.
    /// Default: 1 s
    pub flush_poll_interval_ms: u64,

    /// Width of one rate histogram bucket.
    /// Default: 5 s
    pub rate_bucket_ms: u64,

    /// Number of buckets kept by each rate histogram.
    /// Default: 2
    pub rate_buckets: usize,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            batch_insert_size: 2000,
            spawn_threshold: 10_000,
            max_instances: 5,
            sync_retries: 5,
            batch_retries: 10,
            batch_backoff_step_ms: 100,
            flush_poll_interval_ms: 1000,
            rate_bucket_ms: 5000,
            rate_buckets: 2,
        }
    }
}

impl IngestConfig {
    pub fn batch_backoff_step(&self) -> Duration {
        Duration::from_millis(self.batch_backoff_step_ms)
    }

    pub fn flush_poll_interval(&self) -> Duration {
        Duration::from_millis(self.flush_poll_interval_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.batch_insert_size == 0 {
            return Err(Error::Config("batch_insert_size must be positive".into()));
        }
        if self.max_instances == 0 {
            return Err(Error::Config("max_instances must be positive".into()));
        }
        if self.rate_bucket_ms == 0 {
            return Err(Error::Config("rate_bucket_ms must be positive".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ingest_config_default() {
        let config = IngestConfig::default();
        assert_eq!(config.batch_insert_size, 2000);
        assert_eq!(config.spawn_threshold, 10_000);
        assert_eq!(config.max_instances, 5);
        assert_eq!(config.sync_retries, 5);
        assert_eq!(config.batch_retries, 10);
        assert_eq!(config.batch_backoff_step(), Duration::from_millis(100));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: IngestConfig = serde_json::from_str(r#"{"max_instances": 2}"#).unwrap();
        assert_eq!(config.max_instances, 2);
        assert_eq!(config.batch_insert_size, 2000);
    }

    #[test]
    fn test_validate_rejects_zero_batch() {
        let config = IngestConfig {
            batch_insert_size: 0,
            ..IngestConfig::default()
        };
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }
}
