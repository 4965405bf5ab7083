//! Migration configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::{Error, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MigrationConfig {
    /// Width of one migration window.
    /// Default: 1 hour
    pub period_ms: u64,

    /// Nothing older than this timestamp is copied.
    /// Default: none
    pub migrate_from: Option<i64>,

    /// Copy numeric series as rollups of this interval instead of raw samples.
    /// Default: none (raw copy)
    pub aggregation_interval_ms: Option<u64>,

    /// Samples fetched from the source per read.
    /// Default: 10000
    pub read_chunk_size: usize,

    /// Samples written to the destination per write.
    /// Default: 10000
    pub write_chunk_size: usize,

    /// Retries of a failed step on transient errors.
    /// Default: 2
    pub retry_attempts: u32,

    /// Wait between step retries.
    /// Default: 500 ms
    pub retry_backoff_ms: u64,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            period_ms: 3_600_000,
            migrate_from: None,
            aggregation_interval_ms: None,
            read_chunk_size: 10_000,
            write_chunk_size: 10_000,
            retry_attempts: 2,
            retry_backoff_ms: 500,
        }
    }
}

impl MigrationConfig {
    pub fn period(&self) -> i64 {
        self.period_ms as i64
    }

    pub fn aggregation_interval(&self) -> Option<Duration> {
        self.aggregation_interval_ms.map(Duration::from_millis)
    }

    pub fn validate(&self) -> Result<()> {
        if self.period_ms == 0 || self.period_ms > i64::MAX as u64 {
            return Err(Error::Config("period_ms must be positive".into()));
        }
        if self.aggregation_interval_ms == Some(0) {
            return Err(Error::Config("aggregation_interval_ms must be positive".into()));
        }
        if self.read_chunk_size == 0 || self.write_chunk_size == 0 {
            return Err(Error::Config("chunk sizes must be positive".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migration_config_default() {
        let config = MigrationConfig::default();
        assert_eq!(config.period(), 3_600_000);
        assert_eq!(config.migrate_from, None);
        assert_eq!(config.aggregation_interval(), None);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate() {
        let zero_period = MigrationConfig {
            period_ms: 0,
            ..MigrationConfig::default()
        };
        assert!(zero_period.validate().is_err());

        let zero_chunk = MigrationConfig {
            write_chunk_size: 0,
            ..MigrationConfig::default()
        };
        assert!(zero_chunk.validate().is_err());
    }

    #[test]
    fn test_config_serialization() {
        let config = MigrationConfig {
            migrate_from: Some(1_000),
            aggregation_interval_ms: Some(60_000),
            ..MigrationConfig::default()
        };
        let json = serde_json::to_string(&config).unwrap();
        let deserialized: MigrationConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(config, deserialized);
    }
}
