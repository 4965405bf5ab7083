//! Top-level configuration file.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::core::Result;
use crate::ingest::IngestConfig;
use crate::migrate::MigrationConfig;

/// Settings for a whole point store deployment.
///
/// Loaded from JSON; missing sections and fields take their defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PointStoreConfig {
    pub ingest: IngestConfig,
    pub migration: MigrationConfig,
}

impl PointStoreConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path.as_ref())?;
        let config: PointStoreConfig = serde_json::from_str(&raw)?;
        config.validate()?;
        log::debug!("loaded configuration from {}", path.as_ref().display());
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.ingest.validate()?;
        self.migration.validate()
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
