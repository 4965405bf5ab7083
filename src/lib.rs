//! Persistence core for time-series point values.
//!
//! - [`ingest`]: synchronous, write-behind and stream writes into a
//!   [`MeasurementStore`](core::MeasurementStore), with retries, a recovery
//!   queue and an elastic worker pool
//! - [`migrate`]: per-series, period-by-period copy between two stores
//! - [`core`]: data model, storage traits, clocks, executors and metrics

pub mod config;
pub mod core;
pub mod generator;
pub mod ingest;
pub mod migrate;

pub use config::PointStoreConfig;
pub use core::{Error, Measurement, MeasurementStore, PointValue, Result, SeriesId};
pub use generator::RandomPointValueGenerator;
pub use ingest::{IngestConfig, IngestEngine, WriteOutcome};
pub use migrate::{MigrationConfig, MigrationSeries, MigrationStatus};
