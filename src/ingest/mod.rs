//! Point value ingestion.
//!
//! - [`IngestEngine`]: synchronous, asynchronous and stream write paths
//! - [`WriteBehindPool`]: elastic background workers behind `write_async`
//! - [`BatchWriter`]: multi-row insert with linear-backoff retry
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use pointstore::core::{Measurement, MemoryStore, ThreadExecutor};
//! use pointstore::ingest::{IngestConfig, IngestEngine};
//!
//! let store = Arc::new(MemoryStore::new());
//! let executor = Arc::new(ThreadExecutor::new("batch-writer", 8));
//! let engine = IngestEngine::new(store, executor, IngestConfig::default())?;
//!
//! engine.write_async(Measurement::numeric(1, 21.5, 1_700_000_000_000))?;
//! engine.flush();
//! ```

mod batch;
mod config;
mod engine;
mod pool;

pub use batch::BatchWriter;
pub use config::IngestConfig;
pub use engine::{IngestEngine, IngestStats, StreamSummary, WriteOutcome};
pub use pool::WriteBehindPool;
