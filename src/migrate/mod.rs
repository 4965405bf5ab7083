//! Background copy of series from one store to another.
//!
//! Each [`MigrationSeries`] walks its series forward one period per
//! [`run`](MigrationSeries::run), from the oldest sample up to the present,
//! and finishes with a close-out that takes the boundary lock so live
//! writers can switch over atomically.

mod config;
mod progress;
mod retry;
mod series;
mod status;

pub use config::MigrationConfig;
pub use progress::{NoopProgress, ProgressSink, ProgressTracker, SeriesTotals};
pub use retry::RetryPolicy;
pub use series::{MigrationContext, MigrationSeries};
pub use status::{MigrationProgress, MigrationStatus};
