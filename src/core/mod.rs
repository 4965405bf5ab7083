//! Building blocks shared by ingestion and migration: the data model, the
//! storage capability, clocks, executors and metrics.

pub mod aggregate;
pub mod clock;
pub mod error;
pub mod exec;
pub mod measurement;
pub mod memo;
pub mod memory;
pub mod metrics;
pub mod rate;
pub mod store;

pub use aggregate::AggregateValue;
pub use clock::{Clock, ManualClock, QuantaClock, SystemClock};
pub use error::{Error, Rejected, Result, StoreError, StoreErrorKind, TRANSIENT_KINDS};
pub use exec::{DeferredExecutor, Executor, Priority, Task, ThreadExecutor};
pub use measurement::{
    Annotation, BatchEntry, DataKind, ImageValue, Measurement, PointValue, SeriesDescriptor,
    SeriesId, UnsavedMeasurement,
};
pub use memo::Memoized;
pub use memory::{MemoryDirectory, MemoryStore, StoreOp};
pub use metrics::{Metrics, MetricsSink, NoopMetrics};
pub use rate::EventRate;
pub use store::{MeasurementStore, SampleChunks, SeriesDirectory, StoreResult, TimeOrder, ValueBounds};
