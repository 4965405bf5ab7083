use std::sync::Arc;

use pointstore::core::metrics::RECOVERY_QUEUE_DEPTH;
use pointstore::core::{
    Annotation, DeferredExecutor, ManualClock, Measurement, MemoryStore, Metrics, PointValue,
    StoreError, StoreOp, ValueBounds,
};
use pointstore::ingest::{IngestConfig, IngestEngine, WriteOutcome};

struct Harness {
    store: Arc<MemoryStore>,
    executor: Arc<DeferredExecutor>,
    metrics: Arc<Metrics>,
    engine: IngestEngine,
}

fn harness(store: MemoryStore) -> Harness {
    let store = Arc::new(store);
    let executor = Arc::new(DeferredExecutor::new());
    let metrics = Arc::new(Metrics::new());
    let engine = IngestEngine::with_parts(
        store.clone(),
        executor.clone(),
        Arc::new(ManualClock::new(1_700_000_000_000)),
        metrics.clone(),
        IngestConfig::default(),
    )
    .expect("engine");
    Harness {
        store,
        executor,
        metrics,
        engine,
    }
}

#[test]
fn deferred_sync_write_is_recovered_on_next_write() {
    let h = harness(MemoryStore::new());
    h.store.fail_next(
        StoreOp::Insert,
        (0..6).map(|_| StoreError::transient("connection refused")),
    );

    let first = h.engine.write_sync(Measurement::numeric(1, 1.0, 100));
    assert_eq!(first, WriteOutcome::Deferred);
    assert_eq!(h.engine.recovery_len(), 1);
    assert_eq!(h.store.calls(StoreOp::Insert), 6);
    assert_eq!(h.metrics.gauge(RECOVERY_QUEUE_DEPTH), Some(1));

    let second = h.engine.write_sync(Measurement::numeric(1, 2.0, 200));
    assert_eq!(second, WriteOutcome::Persisted);
    assert_eq!(h.engine.recovery_len(), 0);
    assert_eq!(h.store.sample_count(), 2);
    assert_eq!(h.metrics.gauge(RECOVERY_QUEUE_DEPTH), Some(0));
}

#[test]
fn permanent_sync_failure_drops_value() {
    let h = harness(MemoryStore::new());
    h.store
        .fail_next(StoreOp::Insert, [StoreError::permanent("constraint violated")]);

    let outcome = h.engine.write_sync(Measurement::numeric(1, 1.0, 100));
    assert_eq!(outcome, WriteOutcome::Dropped);
    assert_eq!(h.store.calls(StoreOp::Insert), 1);
    assert_eq!(h.engine.recovery_len(), 0);
}

#[test]
fn unbatchable_values_bypass_the_pool() {
    let h = harness(MemoryStore::new());
    let text = Measurement::new(1, PointValue::Text("open".into()), 10);
    let annotated = Measurement::numeric(1, 5.0, 20).with_annotation(Annotation::new("operator"));

    assert_eq!(h.engine.write_async(text).unwrap(), WriteOutcome::Persisted);
    assert_eq!(h.engine.write_async(annotated).unwrap(), WriteOutcome::Persisted);
    assert_eq!(h.engine.pool().queue_len(), 0);
    assert_eq!(h.executor.submitted(), 0);

    let stored = h.store.samples(1);
    assert_eq!(stored.len(), 2);
    assert_eq!(stored[1].annotation, Some(Annotation::new("operator")));
}

#[test]
fn async_values_are_bounded_before_queueing() {
    let h = harness(MemoryStore::with_bounds(ValueBounds::new(-1.0, 1.0)));
    h.engine
        .write_async(Measurement::numeric(3, 50.0, 10))
        .unwrap();
    h.engine
        .write_async(Measurement::numeric(3, f64::NAN, 20))
        .unwrap();
    h.executor.run_pending();

    let values: Vec<_> = h
        .store
        .samples(3)
        .iter()
        .map(|m| m.value.as_f64())
        .collect();
    assert_eq!(values, vec![Some(1.0), Some(0.0)]);
}

#[test]
fn stream_mixes_batches_and_single_rows() {
    let h = harness(MemoryStore::new());
    let mut values: Vec<Measurement> = (0..4_500)
        .map(|i| Measurement::numeric(1, i as f64, i))
        .collect();
    values.push(Measurement::new(1, PointValue::Text("note".into()), 5_000));

    let summary = h.engine.write_stream(values);
    assert_eq!(summary.batched, 4_500);
    assert_eq!(summary.persisted, 1);
    assert_eq!(summary.written(), 4_501);
    assert_eq!(h.store.calls(StoreOp::InsertBatch), 3);
    assert_eq!(h.store.calls(StoreOp::Insert), 1);
}
