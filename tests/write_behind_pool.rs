use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use pointstore::core::metrics::{QUEUE_DEPTH, WORKER_COUNT};
use pointstore::core::{
    BatchEntry, DeferredExecutor, ManualClock, Measurement, MemoryStore, Metrics, StoreOp,
    SystemClock, ThreadExecutor,
};
use pointstore::ingest::{BatchWriter, IngestConfig, IngestEngine, WriteBehindPool};

fn entries(count: usize) -> impl Iterator<Item = BatchEntry> {
    (0..count).map(|i| {
        Measurement::numeric((i % 13) as i32, i as f64, i as i64)
            .batch_entry(|v| v)
            .expect("numeric is batchable")
    })
}

fn wait_for_idle(pool: &WriteBehindPool) {
    let deadline = Instant::now() + Duration::from_secs(10);
    while pool.worker_count() > 0 {
        assert!(Instant::now() < deadline, "workers did not finish");
        thread::sleep(Duration::from_millis(5));
    }
}

#[test]
fn small_backlog_is_drained_by_seed_worker() {
    let config = IngestConfig {
        flush_poll_interval_ms: 5,
        ..IngestConfig::default()
    };
    let store = Arc::new(MemoryStore::new());
    let metrics = Arc::new(Metrics::new());
    let clock = Arc::new(SystemClock);
    let writer = Arc::new(BatchWriter::new(
        store.clone(),
        clock.clone(),
        metrics.clone(),
        &config,
    ));
    let executor = Arc::new(ThreadExecutor::new("batch-writer", 8));
    let pool = WriteBehindPool::new(writer, executor, clock, metrics.clone(), &config);

    for entry in entries(2_000) {
        pool.enqueue(entry).expect("enqueue");
    }
    pool.flush();
    wait_for_idle(&pool);

    assert_eq!(store.sample_count(), 2_000);
    assert_eq!(pool.snapshot(), (0, 0));
    assert_eq!(metrics.gauge(QUEUE_DEPTH), Some(0));
    assert_eq!(metrics.gauge(WORKER_COUNT), Some(0));
}

#[test]
fn large_backlog_spawns_exactly_one_worker() {
    let config = IngestConfig::default();
    let store = Arc::new(MemoryStore::new());
    let metrics = Arc::new(Metrics::new());
    let clock = Arc::new(ManualClock::new(0));
    let writer = Arc::new(BatchWriter::new(
        store.clone(),
        clock.clone(),
        metrics.clone(),
        &config,
    ));
    let executor = Arc::new(DeferredExecutor::new());
    let pool = WriteBehindPool::new(writer, executor.clone(), clock, metrics, &config);

    pool.enqueue_all(entries(15_000)).expect("enqueue");
    assert_eq!(pool.worker_count(), 1);
    assert_eq!(executor.submitted(), 1);

    executor.run_pending();
    assert_eq!(pool.worker_count(), 0);
    assert_eq!(store.sample_count(), 15_000);
    // 15000 / 2000 rounded up
    assert_eq!(store.calls(StoreOp::InsertBatch), 8);
}

#[test]
fn concurrent_producers_lose_nothing() {
    let config = IngestConfig {
        spawn_threshold: 500,
        flush_poll_interval_ms: 5,
        ..IngestConfig::default()
    };
    let store = Arc::new(MemoryStore::new());
    let executor = Arc::new(ThreadExecutor::new("batch-writer", 8));
    let engine = Arc::new(IngestEngine::new(store.clone(), executor, config).expect("engine"));

    let producers: Vec<_> = (0..4)
        .map(|p| {
            let engine = Arc::clone(&engine);
            thread::spawn(move || {
                for i in 0..5_000 {
                    let m = Measurement::numeric(p, i as f64, i);
                    engine.write_async(m).expect("write_async");
                }
            })
        })
        .collect();
    for producer in producers {
        producer.join().expect("producer panicked");
    }

    engine.flush();
    wait_for_idle(engine.pool());
    assert_eq!(store.sample_count(), 20_000);
    assert!(engine.stats().workers <= 5);
}
