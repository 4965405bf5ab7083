//! Write-behind worker pool.
//!
//! Entries are appended to one shared queue and drained by background
//! workers. A worker is added whenever the backlog exceeds
//! `spawn_threshold` entries per active worker, up to `max_instances`.
//! The queue and the worker registry share one mutex, so a queue length and
//! a worker count read together are always consistent.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crate::core::metrics::{QUEUE_DEPTH, WORKER_COUNT};
use crate::core::{BatchEntry, Clock, Executor, MetricsSink, Priority, Result, Task};
use crate::ingest::{BatchWriter, IngestConfig};

#[derive(Default)]
struct PoolState {
    queue: VecDeque<BatchEntry>,
    workers: Vec<u64>,
    next_worker: u64,
}

struct Shared {
    state: Mutex<PoolState>,
    depth: AtomicUsize,
    writer: Arc<BatchWriter>,
    metrics: Arc<dyn MetricsSink>,
    batch_insert_size: usize,
}

/// Removes a worker from the registry if it unwinds mid-drain.
struct WorkerGuard<'a> {
    shared: &'a Shared,
    id: u64,
    armed: bool,
}

impl Drop for WorkerGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            let mut state = self.shared.lock();
            self.shared.deregister(&mut state, self.id);
            log::warn!("batch worker {} exited abnormally", self.id);
        }
    }
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, PoolState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish_depth(&self, depth: usize) {
        self.depth.store(depth, Ordering::Release);
        self.metrics.set_gauge(QUEUE_DEPTH, depth as i64);
    }

    fn deregister(&self, state: &mut PoolState, id: u64) {
        state.workers.retain(|worker| *worker != id);
        self.metrics
            .set_gauge(WORKER_COUNT, state.workers.len() as i64);
    }

    fn drain(&self, id: u64) {
        let mut guard = WorkerGuard {
            shared: self,
            id,
            armed: true,
        };
        let mut written = 0usize;
        loop {
            let batch: Vec<BatchEntry> = {
                let mut state = self.lock();
                if state.queue.is_empty() {
                    self.deregister(&mut state, id);
                    guard.armed = false;
                    break;
                }
                let take = state.queue.len().min(self.batch_insert_size);
                let batch = state.queue.drain(..take).collect();
                self.publish_depth(state.queue.len());
                batch
            };
            written += self.writer.write_batch(&batch);
        }
        log::debug!("batch worker {} finished, {} values written", id, written);
    }
}

pub struct WriteBehindPool {
    shared: Arc<Shared>,
    executor: Arc<dyn Executor>,
    clock: Arc<dyn Clock>,
    spawn_threshold: usize,
    max_instances: usize,
    flush_poll_interval: Duration,
}

impl WriteBehindPool {
    /// Create a pool draining into `writer`.
    ///
    /// The executor must run tasks on a thread other than the submitter's:
    /// workers are scheduled while the queue lock is held.
    pub fn new(
        writer: Arc<BatchWriter>,
        executor: Arc<dyn Executor>,
        clock: Arc<dyn Clock>,
        metrics: Arc<dyn MetricsSink>,
        config: &IngestConfig,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(PoolState::default()),
                depth: AtomicUsize::new(0),
                writer,
                metrics,
                batch_insert_size: config.batch_insert_size.max(1),
            }),
            executor,
            clock,
            spawn_threshold: config.spawn_threshold,
            max_instances: config.max_instances,
            flush_poll_interval: config.flush_poll_interval(),
        }
    }

    pub fn enqueue(&self, entry: BatchEntry) -> Result<()> {
        self.enqueue_all(std::iter::once(entry))
    }

    /// Appends `entries` and starts at most one additional worker.
    ///
    /// If the executor rejects the new worker, the registration is rolled
    /// back and the rejection returned; the entries stay queued.
    pub fn enqueue_all<I>(&self, entries: I) -> Result<()>
    where
        I: IntoIterator<Item = BatchEntry>,
    {
        let mut state = self.shared.lock();
        state.queue.extend(entries);
        let queued = state.queue.len();
        self.shared.publish_depth(queued);

        let active = state.workers.len();
        if queued <= active.saturating_mul(self.spawn_threshold) || active >= self.max_instances {
            return Ok(());
        }

        let id = state.next_worker;
        state.next_worker += 1;
        state.workers.push(id);
        self.shared
            .metrics
            .set_gauge(WORKER_COUNT, state.workers.len() as i64);

        let shared = Arc::clone(&self.shared);
        let task = Task::new(
            Priority::High,
            format!("batch write behind, {queued} queued"),
            move || shared.drain(id),
        );
        if let Err(rejected) = self.executor.submit(task) {
            self.shared.deregister(&mut state, id);
            log::warn!("batch worker {} not scheduled: {}", id, rejected);
            return Err(rejected.into());
        }
        log::debug!("started batch worker {} ({} active, {} queued)", id, active + 1, queued);
        Ok(())
    }

    /// Blocks until the queue depth has been observed at zero.
    ///
    /// Concurrent producers can keep the depth above zero indefinitely.
    pub fn flush(&self) {
        loop {
            let depth = self.shared.depth.load(Ordering::Acquire);
            if depth == 0 {
                return;
            }
            log::debug!("waiting for {} values to be written", depth);
            self.clock.sleep(self.flush_poll_interval);
        }
    }

    pub fn queue_len(&self) -> usize {
        self.shared.lock().queue.len()
    }

    pub fn worker_count(&self) -> usize {
        self.shared.lock().workers.len()
    }

    /// Queue length and worker count read under the same lock.
    pub fn snapshot(&self) -> (usize, usize) {
        let state = self.shared.lock();
        (state.queue.len(), state.workers.len())
    }
}
