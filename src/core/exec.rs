//! Background execution facility used by the write-behind pool.

use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;

use crate::core::error::Rejected;

/// Scheduling hint; executors may ignore it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Priority {
    Low,
    Medium,
    High,
}

pub struct Task {
    pub priority: Priority,
    pub description: String,
    job: Box<dyn FnOnce() + Send + 'static>,
}

impl Task {
    pub fn new<F>(priority: Priority, description: impl Into<String>, job: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self {
            priority,
            description: description.into(),
            job: Box::new(job),
        }
    }

    pub fn run(self) {
        (self.job)()
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("priority", &self.priority)
            .field("description", &self.description)
            .finish_non_exhaustive()
    }
}

/// Accepts background tasks, or refuses them under load.
pub trait Executor: Send + Sync {
    fn submit(&self, task: Task) -> Result<(), Rejected>;
}

/// Runs each task on its own named thread, up to `max_tasks` at once.
#[derive(Debug)]
pub struct ThreadExecutor {
    name: String,
    max_tasks: usize,
    active: Arc<AtomicUsize>,
    spawned: AtomicU64,
}

struct ActiveGuard(Arc<AtomicUsize>);

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

impl ThreadExecutor {
    pub fn new(name: impl Into<String>, max_tasks: usize) -> Self {
        Self {
            name: name.into(),
            max_tasks,
            active: Arc::new(AtomicUsize::new(0)),
            spawned: AtomicU64::new(0),
        }
    }

    pub fn active(&self) -> usize {
        self.active.load(Ordering::Acquire)
    }

    fn reserve(&self) -> bool {
        self.active
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < self.max_tasks).then_some(n + 1)
            })
            .is_ok()
    }
}

impl Executor for ThreadExecutor {
    fn submit(&self, task: Task) -> Result<(), Rejected> {
        if !self.reserve() {
            return Err(Rejected {
                reason: format!("{} is running {} tasks", self.name, self.max_tasks),
            });
        }
        let guard = ActiveGuard(Arc::clone(&self.active));
        let id = self.spawned.fetch_add(1, Ordering::Relaxed);
        let description = task.description.clone();
        thread::Builder::new()
            .name(format!("{}-{}", self.name, id))
            .spawn(move || {
                let _guard = guard;
                log::trace!("running {}", task.description);
                task.run();
            })
            .map(|_| ())
            .map_err(|err| Rejected {
                reason: format!("failed to spawn thread for {description}: {err}"),
            })
    }
}

/// Holds submitted tasks until [`run_pending`](Self::run_pending) is called.
///
/// Useful for deterministic tests of code that schedules background work.
#[derive(Debug, Default)]
pub struct DeferredExecutor {
    pending: Mutex<VecDeque<Task>>,
    rejecting: AtomicBool,
    submitted: AtomicUsize,
}

impl DeferredExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent `submit` fail until switched back.
    pub fn set_rejecting(&self, rejecting: bool) {
        self.rejecting.store(rejecting, Ordering::SeqCst);
    }

    pub fn pending(&self) -> usize {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Tasks accepted since creation.
    pub fn submitted(&self) -> usize {
        self.submitted.load(Ordering::SeqCst)
    }

    /// Runs queued tasks, including ones they submit, until none remain.
    pub fn run_pending(&self) -> usize {
        let mut ran = 0;
        loop {
            let next = self
                .pending
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .pop_front();
            match next {
                Some(task) => {
                    task.run();
                    ran += 1;
                }
                None => return ran,
            }
        }
    }
}

impl Executor for DeferredExecutor {
    fn submit(&self, task: Task) -> Result<(), Rejected> {
        if self.rejecting.load(Ordering::SeqCst) {
            return Err(Rejected {
                reason: format!("deferred executor rejecting {}", task.description),
            });
        }
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(task);
        self.submitted.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::time::Duration;

    #[test]
    fn test_thread_executor_runs_task() {
        let executor = ThreadExecutor::new("test", 2);
        let (tx, rx) = mpsc::channel();
        executor
            .submit(Task::new(Priority::High, "send", move || {
                tx.send(7).unwrap();
            }))
            .unwrap();
        assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), 7);
    }

    #[test]
    fn test_thread_executor_rejects_over_capacity() {
        let executor = ThreadExecutor::new("test", 1);
        let (release_tx, release_rx) = mpsc::channel::<()>();
        executor
            .submit(Task::new(Priority::High, "block", move || {
                let _ = release_rx.recv();
            }))
            .unwrap();

        let err = executor
            .submit(Task::new(Priority::High, "second", || {}))
            .unwrap_err();
        assert!(err.reason.contains("running 1 tasks"));

        release_tx.send(()).unwrap();
        for _ in 0..500 {
            if executor.active() == 0 {
                return;
            }
            thread::sleep(Duration::from_millis(10));
        }
        panic!("task never finished");
    }

    #[test]
    fn test_deferred_executor_runs_nested_submissions() {
        let executor = Arc::new(DeferredExecutor::new());
        let counter = Arc::new(AtomicUsize::new(0));
        let inner_exec = Arc::clone(&executor);
        let inner_counter = Arc::clone(&counter);
        executor
            .submit(Task::new(Priority::Low, "outer", move || {
                inner_counter.fetch_add(1, Ordering::SeqCst);
                let c = Arc::clone(&inner_counter);
                inner_exec
                    .submit(Task::new(Priority::Low, "inner", move || {
                        c.fetch_add(1, Ordering::SeqCst);
                    }))
                    .unwrap();
            }))
            .unwrap();

        assert_eq!(executor.run_pending(), 2);
        assert_eq!(counter.load(Ordering::SeqCst), 2);
        assert_eq!(executor.submitted(), 2);
    }

    #[test]
    fn test_deferred_executor_rejecting() {
        let executor = DeferredExecutor::new();
        executor.set_rejecting(true);
        assert!(executor.submit(Task::new(Priority::Low, "x", || {})).is_err());
        assert_eq!(executor.pending(), 0);
    }
}
