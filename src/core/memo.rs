use std::sync::{Arc, Mutex, PoisonError};

/// Lazily computed value with explicit invalidation.
///
/// Initialization is single-flight: concurrent callers of
/// [`get_or_try_init`](Self::get_or_try_init) wait for the first one and then
/// share its result. Usable in a `static`.
#[derive(Debug)]
pub struct Memoized<T> {
    slot: Mutex<Option<Arc<T>>>,
}

impl<T> Memoized<T> {
    pub const fn new() -> Self {
        Self {
            slot: Mutex::new(None),
        }
    }

    /// The cached value, if one has been computed since the last invalidation.
    pub fn get(&self) -> Option<Arc<T>> {
        self.slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Returns the cached value or computes it with `init`.
    ///
    /// A failed `init` leaves the slot empty.
    pub fn get_or_try_init<E, F>(&self, init: F) -> Result<Arc<T>, E>
    where
        F: FnOnce() -> Result<T, E>,
    {
        let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(value) = slot.as_ref() {
            return Ok(Arc::clone(value));
        }
        let value = Arc::new(init()?);
        *slot = Some(Arc::clone(&value));
        Ok(value)
    }

    /// Drops the cached value; the next access recomputes it.
    pub fn invalidate(&self) -> Option<Arc<T>> {
        self.slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }
}

impl<T> Default for Memoized<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    #[test]
    fn test_init_once() {
        let memo = Memoized::new();
        let calls = AtomicUsize::new(0);
        for _ in 0..3 {
            let value = memo
                .get_or_try_init(|| {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, ()>(42)
                })
                .unwrap();
            assert_eq!(*value, 42);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_failed_init_not_cached() {
        let memo: Memoized<u32> = Memoized::new();
        assert!(memo.get_or_try_init(|| Err("down")).is_err());
        assert!(memo.get().is_none());
        assert_eq!(*memo.get_or_try_init(|| Ok::<_, &str>(7)).unwrap(), 7);
    }

    #[test]
    fn test_invalidate_recomputes() {
        let memo = Memoized::new();
        memo.get_or_try_init(|| Ok::<_, ()>(1)).unwrap();
        assert_eq!(memo.invalidate().as_deref(), Some(&1));
        assert!(memo.get().is_none());
        assert_eq!(*memo.get_or_try_init(|| Ok::<_, ()>(2)).unwrap(), 2);
    }

    #[test]
    fn test_single_flight_across_threads() {
        static MEMO: Memoized<usize> = Memoized::new();
        static CALLS: AtomicUsize = AtomicUsize::new(0);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                thread::spawn(|| {
                    *MEMO
                        .get_or_try_init(|| {
                            CALLS.fetch_add(1, Ordering::SeqCst);
                            Ok::<_, ()>(5)
                        })
                        .unwrap()
                })
            })
            .collect();
        for handle in handles {
            assert_eq!(handle.join().unwrap(), 5);
        }
        assert_eq!(CALLS.load(Ordering::SeqCst), 1);
    }
}
