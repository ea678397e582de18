//! Scoped mutual exclusion around a typed critical section.

use parking_lot::Mutex;

/// Mutable state guarded by a non-reentrant mutex, reachable only inside a
/// scoped critical region.
///
/// The lock is released on every exit path, including unwinding. It must not
/// be held across calls into code that could reenter the same region, so
/// delivery paths split "collect under the lock" from "invoke after release"
/// (see the registrar). Recursive acquisition from the same thread deadlocks;
/// there is no fairness guarantee beyond mutual exclusion.
pub(crate) struct CriticalState<T> {
    state: Mutex<T>,
}

impl<T> CriticalState<T> {
    pub(crate) const fn new(state: T) -> Self {
        Self {
            state: Mutex::new(state),
        }
    }

    /// Run `body` with exclusive access to the state.
    #[inline]
    pub(crate) fn with_critical_region<R>(&self, body: impl FnOnce(&mut T) -> R) -> R {
        body(&mut self.state.lock())
    }
}

impl<T: Default> Default for CriticalState<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::panic::AssertUnwindSafe;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn critical_region_is_mutually_exclusive() {
        let counter = Arc::new(CriticalState::new(0u64));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let counter = counter.clone();
                thread::spawn(move || {
                    for _ in 0..1000 {
                        counter.with_critical_region(|n| *n += 1);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(counter.with_critical_region(|n| *n), 8000);
    }

    #[test]
    fn critical_region_releases_on_unwind() {
        let state = CriticalState::new(Vec::<i32>::new());

        let result = std::panic::catch_unwind(AssertUnwindSafe(|| {
            state.with_critical_region(|_| panic!("mid-region"));
        }));
        assert!(result.is_err());

        // The lock is free again; parking_lot mutexes do not poison.
        state.with_critical_region(|v| v.push(1));
        assert_eq!(state.with_critical_region(|v| v.len()), 1);
    }
}
