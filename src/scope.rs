//! Per-thread current-access-list slot.
//!
//! Each thread owns one `Option<AccessList>` slot. Only the owning thread
//! ever reads or writes it, so there is no locking here; this is the hot
//! path taken by every tracked property read. The slot is reclaimed by the
//! thread-local destructor when the thread exits.

use std::cell::RefCell;
use std::sync::Arc;

use crate::key::{ObjectId, PropertyKey};
use crate::registrar::RegistrarContext;
use crate::tracking::AccessList;

thread_local! {
    static CURRENT_ACCESS_LIST: RefCell<Option<AccessList>> = const { RefCell::new(None) };
}

/// Record a read of `key` on the object identified by `id` into the calling
/// thread's current access list. A thread-local read and a branch when no
/// tracking scope is active.
#[inline]
pub(crate) fn record_access(id: ObjectId, context: &Arc<RegistrarContext>, key: PropertyKey) {
    CURRENT_ACCESS_LIST.with(|slot| {
        if let Some(list) = slot.borrow_mut().as_mut() {
            list.record(id, context, key);
        }
    });
}

/// RAII guard for one tracking scope.
///
/// Installs a fresh, empty access list on the slot and remembers the previous
/// value. On exit the previous value is restored and the scoped list's
/// entries are merged into it, so an enclosing scope also observes everything
/// this one observed. The restore-and-merge runs on every exit path; only a
/// normal [`exit`](AccessScope::exit) hands the collected list back for
/// registration.
pub(crate) struct AccessScope {
    previous: Option<AccessList>,
    armed: bool,
}

impl AccessScope {
    pub(crate) fn enter() -> Self {
        let previous =
            CURRENT_ACCESS_LIST.with(|slot| slot.replace(Some(AccessList::default())));
        Self {
            previous,
            armed: true,
        }
    }

    /// End the scope, returning what it collected.
    pub(crate) fn exit(mut self) -> Option<AccessList> {
        self.armed = false;
        restore_and_merge(self.previous.take())
    }
}

impl Drop for AccessScope {
    fn drop(&mut self) {
        // Unwind path: the collected list still merges into the enclosing
        // scope, but nothing gets registered.
        if self.armed {
            restore_and_merge(self.previous.take());
        }
    }
}

fn restore_and_merge(previous: Option<AccessList>) -> Option<AccessList> {
    CURRENT_ACCESS_LIST.with(|slot| {
        let scoped = slot.replace(previous);
        if let Some(scoped) = &scoped {
            if let Some(outer) = slot.borrow_mut().as_mut() {
                cov_mark::hit!(nested_scope_merge);
                outer.merge(scoped);
            }
        }
        scoped
    })
}

/// Run `f` with dependency recording suspended on the calling thread.
///
/// Reads performed inside `f` do not become dependencies of any enclosing
/// tracking scope. The previous slot value is restored even if `f` panics.
pub fn untracked<R>(f: impl FnOnce() -> R) -> R {
    struct Suspend(Option<AccessList>);

    impl Drop for Suspend {
        fn drop(&mut self) {
            CURRENT_ACCESS_LIST.with(|slot| *slot.borrow_mut() = self.0.take());
        }
    }

    let _guard = Suspend(CURRENT_ACCESS_LIST.with(|slot| slot.borrow_mut().take()));
    f()
}

#[cfg(test)]
pub(crate) fn is_tracking() -> bool {
    CURRENT_ACCESS_LIST.with(|slot| slot.borrow().is_some())
}
