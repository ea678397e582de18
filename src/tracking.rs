//! Tracking-scope orchestration.
//!
//! [`with_observation_tracking`] runs a read block with access recording
//! active, then arms a single one-shot callback against every registrar the
//! block touched. The callback is shared across all of those registrars, so
//! an already-fired guard inside the handle keeps it to at most one
//! invocation total even when several registrars could fire it
//! independently.

use std::sync::Arc;

use crate::hash::{FastHashMap, FastHashSet};
use crate::key::{ObjectId, PropertyKey};
use crate::lock::CriticalState;
use crate::log::trace_event;
use crate::registrar::{ObservationPhase, ObserverFn, RegistrarContext, RegistrationId};
use crate::scope::AccessScope;

/// The reads one tracking scope performed: one entry per object identity,
/// each carrying the object's registrar context and the set of property keys
/// read on it. Order of accumulation is irrelevant; the entries are consumed
/// once, at registration time.
#[derive(Default)]
pub(crate) struct AccessList {
    entries: FastHashMap<ObjectId, AccessEntry>,
}

pub(crate) struct AccessEntry {
    context: Arc<RegistrarContext>,
    keys: FastHashSet<PropertyKey>,
}

impl AccessList {
    pub(crate) fn record(
        &mut self,
        id: ObjectId,
        context: &Arc<RegistrarContext>,
        key: PropertyKey,
    ) {
        self.entries
            .entry(id)
            .or_insert_with(|| AccessEntry {
                context: Arc::clone(context),
                keys: FastHashSet::default(),
            })
            .keys
            .insert(key);
    }

    /// Fold another scope's entries into this one. Used when a nested scope
    /// closes, so the enclosing scope also observes everything the nested one
    /// observed.
    pub(crate) fn merge(&mut self, other: &AccessList) {
        for (id, entry) in &other.entries {
            for &key in &entry.keys {
                self.record(*id, &entry.context, key);
            }
        }
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn into_entries(self) -> impl Iterator<Item = AccessEntry> {
        self.entries.into_values()
    }
}

/// State shared between the handle and the per-registrar observer closures.
struct TrackingState {
    fired_or_cancelled: bool,
    on_change: Option<Box<dyn FnOnce() + Send>>,
    registrations: Vec<(Arc<RegistrarContext>, RegistrationId)>,
}

/// Handle to one armed tracking registration.
///
/// [`cancel`](ObservationTracking::cancel) removes every not-yet-fired
/// registration the scope installed and drops the callback. Once the
/// callback has fired (or a cancel has happened) the handle is inert.
/// Dropping the handle does *not* cancel: an abandoned registration stays
/// armed until its registrars go away.
#[derive(Clone)]
pub struct ObservationTracking {
    state: Arc<CriticalState<TrackingState>>,
}

impl ObservationTracking {
    /// Run `read_block` with tracking active and arm `on_change` against
    /// every (object, property) pair the block read. Returns the block's
    /// result together with the handle for the armed registration.
    ///
    /// See [`with_observation_tracking`] for the semantics of `on_change`;
    /// this entry point only adds the handle.
    pub fn install<R>(
        read_block: impl FnOnce() -> R,
        on_change: impl FnOnce() + Send + 'static,
    ) -> (R, ObservationTracking) {
        let scope = AccessScope::enter();
        let result = read_block();
        let list = scope.exit();

        let tracking = ObservationTracking {
            state: Arc::new(CriticalState::new(TrackingState {
                fired_or_cancelled: false,
                on_change: Some(Box::new(on_change)),
                registrations: Vec::new(),
            })),
        };
        if let Some(list) = list {
            tracking.arm(list);
        }
        (result, tracking)
    }

    /// Register with each touched registrar, sharing one observer closure
    /// that routes every firing through the already-fired guard.
    fn arm(&self, list: AccessList) {
        if list.is_empty() {
            return;
        }

        let observer: ObserverFn = {
            let state = Arc::clone(&self.state);
            Arc::new(move |_key: PropertyKey| {
                let won = state.with_critical_region(|s| {
                    if s.fired_or_cancelled {
                        cov_mark::hit!(duplicate_fire_suppressed);
                        return None;
                    }
                    s.fired_or_cancelled = true;
                    Some((s.on_change.take(), std::mem::take(&mut s.registrations)))
                });
                let Some((on_change, registrations)) = won else {
                    return;
                };
                // The firing registrar already removed its own entry, so
                // cancelling it again is a harmless no-op; no registrar lock
                // is held here.
                for (context, id) in registrations {
                    context.cancel(id);
                }
                if let Some(on_change) = on_change {
                    on_change();
                }
            })
        };

        for entry in list.into_entries() {
            let id = entry.context.register_tracking(
                entry.keys,
                ObservationPhase::WillSet,
                Arc::clone(&observer),
            );
            // A mutation on another thread may fire the callback between two
            // of these registrations. Anything registered after that point is
            // dead and gets cancelled on the spot instead of lingering.
            let stale = self.state.with_critical_region(|s| {
                if s.fired_or_cancelled {
                    true
                } else {
                    s.registrations.push((Arc::clone(&entry.context), id));
                    false
                }
            });
            if stale {
                entry.context.cancel(id);
            }
        }
    }

    /// Cancel every not-yet-fired registration and drop the callback. A
    /// no-op once the callback has fired or after a previous cancel.
    pub fn cancel(&self) {
        let registrations = self.state.with_critical_region(|s| {
            if s.fired_or_cancelled {
                cov_mark::hit!(cancel_after_fire_noop);
                return Vec::new();
            }
            s.fired_or_cancelled = true;
            s.on_change = None;
            std::mem::take(&mut s.registrations)
        });
        if !registrations.is_empty() {
            trace_event!(registrations = registrations.len(), "tracking cancelled");
        }
        for (context, id) in registrations {
            context.cancel(id);
        }
    }

    /// Whether the registration is still armed: not fired and not cancelled.
    pub fn is_active(&self) -> bool {
        self.state.with_critical_region(|s| !s.fired_or_cancelled)
    }
}

impl std::fmt::Debug for ObservationTracking {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObservationTracking")
            .field("active", &self.is_active())
            .finish()
    }
}

/// Run `read_block` with tracking active; afterwards, the first mutation of
/// any property it read invokes `on_change`, exactly once across all of
/// them, no matter how many objects or properties were involved.
///
/// `on_change` runs on whichever thread performs the triggering mutation,
/// during its will-set phase (before the new value is stored). No engine
/// lock is held while it runs, so re-arming by calling this function again
/// from inside the callback is safe and is the idiomatic way to keep
/// observing.
///
/// Nested calls compose: a scope also observes everything any scope nested
/// within its read block observed, each with its own callback.
///
/// A mutation racing with registration on another thread may complete its
/// delivery before this call finishes arming; that change is missed, as with
/// any register-then-observe scheme. Reads performed by `read_block` happen
/// before registration completes on the calling thread, which covers the
/// common single-writer arrangement.
pub fn with_observation_tracking<R>(
    read_block: impl FnOnce() -> R,
    on_change: impl FnOnce() + Send + 'static,
) -> R {
    let (result, _tracking) = ObservationTracking::install(read_block, on_change);
    result
}
