//! Per-object observation hub: records tracked reads and delivers one-shot
//! mutation notifications.

use std::fmt;
use std::sync::Arc;

use crate::hash::{FastHashMap, FastHashSet, FastIndexSet};
use crate::key::{ObjectId, PropertyKey};
use crate::lock::CriticalState;
use crate::log::trace_event;
use crate::scope;

/// Which half of a mutation an observation fires on.
///
/// `with_mutation` delivers the will-set phase, runs the mutation body, then
/// delivers the did-set phase. Both phases belong to one logical mutation; a
/// registration only ever fires in its own phase, so pairing a will-set and a
/// did-set registration yields old-value/new-value call-ins around a single
/// store, not two independent firings.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub(crate) enum ObservationPhase {
    WillSet,
    DidSet,
}

/// Monotonically increasing identifier for one registered observation.
/// Delivery within a registrar happens in registration-id order.
#[derive(Copy, Clone, Eq, PartialEq, Hash, PartialOrd, Ord, Debug)]
pub(crate) struct RegistrationId(u64);

/// Callback invoked when a registered observation fires, with the key that
/// triggered it. One tracking scope shares a single callback across the
/// registrars of every object it touched.
pub(crate) type ObserverFn = Arc<dyn Fn(PropertyKey) + Send + Sync>;

struct Observation {
    phase: ObservationPhase,
    keys: FastHashSet<PropertyKey>,
    observer: ObserverFn,
}

/// Registry state behind one registrar's lock.
#[derive(Default)]
struct Registry {
    next_id: u64,
    /// Key -> registrations armed for it, in registration order.
    lookups: FastHashMap<PropertyKey, FastIndexSet<RegistrationId>>,
    observations: FastHashMap<RegistrationId, Observation>,
}

impl Registry {
    fn register(
        &mut self,
        keys: FastHashSet<PropertyKey>,
        phase: ObservationPhase,
        observer: ObserverFn,
    ) -> RegistrationId {
        let id = RegistrationId(self.next_id);
        self.next_id += 1;
        for &key in &keys {
            self.lookups.entry(key).or_default().insert(id);
        }
        self.observations.insert(
            id,
            Observation {
                phase,
                keys,
                observer,
            },
        );
        id
    }

    fn cancel(&mut self, id: RegistrationId) -> bool {
        let Some(observation) = self.observations.remove(&id) else {
            return false;
        };
        self.remove_lookups(&observation.keys, id);
        true
    }

    /// Remove every observation armed for `key` in `phase` and hand back the
    /// callbacks, in registration order. Removal is wholesale: a fired
    /// registration disappears from the lookup sets of all of its keys at
    /// once, which is what makes multi-key registrations one-shot.
    fn take_matching(&mut self, key: PropertyKey, phase: ObservationPhase) -> Vec<ObserverFn> {
        let matching: Vec<RegistrationId> = match self.lookups.get(&key) {
            Some(ids) => {
                let observations = &self.observations;
                ids.iter()
                    .copied()
                    .filter(|id| observations.get(id).is_some_and(|o| o.phase == phase))
                    .collect()
            }
            None => return Vec::new(),
        };
        if !matching.is_empty() {
            cov_mark::hit!(observation_removed_on_fire);
        }

        let mut observers = Vec::with_capacity(matching.len());
        for id in matching {
            let Some(observation) = self.observations.remove(&id) else {
                continue;
            };
            self.remove_lookups(&observation.keys, id);
            observers.push(observation.observer);
        }
        observers
    }

    fn remove_lookups(&mut self, keys: &FastHashSet<PropertyKey>, id: RegistrationId) {
        for key in keys {
            if let Some(ids) = self.lookups.get_mut(key) {
                ids.shift_remove(&id);
                if ids.is_empty() {
                    self.lookups.remove(key);
                }
            }
        }
    }
}

/// Shared interior of a registrar: the observation registry behind one lock.
///
/// The context, not the object, is the unit of locking; one context may be
/// shared by many observed objects, in which case matching is by property
/// key across all of them.
#[derive(Default)]
pub(crate) struct RegistrarContext {
    state: CriticalState<Registry>,
}

impl RegistrarContext {
    /// Arm one observation covering the whole key set. Invoked by the
    /// tracking orchestration, once per object entry in an access list.
    pub(crate) fn register_tracking(
        &self,
        keys: FastHashSet<PropertyKey>,
        phase: ObservationPhase,
        observer: ObserverFn,
    ) -> RegistrationId {
        let id = self
            .state
            .with_critical_region(|registry| registry.register(keys, phase, observer));
        trace_event!(id = id.0, "registered tracking");
        id
    }

    /// Remove a not-yet-fired registration. Idempotent: cancelling an id that
    /// already fired, or was already cancelled, does nothing.
    pub(crate) fn cancel(&self, id: RegistrationId) {
        let removed = self.state.with_critical_region(|registry| registry.cancel(id));
        if removed {
            cov_mark::hit!(cancelled_before_fire);
            trace_event!(id = id.0, "cancelled registration");
        }
    }

    /// Deliver one phase for `key`: collect-and-remove under the lock, then
    /// invoke with the lock released, so a callback may freely reenter the
    /// registrar (or arm a new tracking scope) without deadlocking.
    pub(crate) fn deliver(&self, key: PropertyKey, phase: ObservationPhase) {
        let observers = self
            .state
            .with_critical_region(|registry| registry.take_matching(key, phase));
        if !observers.is_empty() {
            trace_event!(observers = observers.len(), ?phase, "delivering");
        }
        for observer in observers {
            (*observer)(key);
        }
    }
}

/// The per-object observation hub.
///
/// Accessor code calls [`access`](ObservationRegistrar::access) from every
/// tracked getter and wraps every tracked store in
/// [`with_mutation`](ObservationRegistrar::with_mutation). The registrar is
/// cheap to clone; all clones share one registry and one lock, which lets a
/// setter clone the handle out of `self` before mutating `self` through it.
///
/// A registrar is usually created alongside the object it observes, but it
/// can also be shared across several objects; it is the unit of locking
/// either way.
#[derive(Clone)]
pub struct ObservationRegistrar {
    context: Arc<RegistrarContext>,
}

impl ObservationRegistrar {
    /// Create a registrar with its own empty registry.
    pub fn new() -> Self {
        Self {
            context: Arc::new(RegistrarContext::default()),
        }
    }

    /// Record a read of `key` on `subject` into the calling thread's active
    /// tracking scope, if any. No lock is taken; without an active scope this
    /// is a thread-local read and a branch.
    #[inline]
    pub fn access<T: ?Sized>(&self, subject: &T, key: PropertyKey) {
        scope::record_access(ObjectId::of(subject), &self.context, key);
    }

    /// Deliver the will-set phase for `key`: every tracked observation armed
    /// for it fires exactly once, before the new value lands.
    pub fn will_set<T: ?Sized>(&self, _subject: &T, key: PropertyKey) {
        self.context.deliver(key, ObservationPhase::WillSet);
    }

    /// Deliver the did-set phase for `key`.
    pub fn did_set<T: ?Sized>(&self, _subject: &T, key: PropertyKey) {
        self.context.deliver(key, ObservationPhase::DidSet);
    }

    /// Wrap one mutation of `key` on `subject`: will-set delivery, the
    /// mutation body, did-set delivery. The did-set phase runs even if the
    /// body unwinds, so split-phase observers always see both halves of one
    /// logical mutation. Returns whatever the body returns; panics propagate
    /// unchanged, and a panicking callback cannot corrupt the registry
    /// because matching entries were already removed before invocation.
    pub fn with_mutation<T: ?Sized, R>(
        &self,
        subject: &mut T,
        key: PropertyKey,
        mutation: impl FnOnce(&mut T) -> R,
    ) -> R {
        struct DidSet<'a> {
            context: &'a RegistrarContext,
            key: PropertyKey,
        }

        impl Drop for DidSet<'_> {
            fn drop(&mut self) {
                self.context.deliver(self.key, ObservationPhase::DidSet);
            }
        }

        self.context.deliver(key, ObservationPhase::WillSet);
        let _did_set = DidSet {
            context: &*self.context,
            key,
        };
        mutation(subject)
    }

    pub(crate) fn context(&self) -> &Arc<RegistrarContext> {
        &self.context
    }
}

impl Default for ObservationRegistrar {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ObservationRegistrar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObservationRegistrar").finish_non_exhaustive()
    }
}
