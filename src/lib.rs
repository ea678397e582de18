#![deny(missing_docs)]

//! Fine-grained one-shot change observation for shared object graphs.
//!
//! Wrap a block of reads in [`with_observation_tracking`] and every tracked
//! property the block touches becomes a dependency: the first later mutation
//! of any of them invokes the supplied callback, exactly once. There is no
//! subscribe/unsubscribe bookkeeping and no retained observer list to leak,
//! because a registration is consumed by its own delivery.
//!
//! # Quick Start
//!
//! ```
//! use observation::{ObservationRegistrar, PropertyKey, with_observation_tracking};
//! use std::sync::Arc;
//! use std::sync::atomic::{AtomicUsize, Ordering};
//!
//! struct Counter {
//!     value: u64,
//!     registrar: ObservationRegistrar,
//! }
//!
//! impl Counter {
//!     const VALUE: u32 = 0;
//!
//!     fn value(&self) -> u64 {
//!         self.registrar.access(self, PropertyKey::of::<Counter>(Self::VALUE));
//!         self.value
//!     }
//!
//!     fn set_value(&mut self, value: u64) {
//!         let registrar = self.registrar.clone();
//!         registrar.with_mutation(self, PropertyKey::of::<Counter>(Self::VALUE), |this| {
//!             this.value = value;
//!         });
//!     }
//! }
//!
//! let mut counter = Counter { value: 0, registrar: ObservationRegistrar::new() };
//!
//! let fired = Arc::new(AtomicUsize::new(0));
//! let observed = fired.clone();
//! with_observation_tracking(
//!     || { let _ = counter.value(); },
//!     move || { observed.fetch_add(1, Ordering::Relaxed); },
//! );
//!
//! counter.set_value(1);
//! counter.set_value(2);
//!
//! // One-shot: only the first mutation after tracking fires the callback.
//! assert_eq!(fired.load(Ordering::Relaxed), 1);
//! ```
//!
//! # Core Types
//!
//! - [`ObservationRegistrar`] - Per-object hub. Getters call
//!   [`access`](ObservationRegistrar::access), setters wrap their store in
//!   [`with_mutation`](ObservationRegistrar::with_mutation).
//! - [`with_observation_tracking`] - Runs a read block, then arms a one-shot
//!   callback on everything it read, across any number of objects.
//! - [`ObservationTracking`] - Handle for one armed registration; supports
//!   explicit [`cancel`](ObservationTracking::cancel) before firing.
//! - [`PropertyKey`] / [`ObjectId`] - Identity tokens for "this property of
//!   this type" and "this instance".
//! - [`Observable`] / [`ObservationIgnored`] - Markers targeted by accessor
//!   generation; the engine itself works with hand-written accessors just as
//!   well.
//!
//! # Threading
//!
//! Tracking scopes are per-thread; mutation and delivery may come from any
//! thread. The callback runs on whichever thread performs the triggering
//! mutation, with no engine lock held, so it may freely read tracked state
//! or re-arm with a fresh [`with_observation_tracking`] call.
//!
//! # Feature Flags
//!
//! - `tracing`: trace-level events on registration, delivery, and
//!   cancellation via the `tracing` crate. Off by default; the `access` hot
//!   path never logs either way.

mod hash;
mod key;
mod lock;
mod log;
mod observable;
mod registrar;
mod scope;
mod tracking;

pub use key::{ObjectId, PropertyKey};
pub use observable::{Observable, ObservationIgnored};
pub use registrar::ObservationRegistrar;
pub use scope::untracked;
pub use tracking::{ObservationTracking, with_observation_tracking};
