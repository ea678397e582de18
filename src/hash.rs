//! Zero-sized hash builder for the engine's internal collections.
//!
//! Registries and access lists are keyed by `PropertyKey`, `ObjectId`, and
//! registration ids. These are internal data structures never exposed to
//! attacker-controlled keys, so HashDoS resistance is not needed and a
//! fixed-seed foldhash keeps them fast with no per-collection memory
//! overhead.

use std::hash::BuildHasher;

use foldhash::fast::{FixedState, FoldHasher};

/// A zero-sized `BuildHasher` that uses foldhash with a fixed seed.
///
/// The fixed seed means every instance produces identical hash values, so
/// collections built with it can be compared and merged freely.
#[derive(Clone, Copy, Debug, Default)]
pub(crate) struct FastHashBuilder;

impl BuildHasher for FastHashBuilder {
    type Hasher = FoldHasher;

    #[inline]
    fn build_hasher(&self) -> Self::Hasher {
        FixedState::with_seed(0x243f_6a88_85a3_08d3).build_hasher()
    }
}

/// Hash map over [`FastHashBuilder`].
pub(crate) type FastHashMap<K, V> = std::collections::HashMap<K, V, FastHashBuilder>;

/// Hash set over [`FastHashBuilder`].
pub(crate) type FastHashSet<T> = std::collections::HashSet<T, FastHashBuilder>;

/// Insertion-ordered set over [`FastHashBuilder`]. Iteration order is
/// insertion order, which the registrar relies on for delivery ordering.
pub(crate) type FastIndexSet<T> = indexmap::IndexSet<T, FastHashBuilder>;
