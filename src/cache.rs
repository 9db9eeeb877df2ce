// Copyright (c) 2024-present, fdata-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use quick_cache::sync::{Cache as QuickCache, DefaultLifecycle};
use quick_cache::Weighter;

/// A value held by the external cache, tagged with the identity it was
/// stored under.
///
/// Mirrors `cache_value.get_identifier()` / `get_value()` from the
/// consumed cache contract: `(file_index, offset, timestamp)` is the
/// generation-stamped identity a lookup compares against to reject a
/// stale or colliding entry.
#[derive(Debug, Clone)]
pub struct CacheEntry<V: Clone> {
    /// Backing file the cached value was read from.
    pub file_index: i32,
    /// Offset within that file the cached value was read from.
    pub offset: i64,
    /// Structural generation the value was read at.
    pub timestamp: u64,
    /// The cached value itself.
    pub value: V,
}

impl<V: Clone> CacheEntry<V> {
    /// Builds an entry tagged with the given `(file_index, offset, timestamp)`
    /// identity.
    #[must_use]
    pub fn new(file_index: i32, offset: i64, timestamp: u64, value: V) -> Self {
        Self {
            file_index,
            offset,
            timestamp,
            value,
        }
    }

    /// Whether this entry still represents the given identity, i.e. it is
    /// not a stale hand-me-down from a slot collision or an older
    /// structural generation.
    #[must_use]
    pub fn matches(&self, file_index: i32, offset: i64, timestamp: u64) -> bool {
        self.file_index == file_index && self.offset == offset && self.timestamp == timestamp
    }
}

/// The external value cache, consumed through a narrow slot-addressed
/// interface: capacity is fixed at creation, slot selection is the
/// caller's responsibility (a trivial modulo for stream segment
/// buffers, `calculate_cache_entry_index` for tree nodes), and
/// staleness is detected by comparing the stored identity against the
/// one being looked up rather than by the cache itself.
pub trait ValueCache<V: Clone> {
    /// Fixed slot capacity this cache was created with.
    fn capacity(&self) -> usize;

    /// Looks up whatever currently occupies `slot`, regardless of
    /// identity; the caller compares identity via [`CacheEntry::matches`].
    fn get_slot(&self, slot: usize) -> Option<CacheEntry<V>>;

    /// Stores `entry` at `slot`, evicting whatever was there before
    /// (including a different identity, on a slot collision).
    fn set_slot(&self, slot: usize, entry: CacheEntry<V>);
}

#[derive(Clone)]
struct UnitWeighter;

impl<V: Clone> Weighter<usize, CacheEntry<V>> for UnitWeighter {
    fn weight(&self, _key: &usize, _value: &CacheEntry<V>) -> u64 {
        1
    }
}

/// A ready-to-use concrete [`ValueCache`] backed by `quick_cache`, the
/// same crate the teacher's block cache is built on. Good enough as a
/// default for callers who don't want to bring their own slot store.
pub struct SharedCache<V: Clone> {
    data: QuickCache<usize, CacheEntry<V>, UnitWeighter, rustc_hash::FxBuildHasher>,
    capacity: usize,
}

impl<V: Clone> SharedCache<V> {
    /// Creates a cache with exactly `capacity` addressable slots.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let effective = capacity.max(1);

        let data = QuickCache::with(
            effective,
            effective as u64,
            UnitWeighter,
            rustc_hash::FxBuildHasher::default(),
            DefaultLifecycle::default(),
        );

        Self {
            data,
            capacity: effective,
        }
    }
}

impl<V: Clone> ValueCache<V> for SharedCache<V> {
    fn capacity(&self) -> usize {
        self.capacity
    }

    fn get_slot(&self, slot: usize) -> Option<CacheEntry<V>> {
        self.data.get(&slot)
    }

    fn set_slot(&self, slot: usize, entry: CacheEntry<V>) {
        self.data.insert(slot, entry);
    }
}
