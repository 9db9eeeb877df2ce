// Copyright (c) 2024-present, fdata-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::cache::{CacheEntry, ValueCache};
use crate::config::TreeConfig;
use crate::error::{Error, Result};
use crate::range::{Owned, Range, TreeRange};
use crate::tree_node::{LeafWindow, TreeNode};
use rustc_hash::FxHasher;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;
use std::sync::{Arc, Mutex};

/// Supplies node parsing for a [`Tree`].
///
/// An ordinary object the tree owns rather than an opaque handle plus a
/// set of free function pointers, so `Clone`/`Drop` cover lifetime
/// management that would otherwise need explicit bookkeeping.
pub trait NodeSource<Io> {
    /// Value type stored at each node (the deserialized node header).
    type Value;
    /// Key type carried alongside each sub-node / leaf-value entry.
    type Key;

    /// Parses the node at `range`, at tree depth `level`, filling in its
    /// value and its branch/leaf entries.
    ///
    /// When `range` is itself a leaf-value's own range (i.e. this call is
    /// the one [`Tree::get_leaf_value_by_index`] makes to materialize a
    /// leaf value, rather than a structural node), implementations
    /// should populate only [`TreeNode::set_value`] and leave the node
    /// childless.
    fn read_node(
        &self,
        io: &mut Io,
        range: Range,
        level: u16,
    ) -> Result<TreeNode<Self::Value, Self::Key>>;

    /// Chooses the cache slot for `range` at the given tree depth. The
    /// default hashes `(level, file_index, offset)` modulo the cache
    /// capacity; override for a custom locality policy.
    fn calculate_cache_entry_index(&self, range: Range, level: u16, capacity: usize) -> usize {
        if capacity == 0 {
            return 0;
        }
        let mut hasher = FxHasher::default();
        level.hash(&mut hasher);
        range.file_index().hash(&mut hasher);
        range.offset().hash(&mut hasher);
        (hasher.finish() as usize) % capacity
    }

    /// Optional: serializes and writes a node back out. Unsupported by
    /// default, matching a read-only tree.
    fn write_node(
        &self,
        io: &mut Io,
        range: Range,
        level: u16,
        node: &TreeNode<Self::Value, Self::Key>,
    ) -> Result<()> {
        let _ = (io, range, level, node);
        Err(Error::Unsupported("write_node"))
    }
}

type CachedNode<V, K> = Arc<Mutex<TreeNode<V, K>>>;

/// Lazy traversal engine over an out-of-core B-tree: given a root range
/// and a caller-supplied [`NodeSource`], walks branches on demand,
/// caching parsed nodes, and exposes the leaf values as one flat
/// randomly-addressable index.
pub struct Tree<N: NodeSource<Io>, Io> {
    source: N,
    root_range: Option<Range>,
    config: TreeConfig,
    _io: PhantomData<fn(&mut Io)>,
}

impl<N: NodeSource<Io>, Io> Tree<N, Io> {
    /// Creates a tree with no root range set yet.
    #[must_use]
    pub fn new(source: N) -> Self {
        Self::with_config(source, TreeConfig::default())
    }

    /// Creates a tree with no root range set yet, with explicit tunables.
    #[must_use]
    pub fn with_config(source: N, config: TreeConfig) -> Self {
        Self {
            source,
            root_range: None,
            config,
            _io: PhantomData,
        }
    }

    /// Sets the range of the tree's root node. Required before any
    /// traversal method can run.
    pub fn set_root_node(&mut self, range: Range) -> Result<()> {
        if !range.is_set() {
            return Err(Error::InvalidArgument("root range is unset"));
        }
        self.root_range = Some(range);
        Ok(())
    }

    /// The root node's range, if one has been set.
    #[must_use]
    pub fn get_root_node_range(&self) -> Option<Range> {
        self.root_range
    }

    fn root_range_or_err(&self) -> Result<Range> {
        self.root_range.ok_or(Error::ValueMissing("root node range"))
    }

    /// Reads and parses the node at `range`/`level`, consulting `cache`
    /// first and filling it in on a miss.
    fn read_node_cached<C>(
        &self,
        io: &mut Io,
        cache: &C,
        range: Range,
        level: u16,
    ) -> Result<CachedNode<N::Value, N::Key>>
    where
        C: ValueCache<CachedNode<N::Value, N::Key>>,
    {
        let slot = self
            .source
            .calculate_cache_entry_index(range, level, cache.capacity());

        if let Some(entry) = cache.get_slot(slot) {
            if entry.matches(range.file_index(), range.offset(), level as u64) {
                log::trace!("node cache hit at slot {slot}");
                return Ok(entry.value);
            }
            log::trace!("node cache stale/collided at slot {slot}");
        }

        let node = self.source.read_node(io, range, level)?;
        let shared = Arc::new(Mutex::new(node));

        cache.set_slot(
            slot,
            CacheEntry::new(range.file_index(), range.offset(), level as u64, shared.clone()),
        );

        Ok(shared)
    }

    /// Recursively resolves a branch's children, computing and caching
    /// each child's leaf-value window bottom-up, and returns the total
    /// number of leaf values reachable under `node_range`/`level`.
    ///
    /// Cycles in malformed on-disk data would recurse without bound;
    /// depth is bounded in practice by the tree's actual height.
    fn read_sub_tree<C>(
        &self,
        io: &mut Io,
        cache: &C,
        range: Range,
        level: u16,
    ) -> Result<u64>
    where
        C: ValueCache<CachedNode<N::Value, N::Key>>,
    {
        let node = self.read_node_cached(io, cache, range, level)?;

        {
            let guard = node.lock().expect("node mutex poisoned");
            if guard.is_leaf() {
                return Ok(guard.get_number_of_leaf_values() as u64);
            }
            if guard.aggregates_are_valid() {
                return Ok(guard.get_number_of_leaf_values_in_branch());
            }
        }

        let child_ranges: Vec<Range> = {
            let guard = node.lock().expect("node mutex poisoned");
            (0..guard.get_number_of_sub_nodes())
                .map(|i| guard.get_sub_node_data_range_by_index(i))
                .collect::<Result<Vec<_>>>()?
        };

        let mut windows = Vec::with_capacity(child_ranges.len());
        let mut running = 0u64;

        for child_range in child_ranges {
            let count = self.read_sub_tree(io, cache, child_range, level + 1)?;
            windows.push(LeafWindow {
                first_leaf_value_index: running,
                number_of_leaf_values: count,
            });
            running += count;
        }

        let mut guard = node.lock().expect("node mutex poisoned");
        guard.set_branch_leaf_values(windows);
        Ok(guard.get_number_of_leaf_values_in_branch())
    }

    /// Total number of leaf values in the tree, computed (and cached) by
    /// walking every branch once.
    pub fn get_number_of_leaf_values<C>(&self, io: &mut Io, cache: &C) -> Result<u64>
    where
        C: ValueCache<CachedNode<N::Value, N::Key>>,
    {
        let root = self.root_range_or_err()?;
        self.read_sub_tree(io, cache, root, 0)
    }

    /// Resolves a flat leaf-value index down through the tree and
    /// returns the leaf value's own key (if any) and its materialized
    /// value, read via one further [`NodeSource::read_node`] call on the
    /// leaf-value's own range. This resolves the ambiguity over whether
    /// `get_leaf_value_by_index` must re-read the leaf entry's range to
    /// produce a value, or whether the value is carried by the leaf
    /// entry itself: here it is always read like any other node.
    pub fn get_leaf_value_by_index<C>(
        &self,
        io: &mut Io,
        cache: &C,
        mut index: u64,
    ) -> Result<(Option<Arc<N::Key>>, N::Value)>
    where
        C: ValueCache<CachedNode<N::Value, N::Key>>,
        N::Value: Clone,
        N::Key: Clone,
    {
        let root = self.root_range_or_err()?;
        self.get_number_of_leaf_values(io, cache)?;

        let mut range = root;
        let mut level = 0u16;

        loop {
            let node = self.read_node_cached(io, cache, range, level)?;
            let guard = node.lock().expect("node mutex poisoned");

            if guard.is_leaf() {
                let entry = guard.get_leaf_value_by_index(index as usize)?;
                let leaf_range = entry.range();
                let key = entry.key_value().map(|k| Arc::new(k.clone()));
                drop(guard);

                let leaf_node = self.read_node_cached(io, cache, leaf_range, level + 1)?;
                let leaf_guard = leaf_node.lock().expect("node mutex poisoned");
                let value = leaf_guard
                    .get_value()
                    .cloned()
                    .ok_or(Error::ValueMissing("leaf value"))?;
                return Ok((key, value));
            }

            let (child_index, remainder) = guard.get_sub_node_data_range_by_mapped_index(index)?;
            let child_range = guard.get_sub_node_data_range_by_index(child_index)?;
            drop(guard);

            range = child_range;
            level += 1;
            index = remainder;
        }
    }

    /// Deep-clones the traversal state (just the root range; the parsed
    /// node cache is intentionally not carried over, since it belongs to
    /// whichever `cache` argument the caller passes to each call).
    pub fn try_clone(&self) -> Result<Self>
    where
        N: Clone,
    {
        Ok(Self {
            source: self.source.clone(),
            root_range: self.root_range,
            config: self.config,
            _io: PhantomData,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::SharedCache;
    use test_log::test;

    #[derive(Debug, Clone, PartialEq, Eq)]
    struct Key(u32);

    #[derive(Debug, Clone, PartialEq, Eq)]
    struct Value(u32);

    // A tiny fixed tree: root (branch, 2 children) -> two leaves of 2+1
    // values. "Files" are addressed by `file_index`; `offset` encodes
    // which fixture node to return.
    struct FixedTree;

    const ROOT: i64 = 0;
    const BRANCH_A: i64 = 1;
    const BRANCH_B: i64 = 2;
    const LEAF_VALUE_BASE: i64 = 100;

    impl NodeSource<()> for FixedTree {
        type Value = Value;
        type Key = Key;

        fn read_node(
            &self,
            _io: &mut (),
            range: Range,
            level: u16,
        ) -> Result<TreeNode<Value, Key>> {
            let mut node = TreeNode::new(level);

            match range.offset() {
                ROOT => {
                    node.set_value(Owned::Owned(Value(0)));
                    node.append_sub_node(TreeRange::new(
                        Range::new(1, BRANCH_A, 0, 0).unwrap(),
                        Some(Owned::Owned(Key(1))),
                    ))?;
                    node.append_sub_node(TreeRange::new(
                        Range::new(1, BRANCH_B, 0, 0).unwrap(),
                        Some(Owned::Owned(Key(2))),
                    ))?;
                }
                BRANCH_A => {
                    node.set_value(Owned::Owned(Value(10)));
                    node.append_leaf_value(TreeRange::new(
                        Range::new(1, LEAF_VALUE_BASE, 0, 0).unwrap(),
                        Some(Owned::Owned(Key(100))),
                    ))?;
                    node.append_leaf_value(TreeRange::new(
                        Range::new(1, LEAF_VALUE_BASE + 1, 0, 0).unwrap(),
                        Some(Owned::Owned(Key(101))),
                    ))?;
                }
                BRANCH_B => {
                    node.set_value(Owned::Owned(Value(20)));
                    node.append_leaf_value(TreeRange::new(
                        Range::new(1, LEAF_VALUE_BASE + 2, 0, 0).unwrap(),
                        Some(Owned::Owned(Key(102))),
                    ))?;
                }
                offset if offset >= LEAF_VALUE_BASE => {
                    node.set_value(Owned::Owned(Value((offset - LEAF_VALUE_BASE) as u32 + 1000)));
                }
                _ => return Err(Error::InvalidArgument("unknown fixture range")),
            }

            Ok(node)
        }
    }

    fn make_tree() -> (Tree<FixedTree, ()>, SharedCache<CachedNode<Value, Key>>) {
        let mut tree = Tree::new(FixedTree);
        tree.set_root_node(Range::new(1, ROOT, 0, 0).unwrap()).unwrap();
        let cache = SharedCache::with_capacity(16);
        (tree, cache)
    }

    // S5 - branch/leaf exclusivity and leaf aggregation.
    #[test]
    fn leaf_count_aggregates_across_branches() {
        let (tree, cache) = make_tree();
        let mut io = ();
        let total = tree.get_number_of_leaf_values(&mut io, &cache).unwrap();
        assert_eq!(total, 3);
    }

    #[test]
    fn leaf_value_by_index_resolves_through_branches() {
        let (tree, cache) = make_tree();
        let mut io = ();

        let (key0, value0) = tree.get_leaf_value_by_index(&mut io, &cache, 0).unwrap();
        assert_eq!(key0.as_deref(), Some(&Key(100)));
        assert_eq!(value0, Value(1000));

        let (key2, value2) = tree.get_leaf_value_by_index(&mut io, &cache, 2).unwrap();
        assert_eq!(key2.as_deref(), Some(&Key(102)));
        assert_eq!(value2, Value(1002));
    }

    #[test]
    fn leaf_value_out_of_range_fails() {
        let (tree, cache) = make_tree();
        let mut io = ();
        assert!(matches!(
            tree.get_leaf_value_by_index(&mut io, &cache, 3),
            Err(Error::OutOfBounds)
        ));
    }

    #[test]
    fn missing_root_fails_fast() {
        let tree: Tree<FixedTree, ()> = Tree::new(FixedTree);
        let cache: SharedCache<CachedNode<Value, Key>> = SharedCache::with_capacity(4);
        let mut io = ();
        assert!(matches!(
            tree.get_number_of_leaf_values(&mut io, &cache),
            Err(Error::ValueMissing(_))
        ));
    }

    #[test]
    fn node_cache_is_reused_across_calls() {
        let (tree, cache) = make_tree();
        let mut io = ();

        tree.get_number_of_leaf_values(&mut io, &cache).unwrap();
        let root_range = tree.get_root_node_range().unwrap();
        let slot = tree
            .source
            .calculate_cache_entry_index(root_range, 0, cache.capacity());
        assert!(cache.get_slot(slot).is_some());
    }

    #[test]
    fn try_clone_preserves_root_range_only() {
        let (tree, _cache) = make_tree();
        let clone = tree.try_clone().unwrap();
        assert_eq!(clone.get_root_node_range(), tree.get_root_node_range());
    }
}
