// Copyright (c) 2024-present, fdata-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::binary_search::partition_point;
use crate::error::{Error, Result};
use crate::range::{Owned, Range, TreeRange};

/// A node's contents are either a list of sub-nodes (branch) or a list of
/// leaf values (leaf), never both.
///
/// A sum type makes the exclusivity a compile-time property instead of a
/// pair of flags that callers would otherwise have to keep in sync by
/// convention.
#[derive(Debug, Clone)]
pub enum NodeKind<K> {
    /// Neither branch nor leaf entries have been set yet.
    Unset,
    /// Entries are child-node ranges.
    Branch(Vec<TreeRange<K>>),
    /// Entries are leaf-value ranges.
    Leaf(Vec<TreeRange<K>>),
}

impl<K> Default for NodeKind<K> {
    fn default() -> Self {
        Self::Unset
    }
}

/// The window of global leaf-value indices a branch child covers, used by
/// [`TreeNode::get_sub_node_data_range_by_mapped_index`] to resolve a
/// flat leaf index back down to the owning child.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LeafWindow {
    /// Global leaf-value index of this child's first leaf value.
    pub first_leaf_value_index: u64,
    /// How many leaf values this child covers.
    pub number_of_leaf_values: u64,
}

impl LeafWindow {
    /// The index one past this window's last leaf value.
    #[must_use]
    pub fn end(&self) -> u64 {
        self.first_leaf_value_index + self.number_of_leaf_values
    }
}

/// One parsed B-tree node: either a branch pointing at sub-nodes or a
/// leaf holding value ranges, plus the node's own value (e.g. the node
/// header deserialized by the caller) and, for a branch, the lazily
/// aggregated count of leaf values reachable underneath it.
#[derive(Debug, Clone)]
pub struct TreeNode<V, K> {
    level: u16,
    value: Option<Owned<V>>,
    kind: NodeKind<K>,
    child_windows: Vec<LeafWindow>,
    branch_number_of_leaf_values: u64,
    aggregates_valid: bool,
}

impl<V, K> Default for TreeNode<V, K> {
    fn default() -> Self {
        Self {
            level: 0,
            value: None,
            kind: NodeKind::Unset,
            child_windows: Vec::new(),
            branch_number_of_leaf_values: 0,
            aggregates_valid: false,
        }
    }
}

impl<V, K> TreeNode<V, K> {
    /// Creates an empty node at the given tree depth (root is level 0).
    #[must_use]
    pub fn new(level: u16) -> Self {
        Self {
            level,
            ..Self::default()
        }
    }

    /// This node's depth in the tree (root is level 0).
    #[must_use]
    pub fn get_level(&self) -> u16 {
        self.level
    }

    /// Whether this node is the tree's root (`level == 0`).
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.level == 0
    }

    /// Whether this node currently holds sub-node entries.
    #[must_use]
    pub fn is_branch(&self) -> bool {
        matches!(self.kind, NodeKind::Branch(_))
    }

    /// Whether this node currently holds leaf-value entries.
    #[must_use]
    pub fn is_leaf(&self) -> bool {
        matches!(self.kind, NodeKind::Leaf(_))
    }

    /// The node's own parsed value (e.g. a deserialized node header),
    /// if one has been set.
    #[must_use]
    pub fn get_value(&self) -> Option<&V> {
        self.value.as_ref().map(Owned::get)
    }

    /// Sets the node's own parsed value, replacing any previous one.
    pub fn set_value(&mut self, value: Owned<V>) {
        self.value = Some(value);
    }

    /// How many sub-node entries this node holds (0 if not a branch).
    #[must_use]
    pub fn get_number_of_sub_nodes(&self) -> usize {
        match &self.kind {
            NodeKind::Branch(entries) => entries.len(),
            _ => 0,
        }
    }

    /// The physical range of the sub-node entry at `index`.
    pub fn get_sub_node_data_range_by_index(&self, index: usize) -> Result<Range> {
        match &self.kind {
            NodeKind::Branch(entries) => {
                entries.get(index).map(TreeRange::range).ok_or(Error::OutOfBounds)
            }
            _ => Err(Error::Unsupported("node is not a branch")),
        }
    }

    /// The sub-node entry at `index`, range and key value together.
    pub fn get_sub_node_by_index(&self, index: usize) -> Result<&TreeRange<K>> {
        match &self.kind {
            NodeKind::Branch(entries) => entries.get(index).ok_or(Error::OutOfBounds),
            _ => Err(Error::Unsupported("node is not a branch")),
        }
    }

    /// Replaces the sub-node entry at `index` in place. Invalidates the
    /// cached leaf-count aggregates, since a replaced child may now cover
    /// a different number of leaf values.
    pub fn set_sub_node_by_index(&mut self, index: usize, entry: TreeRange<K>) -> Result<()> {
        match &mut self.kind {
            NodeKind::Branch(entries) => {
                let slot = entries.get_mut(index).ok_or(Error::OutOfBounds)?;
                *slot = entry;
                self.aggregates_valid = false;
                Ok(())
            }
            NodeKind::Unset => Err(Error::ValueMissing("node kind")),
            NodeKind::Leaf(_) => Err(Error::Unsupported("node is not a branch")),
        }
    }

    /// Appends a sub-node entry. Fails if the node already holds leaf
    /// entries: branch and leaf content are mutually exclusive.
    pub fn append_sub_node(&mut self, entry: TreeRange<K>) -> Result<usize> {
        match &mut self.kind {
            NodeKind::Unset => {
                self.kind = NodeKind::Branch(vec![entry]);
            }
            NodeKind::Branch(entries) => {
                entries.push(entry);
            }
            NodeKind::Leaf(_) => return Err(Error::Unsupported("node is already a leaf")),
        }
        self.aggregates_valid = false;
        Ok(self.get_number_of_sub_nodes() - 1)
    }

    /// How many leaf-value entries this node holds (0 if not a leaf).
    #[must_use]
    pub fn get_number_of_leaf_values(&self) -> usize {
        match &self.kind {
            NodeKind::Leaf(entries) => entries.len(),
            _ => 0,
        }
    }

    /// The leaf-value entry at `index`, range and key value together.
    pub fn get_leaf_value_by_index(&self, index: usize) -> Result<&TreeRange<K>> {
        match &self.kind {
            NodeKind::Leaf(entries) => entries.get(index).ok_or(Error::OutOfBounds),
            _ => Err(Error::Unsupported("node is not a leaf")),
        }
    }

    /// Replaces the leaf-value entry at `index` in place.
    pub fn set_leaf_value_by_index(&mut self, index: usize, entry: TreeRange<K>) -> Result<()> {
        match &mut self.kind {
            NodeKind::Leaf(entries) => {
                let slot = entries.get_mut(index).ok_or(Error::OutOfBounds)?;
                *slot = entry;
                Ok(())
            }
            NodeKind::Unset => Err(Error::ValueMissing("node kind")),
            NodeKind::Branch(_) => Err(Error::Unsupported("node is not a leaf")),
        }
    }

    /// Appends a leaf value entry. Fails if the node already holds branch
    /// entries.
    pub fn append_leaf_value(&mut self, entry: TreeRange<K>) -> Result<usize> {
        match &mut self.kind {
            NodeKind::Unset => {
                self.kind = NodeKind::Leaf(vec![entry]);
            }
            NodeKind::Leaf(entries) => {
                entries.push(entry);
            }
            NodeKind::Branch(_) => return Err(Error::Unsupported("node is already a branch")),
        }
        Ok(self.get_number_of_leaf_values() - 1)
    }

    /// The number of leaf values reachable under this node: itself if a
    /// leaf, or the sum of its children's windows if a branch whose
    /// aggregates have already been computed by the tree walker.
    #[must_use]
    pub fn get_number_of_leaf_values_in_branch(&self) -> u64 {
        match &self.kind {
            NodeKind::Leaf(entries) => entries.len() as u64,
            NodeKind::Branch(_) => self.branch_number_of_leaf_values,
            NodeKind::Unset => 0,
        }
    }

    /// Whether this node's leaf-count aggregates can be trusted (always
    /// true for a leaf; for a branch, only after
    /// [`TreeNode::set_branch_leaf_values`] has run since the last
    /// structural change).
    #[must_use]
    pub fn aggregates_are_valid(&self) -> bool {
        match &self.kind {
            NodeKind::Leaf(_) => true,
            _ => self.aggregates_valid,
        }
    }

    /// Records the per-child leaf-value windows and their total, as
    /// computed once by the tree walker after recursively resolving every
    /// child's own leaf count. Called only on branch nodes.
    pub fn set_branch_leaf_values(&mut self, child_windows: Vec<LeafWindow>) {
        self.branch_number_of_leaf_values =
            child_windows.iter().map(|w| w.number_of_leaf_values).sum();
        self.child_windows = child_windows;
        self.aggregates_valid = true;
    }

    /// Resolves a flat leaf-value index (relative to this branch) down to
    /// the index of the owning child and the leaf index relative to that
    /// child's own window. Requires `set_branch_leaf_values` to have run.
    pub fn get_sub_node_data_range_by_mapped_index(
        &self,
        mapped_index: u64,
    ) -> Result<(usize, u64)> {
        if !matches!(self.kind, NodeKind::Branch(_)) {
            return Err(Error::Unsupported("node is not a branch"));
        }
        if !self.aggregates_valid {
            return Err(Error::ValueMissing("branch leaf-value aggregates"));
        }
        if mapped_index >= self.branch_number_of_leaf_values {
            return Err(Error::OutOfBounds);
        }

        let child_index = partition_point(&self.child_windows, |w| w.end() <= mapped_index);
        let window = self
            .child_windows
            .get(child_index)
            .ok_or(Error::OutOfBounds)?;

        Ok((child_index, mapped_index - window.first_leaf_value_index))
    }
}
