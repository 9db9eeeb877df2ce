// Copyright (c) 2024-present, fdata-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

/// Default ceiling on a single `read_segment_data` invocation.
///
/// The cached-read algorithm never asks a callback to fill more than
/// this many bytes in one call; a segment larger than this is read (and
/// cached) in multiple chunks.
pub const DEFAULT_MAX_SEGMENT_CHUNK: usize = /* 4 MiB */ 4 * 1_024 * 1_024;

/// Default number of slots to reserve in a segment-buffer [`crate::cache::SharedCache`].
pub const DEFAULT_SEGMENT_CACHE_CAPACITY: usize = 1_024;

/// Default number of slots to reserve in a node [`crate::cache::SharedCache`].
pub const DEFAULT_NODE_CACHE_CAPACITY: usize = 1_024;

/// Tunables for a [`crate::Stream`].
///
/// Everything here is a policy choice layered on top of the wire format
/// (which the caller's callbacks own); none of it is persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamConfig {
    max_segment_chunk: usize,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            max_segment_chunk: DEFAULT_MAX_SEGMENT_CHUNK,
        }
    }
}

impl StreamConfig {
    /// Default stream tunables.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Caps how many bytes a single `read_segment_data` invocation may be
    /// asked to fill.
    ///
    /// # Panics
    ///
    /// Panics if `bytes` is 0.
    #[must_use]
    pub fn max_segment_chunk(mut self, bytes: usize) -> Self {
        assert!(bytes > 0, "max_segment_chunk must be positive");
        self.max_segment_chunk = bytes;
        self
    }

    #[must_use]
    pub(crate) fn max_segment_chunk_bytes(&self) -> usize {
        self.max_segment_chunk
    }
}

/// Tunables for a [`crate::Tree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TreeConfig {
    node_cache_capacity: usize,
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self {
            node_cache_capacity: DEFAULT_NODE_CACHE_CAPACITY,
        }
    }
}

impl TreeConfig {
    /// Default tree tunables.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Informational capacity hint handed to `calculate_cache_entry_index`
    /// as `capacity` when the caller doesn't have one of its own.
    #[must_use]
    pub fn node_cache_capacity(mut self, capacity: usize) -> Self {
        assert!(capacity > 0, "node_cache_capacity must be positive");
        self.node_cache_capacity = capacity;
        self
    }

    #[must_use]
    pub(crate) fn node_cache_capacity_hint(&self) -> usize {
        self.node_cache_capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stream_config_defaults() {
        let cfg = StreamConfig::default();
        assert_eq!(cfg.max_segment_chunk_bytes(), DEFAULT_MAX_SEGMENT_CHUNK);
    }

    #[test]
    #[should_panic(expected = "positive")]
    fn stream_config_rejects_zero_chunk() {
        StreamConfig::new().max_segment_chunk(0);
    }

    #[test]
    fn tree_config_builder() {
        let cfg = TreeConfig::new().node_cache_capacity(64);
        assert_eq!(cfg.node_cache_capacity_hint(), 64);
    }
}
