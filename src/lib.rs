// Copyright (c) 2024-present, fdata-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

#![forbid(unsafe_code)]
#![deny(clippy::all, missing_docs, clippy::cargo)]
#![allow(clippy::module_name_repetitions)]

//! Lazy, cache-backed virtualization of byte ranges scattered across one
//! or more backing files, plus traversal of on-disk B-tree indices built
//! over them.
//!
//! ##### About
//!
//! Forensic and archival file formats routinely split one logical piece
//! of data across several non-contiguous ranges of one or more physical
//! files: a fragmented NTFS attribute, a split archive volume, a
//! paginated database record. This crate provides two building blocks
//! for presenting such scattered storage as something an ordinary parser
//! can treat like a single seekable byte stream or a single flat index,
//! without ever performing I/O itself:
//!
//! - [`Stream`] presents an ordered sequence of `(file, offset, size)`
//!   segments as one logical, randomly-addressable byte range.
//! - [`Tree`] walks an on-disk B-tree (the kind many such formats use to
//!   index their own records) lazily, a node at a time, and exposes its
//!   leaf values as one flat, randomly-addressable index.
//!
//! Both are deliberately inert: they hold no file handles and know
//! nothing about any wire format. All actual reading (and, optionally,
//! writing) is delegated to a caller-supplied [`stream::SegmentSource`]
//! or [`tree::NodeSource`] implementation, and all caching goes through
//! the narrow [`cache::ValueCache`] trait, with [`cache::SharedCache`]
//! provided as a ready-to-use default.
//!
//! # Example usage
//!
//! ```
//! use fdata::cache::SharedCache;
//! use fdata::error::Result;
//! use fdata::range::Range;
//! use fdata::stream::{SegmentSource, Stream};
//! use std::sync::Arc;
//!
//! struct InMemoryFile(Vec<u8>);
//!
//! impl SegmentSource<()> for InMemoryFile {
//!     fn read_segment_data(
//!         &self,
//!         _io: &mut (),
//!         _segment_index: usize,
//!         range: Range,
//!         range_offset: u64,
//!         buf: &mut [u8],
//!     ) -> Result<()> {
//!         let start = range.offset() as usize + range_offset as usize;
//!         buf.copy_from_slice(&self.0[start..start + buf.len()]);
//!         Ok(())
//!     }
//! }
//!
//! # fn main() -> Result<()> {
//! let mut stream = Stream::new(InMemoryFile(vec![0u8; 4096]));
//! stream.append_segment(Range::new(0, 0, 1024, 0)?)?;
//! stream.append_segment(Range::new(0, 2048, 512, 0)?)?;
//! assert_eq!(stream.get_size(), 1536);
//!
//! let cache: SharedCache<Arc<[u8]>> = SharedCache::with_capacity(64);
//! let mut buf = [0u8; 16];
//! let mut io = ();
//! stream.read_buffer(&mut io, &cache, &mut buf)?;
//! # Ok(())
//! # }
//! ```

pub(crate) mod binary_search;

/// The slot-addressed caching contract shared by [`Stream`] and [`Tree`],
/// plus a ready-to-use `quick_cache`-backed implementation.
pub mod cache;

/// Tunables for [`Stream`] and [`Tree`].
pub mod config;

/// The error type returned throughout this crate.
pub mod error;

/// The opaque I/O handle type parameter threaded through callbacks.
pub mod io;

/// A stream's logical-offset index over its segments.
pub mod mapped_range;

/// The physical byte-range descriptor shared by streams and trees.
pub mod range;

/// The segmented logical byte stream.
pub mod stream;

/// The on-disk B-tree traversal engine.
pub mod tree;

/// The parsed B-tree node representation.
pub mod tree_node;

pub use cache::{CacheEntry, SharedCache, ValueCache};
pub use config::{StreamConfig, TreeConfig};
pub use error::{Error, Result};
pub use io::NoIo;
pub use mapped_range::MappedRange;
pub use range::{Owned, Range, TreeRange};
pub use stream::{SegmentSource, Stream, Whence};
pub use tree::{NodeSource, Tree};
pub use tree_node::{LeafWindow, NodeKind, TreeNode};
