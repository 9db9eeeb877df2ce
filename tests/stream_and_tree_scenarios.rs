// Copyright (c) 2024-present, fdata-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! End-to-end exercises over an in-memory fake "file" backend, covering
//! the concrete scenarios a caller-supplied `SegmentSource`/`NodeSource`
//! would hit in practice: multi-segment streams, truncated logical
//! views, and B-tree leaf lookups through more than one branch level.

use fdata::cache::SharedCache;
use fdata::error::{Error, Result};
use fdata::range::{Owned, Range, TreeRange};
use fdata::stream::{SegmentSource, Stream, Whence};
use fdata::tree::{NodeSource, Tree};
use fdata::tree_node::TreeNode;
use std::collections::HashMap;
use std::sync::Arc;
use test_log::test;

#[derive(Clone)]
struct FakeFiles(HashMap<i32, Vec<u8>>);

impl SegmentSource<()> for FakeFiles {
    fn read_segment_data(
        &self,
        _io: &mut (),
        _segment_index: usize,
        range: Range,
        range_offset: u64,
        buf: &mut [u8],
    ) -> Result<()> {
        let file = self
            .0
            .get(&range.file_index())
            .ok_or(Error::InvalidArgument("no such file"))?;
        let start = range.offset() as usize + range_offset as usize;
        let end = start + buf.len();
        file.get(start..end)
            .ok_or(Error::OutOfBounds)
            .map(|slice| buf.copy_from_slice(slice))
    }
}

fn patterned_file(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

// spec.md S1 - a stream over two disjoint segments in the same file
// reads forward across the segment boundary.
#[test]
fn two_segment_stream_reads_across_boundary() {
    let mut files = HashMap::new();
    files.insert(1, patterned_file(16_384));
    let source = FakeFiles(files);

    let mut stream: Stream<FakeFiles, ()> = Stream::new(source.clone());
    stream
        .append_segment(Range::new(1, 1024, 2048, 0).unwrap())
        .unwrap();
    stream
        .append_segment(Range::new(1, 8192, 512, 0).unwrap())
        .unwrap();

    assert_eq!(stream.get_size(), 2560);

    let cache: SharedCache<Arc<[u8]>> = SharedCache::with_capacity(8);
    let mut io = ();

    // Read straddles the segment boundary: 2000 bytes from segment 0,
    // then into segment 1.
    let mut buf = vec![0u8; 2100];
    let n = stream.read_buffer(&mut io, &cache, &mut buf).unwrap();
    assert_eq!(n, 2100);
    assert_eq!(&buf[..2048], &source.0[&1][1024..1024 + 2048]);
    assert_eq!(&buf[2048..2100], &source.0[&1][8192..8192 + 52]);
}

// spec.md S2 - mapped size truncates the logical view below data_size.
#[test]
fn mapped_size_truncates_reads() {
    let mut files = HashMap::new();
    files.insert(1, patterned_file(16_384));
    let mut stream: Stream<FakeFiles, ()> = Stream::new(FakeFiles(files));

    stream
        .append_segment(Range::new(1, 0, 1000, 0).unwrap())
        .unwrap();
    stream
        .append_segment(Range::new(1, 2000, 1000, 0).unwrap())
        .unwrap();

    stream.set_mapped_size(1500).unwrap();
    assert_eq!(stream.get_size(), 1500);
    assert!(matches!(
        stream.seek_offset(1501, Whence::Set),
        Err(Error::OutOfBounds)
    ));

    let cache: SharedCache<Arc<[u8]>> = SharedCache::with_capacity(8);
    let mut io = ();
    let mut buf = vec![0u8; 4000];
    let n = stream.read_buffer(&mut io, &cache, &mut buf).unwrap();
    assert_eq!(n, 1500);
}

// A three-level B-tree (root -> branches -> leaves) over a fake index
// file, keyed by offset acting as a node id. Exercises leaf-value
// lookup across more than one branch hop, the way a real on-disk index
// would nest.
struct FakeIndex;

const ROOT: i64 = 0;
const BRANCH: [i64; 2] = [10, 20];
const LEAF_COUNTS: [usize; 2] = [3, 5];

impl NodeSource<()> for FakeIndex {
    type Value = u64;
    type Key = u32;

    fn read_node(&self, _io: &mut (), range: Range, level: u16) -> Result<TreeNode<u64, u32>> {
        let mut node = TreeNode::new(level);

        if range.offset() == ROOT {
            for (i, &branch_offset) in BRANCH.iter().enumerate() {
                node.append_sub_node(TreeRange::new(
                    Range::new(1, branch_offset, 0, 0)?,
                    Some(Owned::Owned(i as u32)),
                ))?;
            }
            return Ok(node);
        }

        if let Some(branch_index) = BRANCH.iter().position(|&b| b == range.offset()) {
            let count = LEAF_COUNTS[branch_index];
            for leaf_index in 0..count {
                let leaf_id = (branch_index as i64) * 1000 + leaf_index as i64;
                node.append_leaf_value(TreeRange::new(
                    Range::new(1, 100 + leaf_id, 0, 0)?,
                    Some(Owned::Owned(leaf_id as u32)),
                ))?;
            }
            return Ok(node);
        }

        // Leaf value materialization: value is the node id itself.
        node.set_value(Owned::Owned(range.offset() as u64));
        Ok(node)
    }
}

#[test]
fn tree_resolves_leaf_values_across_branches() {
    let mut tree: Tree<FakeIndex, ()> = Tree::new(FakeIndex);
    tree.set_root_node(Range::new(1, ROOT, 0, 0).unwrap())
        .unwrap();
    let cache = SharedCache::with_capacity(32);
    let mut io = ();

    let total = tree.get_number_of_leaf_values(&mut io, &cache).unwrap();
    assert_eq!(total, 8);

    // First branch's third leaf: global index 2.
    let (key, _) = tree.get_leaf_value_by_index(&mut io, &cache, 2).unwrap();
    assert_eq!(key.as_deref(), Some(&2));

    // Second branch's first leaf: global index 3.
    let (key, _) = tree.get_leaf_value_by_index(&mut io, &cache, 3).unwrap();
    assert_eq!(key.as_deref(), Some(&1000));

    assert!(matches!(
        tree.get_leaf_value_by_index(&mut io, &cache, 8),
        Err(Error::OutOfBounds)
    ));
}

#[test]
fn stream_clone_is_independent_of_original() {
    let mut files = HashMap::new();
    files.insert(1, patterned_file(4096));
    let mut stream: Stream<FakeFiles, ()> = Stream::new(FakeFiles(files));
    stream
        .append_segment(Range::new(1, 0, 512, 0).unwrap())
        .unwrap();

    let mut clone = stream.try_clone().unwrap();
    clone
        .append_segment(Range::new(1, 1024, 256, 0).unwrap())
        .unwrap();

    assert_eq!(stream.get_number_of_segments(), 1);
    assert_eq!(clone.get_number_of_segments(), 2);
}
