// Copyright (c) 2024-present, fdata-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::binary_search::partition_point;
use crate::cache::{CacheEntry, ValueCache};
use crate::config::StreamConfig;
use crate::error::{Error, Result};
use crate::mapped_range::MappedRange;
use crate::range::Range;
use std::marker::PhantomData;
use std::sync::Arc;

/// Where a [`Stream::seek_offset`] measures from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Whence {
    /// Absolute, from the start of the logical stream.
    Set,
    /// Relative to the current cursor.
    Cur,
    /// Relative to the end of the logical stream.
    End,
}

/// Supplies the physical bytes behind a [`Stream`]'s segments.
///
/// A `SegmentSource` is an ordinary stateful object the stream owns,
/// rather than an opaque handle plus a set of free function pointers:
/// ordinary `Clone` and `Drop` cover lifetime management that would
/// otherwise need explicit bookkeeping.
pub trait SegmentSource<Io> {
    /// Fills `buf` completely from the given segment at `range`,
    /// starting at `range_offset` bytes into that segment. Must fill
    /// `buf` entirely or fail: partial reads are fatal to the caller.
    fn read_segment_data(
        &self,
        io: &mut Io,
        segment_index: usize,
        range: Range,
        range_offset: u64,
        buf: &mut [u8],
    ) -> Result<()>;

    /// Writes `buf` into the given segment at `range_offset` bytes into
    /// the segment. Optional; the default rejects all writes.
    fn write_segment_data(
        &self,
        io: &mut Io,
        segment_index: usize,
        range: Range,
        range_offset: u64,
        buf: &[u8],
    ) -> Result<()> {
        let _ = (io, segment_index, range, range_offset, buf);
        Err(Error::Unsupported("write_segment_data"))
    }

    /// Optional explicit positioning hook for sources whose physical
    /// storage needs it; the core never calls this itself (reads pass
    /// the resolved range+offset directly) but exposes it for callers
    /// who want to drive it explicitly via [`Stream::seek_segment`].
    fn seek_segment_offset(
        &self,
        io: &mut Io,
        segment_index: usize,
        range: Range,
        offset: i64,
        whence: Whence,
    ) -> Result<i64> {
        let _ = (io, segment_index, range, offset, whence);
        Err(Error::Unsupported("seek_segment_offset"))
    }
}

/// An ordered sequence of on-disk byte ranges, presented as a single
/// logical byte-addressable view with random-access read and seek.
///
/// The stream owns no bytes: every read funnels through the
/// caller-supplied [`SegmentSource`], with results cached by a
/// caller-supplied [`ValueCache`].
pub struct Stream<S, Io> {
    source: S,
    segments: Vec<Range>,
    mapped_ranges: Vec<MappedRange>,
    mapped_ranges_dirty: bool,
    data_size: u64,
    mapped_size: Option<u64>,
    cursor_offset: i64,
    cursor_segment_index: usize,
    cursor_segment_data_offset: u64,
    timestamp: u64,
    config: StreamConfig,
    _io: PhantomData<fn(&mut Io)>,
}

impl<S, Io> Stream<S, Io> {
    /// Creates an empty stream over `source`.
    #[must_use]
    pub fn new(source: S) -> Self {
        Self::with_config(source, StreamConfig::default())
    }

    /// Creates an empty stream over `source` with explicit tunables.
    #[must_use]
    pub fn with_config(source: S, config: StreamConfig) -> Self {
        Self {
            source,
            segments: Vec::new(),
            mapped_ranges: Vec::new(),
            mapped_ranges_dirty: false,
            data_size: 0,
            mapped_size: None,
            cursor_offset: 0,
            cursor_segment_index: 0,
            cursor_segment_data_offset: 0,
            timestamp: 0,
            config,
            _io: PhantomData,
        }
    }

    /// Current structural generation, bumped on every mutation that can
    /// invalidate a previously cached segment read.
    #[must_use]
    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }

    fn bump_timestamp(&mut self) {
        self.timestamp = self.timestamp.wrapping_add(1);
        self.mapped_ranges_dirty = true;
    }

    // Re-derives `(cursor_segment_index, cursor_segment_data_offset)` from
    // `cursor_offset` against the current segment layout. Must run after
    // every structural mutation, not just ones that push the cursor past
    // the new end: a mutation can leave `cursor_offset` numerically
    // in-bounds while moving which segment actually backs that offset
    // (`set_segment_by_index`, `reverse_segments`, `resize_segments`).
    fn clamp_cursor(&mut self) {
        self.recompute_mapped_ranges_if_needed();

        let size = self.effective_size();
        if self.cursor_offset as u64 >= size {
            self.cursor_offset = size as i64;
            self.cursor_segment_index = self.segments.len();
            self.cursor_segment_data_offset = 0;
        } else {
            let offset = self.cursor_offset as u64;
            let idx = partition_point(&self.mapped_ranges, |m| m.end() <= offset);
            match self.mapped_ranges.get(idx) {
                Some(mapped) => {
                    self.cursor_segment_index = idx;
                    self.cursor_segment_data_offset = offset - mapped.logical_offset;
                }
                None => {
                    self.cursor_segment_index = self.segments.len();
                    self.cursor_segment_data_offset = 0;
                }
            }
        }

        if let Some(mapped) = self.mapped_size {
            if mapped > self.data_size {
                self.mapped_size = Some(self.data_size);
            }
        }
    }

    // --- Segment mutation -------------------------------------------------

    /// Appends a segment, returning its index.
    pub fn append_segment(&mut self, range: Range) -> Result<usize> {
        let index = self.segments.len();
        self.data_size += range.size();
        self.segments.push(range);
        self.mapped_ranges.push(MappedRange::default());
        self.bump_timestamp();
        self.clamp_cursor();
        Ok(index)
    }

    /// Replaces the segment at `index`. Subtracts the prior segment's size
    /// from `data_size` before adding the new one.
    pub fn set_segment_by_index(&mut self, index: usize, range: Range) -> Result<()> {
        let slot = self
            .segments
            .get_mut(index)
            .ok_or(Error::OutOfBounds)?;
        self.data_size = self.data_size - slot.size() + range.size();
        *slot = range;
        self.bump_timestamp();
        self.clamp_cursor();
        Ok(())
    }

    /// Grows or shrinks the segment sequence. New slots are unset ranges.
    pub fn resize_segments(&mut self, n: usize) -> Result<()> {
        if n < self.segments.len() {
            self.segments.truncate(n);
        } else {
            self.segments.resize_with(n, Range::unset);
        }
        self.mapped_ranges.resize_with(n, MappedRange::default);
        self.data_size = self.segments.iter().map(Range::size).sum();
        self.bump_timestamp();
        self.clamp_cursor();
        Ok(())
    }

    /// Removes all segments, resetting the logical size to zero.
    pub fn empty_segments(&mut self) {
        self.segments.clear();
        self.mapped_ranges.clear();
        self.data_size = 0;
        self.mapped_size = None;
        self.cursor_offset = 0;
        self.cursor_segment_index = 0;
        self.cursor_segment_data_offset = 0;
        self.bump_timestamp();
    }

    /// Reverses the order of segments in place.
    pub fn reverse_segments(&mut self) {
        self.segments.reverse();
        self.bump_timestamp();
        self.clamp_cursor();
    }

    // --- Queries ------------------------------------------------------

    /// How many segments currently make up this stream.
    #[must_use]
    pub fn get_number_of_segments(&self) -> usize {
        self.segments.len()
    }

    /// Returns the physical range of the segment at `index`.
    pub fn get_segment_by_index(&self, index: usize) -> Result<Range> {
        self.segments.get(index).copied().ok_or(Error::OutOfBounds)
    }

    fn recompute_mapped_ranges_if_needed(&mut self) {
        if !self.mapped_ranges_dirty {
            return;
        }

        let mut running = 0u64;
        self.mapped_ranges.clear();
        self.mapped_ranges.reserve(self.segments.len());

        for segment in &self.segments {
            self.mapped_ranges
                .push(MappedRange::new(running, segment.size()));
            running += segment.size();
        }

        self.mapped_ranges_dirty = false;
    }

    /// Returns `(logical_offset, size)` for segment `index`, recomputing
    /// the mapped-range index first if it is stale.
    pub fn get_segment_mapped_range(&mut self, index: usize) -> Result<MappedRange> {
        self.recompute_mapped_ranges_if_needed();
        self.mapped_ranges.get(index).copied().ok_or(Error::OutOfBounds)
    }

    /// The stream's current logical size (the mapped size, if set,
    /// otherwise the sum of segment sizes).
    #[must_use]
    pub fn get_size(&self) -> u64 {
        self.effective_size()
    }

    fn effective_size(&self) -> u64 {
        self.mapped_size.unwrap_or(self.data_size)
    }

    /// The cursor's current logical offset.
    #[must_use]
    pub fn get_offset(&self) -> i64 {
        self.cursor_offset
    }

    /// The truncated logical view size, if one has been set.
    #[must_use]
    pub fn get_mapped_size(&self) -> Option<u64> {
        self.mapped_size
    }

    /// Sets a truncated logical view size. `n` must not exceed the sum of
    /// segment sizes.
    pub fn set_mapped_size(&mut self, n: u64) -> Result<()> {
        if n > self.data_size {
            return Err(Error::InvalidArgument("mapped_size exceeds data_size"));
        }
        self.mapped_size = Some(n);
        self.clamp_cursor();
        Ok(())
    }

    /// Resolves the segment and in-segment offset covering logical offset
    /// `logical`. Fails with [`Error::OutOfBounds`] when `logical` is at
    /// or beyond the effective size.
    pub fn get_segment_index_at_offset(&mut self, logical: u64) -> Result<(usize, u64)> {
        self.recompute_mapped_ranges_if_needed();

        if logical >= self.effective_size() {
            return Err(Error::OutOfBounds);
        }

        let idx = partition_point(&self.mapped_ranges, |m| m.end() <= logical);
        let mapped = self.mapped_ranges.get(idx).ok_or(Error::OutOfBounds)?;
        Ok((idx, logical - mapped.logical_offset))
    }

    // --- Cached segment reads ------------------------------------------

    fn segment_cache_slot(&self, segment_index: usize, capacity: usize) -> usize {
        if capacity == 0 {
            0
        } else {
            segment_index % capacity
        }
    }

    fn read_segment_cached<C>(
        &mut self,
        io: &mut Io,
        cache: &C,
        segment_index: usize,
    ) -> Result<Arc<[u8]>>
    where
        S: SegmentSource<Io>,
        C: ValueCache<Arc<[u8]>>,
    {
        let range = self.get_segment_by_index(segment_index)?;
        let slot = self.segment_cache_slot(segment_index, cache.capacity());

        if let Some(entry) = cache.get_slot(slot) {
            if entry.matches(range.file_index(), range.offset(), self.timestamp) {
                log::trace!("segment cache hit at slot {slot}");
                return Ok(entry.value);
            }
            log::trace!("segment cache stale/collided at slot {slot}");
        }

        let size = usize::try_from(range.size()).map_err(|_| Error::MemoryError)?;
        let mut buf = vec![0u8; size];
        let chunk_cap = self.config.max_segment_chunk_bytes();

        let mut pos = 0usize;
        while pos < size {
            let this_chunk = chunk_cap.min(size - pos);
            let end = pos + this_chunk;
            self.source.read_segment_data(
                io,
                segment_index,
                range,
                pos as u64,
                &mut buf[pos..end],
            )?;
            pos = end;
        }

        let value: Arc<[u8]> = Arc::from(buf.into_boxed_slice());
        cache.set_slot(
            slot,
            CacheEntry::new(range.file_index(), range.offset(), self.timestamp, value.clone()),
        );
        Ok(value)
    }

    /// Reads up to `buf.len()` bytes starting at the cursor, advancing it.
    /// Returns the number of bytes actually read (0 at end of stream).
    pub fn read_buffer<C>(&mut self, io: &mut Io, cache: &C, buf: &mut [u8]) -> Result<usize>
    where
        S: SegmentSource<Io>,
        C: ValueCache<Arc<[u8]>>,
    {
        self.recompute_mapped_ranges_if_needed();

        let mut written = 0usize;

        while written < buf.len() && (self.cursor_offset as u64) < self.effective_size() {
            let segment_index = self.cursor_segment_index;
            if segment_index >= self.segments.len() {
                break;
            }

            let segment_buf = self.read_segment_cached(io, cache, segment_index)?;
            let data_offset = self.cursor_segment_data_offset as usize;
            let avail_in_segment = segment_buf.len() - data_offset;

            let remaining_logical =
                (self.effective_size() - self.cursor_offset as u64) as usize;

            let to_copy = (buf.len() - written)
                .min(avail_in_segment)
                .min(remaining_logical);

            if to_copy == 0 {
                break;
            }

            buf[written..written + to_copy]
                .copy_from_slice(&segment_buf[data_offset..data_offset + to_copy]);

            written += to_copy;
            self.cursor_offset += to_copy as i64;
            self.cursor_segment_data_offset += to_copy as u64;

            if self.cursor_segment_data_offset as usize == segment_buf.len() {
                self.cursor_segment_index += 1;
                self.cursor_segment_data_offset = 0;
            }
        }

        Ok(written)
    }

    /// Equivalent to `seek_offset(offset, Whence::Set)` followed by
    /// [`Stream::read_buffer`].
    pub fn read_buffer_at_offset<C>(
        &mut self,
        io: &mut Io,
        cache: &C,
        buf: &mut [u8],
        offset: i64,
    ) -> Result<usize>
    where
        S: SegmentSource<Io>,
        C: ValueCache<Arc<[u8]>>,
    {
        self.seek_offset(offset, Whence::Set)?;
        self.read_buffer(io, cache, buf)
    }

    /// Moves the cursor. Succeeds at exactly the end of stream (parking
    /// the cursor past the last segment); fails with
    /// [`Error::OutOfBounds`] beyond that.
    pub fn seek_offset(&mut self, offset: i64, whence: Whence) -> Result<i64> {
        self.recompute_mapped_ranges_if_needed();

        let size = self.effective_size() as i64;
        let target = match whence {
            Whence::Set => offset,
            Whence::Cur => self
                .cursor_offset
                .checked_add(offset)
                .ok_or(Error::InvalidArgument("seek overflow"))?,
            Whence::End => size
                .checked_add(offset)
                .ok_or(Error::InvalidArgument("seek overflow"))?,
        };

        if target < 0 || target > size {
            return Err(Error::OutOfBounds);
        }

        if target == size {
            self.cursor_offset = target;
            self.cursor_segment_index = self.segments.len();
            self.cursor_segment_data_offset = 0;
            return Ok(target);
        }

        let (idx, data_offset) = self.get_segment_index_at_offset(target as u64)?;
        self.cursor_offset = target;
        self.cursor_segment_index = idx;
        self.cursor_segment_data_offset = data_offset;
        Ok(target)
    }

    /// Writes `buf.len()` bytes at the cursor, advancing it. Fails with
    /// [`Error::Unsupported`] if the source has no write support.
    pub fn write_buffer(&mut self, io: &mut Io, buf: &[u8]) -> Result<usize>
    where
        S: SegmentSource<Io>,
    {
        self.recompute_mapped_ranges_if_needed();

        let mut written = 0usize;
        while written < buf.len() && (self.cursor_offset as u64) < self.effective_size() {
            let segment_index = self.cursor_segment_index;
            if segment_index >= self.segments.len() {
                break;
            }

            let range = self.get_segment_by_index(segment_index)?;
            let data_offset = self.cursor_segment_data_offset;
            let avail = range.size() - data_offset;
            let remaining_logical = self.effective_size() - self.cursor_offset as u64;
            let to_write = ((buf.len() - written) as u64)
                .min(avail)
                .min(remaining_logical) as usize;

            if to_write == 0 {
                break;
            }

            self.source.write_segment_data(
                io,
                segment_index,
                range,
                data_offset,
                &buf[written..written + to_write],
            )?;

            written += to_write;
            self.cursor_offset += to_write as i64;
            self.cursor_segment_data_offset += to_write as u64;

            if self.cursor_segment_data_offset == range.size() {
                self.cursor_segment_index += 1;
                self.cursor_segment_data_offset = 0;
            }
        }

        // A write invalidates any cached read of the touched segments.
        if written > 0 {
            self.bump_timestamp();
        }

        Ok(written)
    }

    /// Equivalent to `seek_offset(offset, Whence::Set)` followed by
    /// [`Stream::write_buffer`].
    pub fn write_buffer_at_offset(
        &mut self,
        io: &mut Io,
        buf: &[u8],
        offset: i64,
    ) -> Result<usize>
    where
        S: SegmentSource<Io>,
    {
        self.seek_offset(offset, Whence::Set)?;
        self.write_buffer(io, buf)
    }

    /// Explicit positioning pass-through, for sources that implement
    /// [`SegmentSource::seek_segment_offset`].
    pub fn seek_segment(
        &mut self,
        io: &mut Io,
        segment_index: usize,
        offset: i64,
        whence: Whence,
    ) -> Result<i64>
    where
        S: SegmentSource<Io>,
    {
        let range = self.get_segment_by_index(segment_index)?;
        self.source
            .seek_segment_offset(io, segment_index, range, offset, whence)
    }

    /// Deep-clones every segment range and the source, starting the
    /// clone's timestamp fresh.
    pub fn try_clone(&self) -> Result<Self>
    where
        S: Clone,
    {
        Ok(Self {
            source: self.source.clone(),
            segments: self.segments.clone(),
            mapped_ranges: self.mapped_ranges.clone(),
            mapped_ranges_dirty: self.mapped_ranges_dirty,
            data_size: self.data_size,
            mapped_size: self.mapped_size,
            cursor_offset: self.cursor_offset,
            cursor_segment_index: self.cursor_segment_index,
            cursor_segment_data_offset: self.cursor_segment_data_offset,
            timestamp: 0,
            config: self.config,
            _io: PhantomData,
        })
    }
}
