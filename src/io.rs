// Copyright (c) 2024-present, fdata-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! The I/O backend is out of scope for this crate: it is an opaque type
//! parameter (`Io`, conventionally reserved for the underlying storage
//! object the caller's callbacks read from) that [`crate::Stream`] and
//! [`crate::Tree`] pass straight through to callbacks without inspecting.
//!
//! There is no trait bound on `Io` beyond what an individual
//! [`crate::stream::SegmentSource`] or [`crate::tree::NodeSource`]
//! implementation chooses to require.

/// Marker alias documenting the conventional "no I/O handle needed" case,
/// for callers whose segment/node sources are self-contained (e.g. they
/// hold their own open file handles) and don't need a second handle
/// threaded through every call.
pub type NoIo = ();
