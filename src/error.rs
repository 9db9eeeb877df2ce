// Copyright (c) 2024-present, fdata-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use std::fmt;

/// Represents errors that can occur while resolving a [`crate::Stream`] or
/// walking a [`crate::Tree`].
///
/// The variants mirror the closed taxonomy the core distinguishes between:
/// argument-layer mistakes the caller can fix, state the caller forgot to
/// set up, operations the current node kind forbids, and failures that
/// bubble up from caller-supplied callbacks.
#[derive(Debug)]
pub enum Error {
    /// A malformed argument: a negative size, an unknown `whence`, or
    /// similar argument-layer mistake.
    InvalidArgument(&'static str),

    /// An attempt to initialize or set something that already has a value
    /// (double-init guard).
    AlreadySet(&'static str),

    /// A required callback was absent, or dependent state (e.g. the root
    /// range of a [`crate::Tree`]) was never set, at the point it was needed.
    ValueMissing(&'static str),

    /// The operation is forbidden by the current node kind (appending a
    /// sub-node to a leaf, or vice versa) or by a missing optional callback
    /// (write support).
    Unsupported(&'static str),

    /// A cursor or index reached beyond the constructed extent of a
    /// stream or node.
    OutOfBounds,

    /// Allocation failure while growing an internal collection.
    MemoryError,

    /// A caller-supplied callback returned an error; it is attached as the
    /// cause.
    IoError(Box<dyn std::error::Error + Send + Sync + 'static>),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidArgument(what) => write!(f, "invalid argument: {what}"),
            Self::AlreadySet(what) => write!(f, "already set: {what}"),
            Self::ValueMissing(what) => write!(f, "value missing: {what}"),
            Self::Unsupported(what) => write!(f, "unsupported: {what}"),
            Self::OutOfBounds => write!(f, "index or offset out of bounds"),
            Self::MemoryError => write!(f, "memory allocation failed"),
            Self::IoError(cause) => write!(f, "callback error: {cause}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::IoError(cause) => Some(cause.as_ref()),
            _ => None,
        }
    }
}

impl Error {
    /// Wraps an arbitrary callback error as [`Error::IoError`].
    pub fn from_callback<E>(cause: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::IoError(Box::new(cause))
    }
}

/// Result type used throughout this crate.
pub type Result<T> = std::result::Result<T, Error>;
