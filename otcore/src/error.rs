//! Error types for the OT value layer and the store protocol.

use crate::rev::RevNum;
use crate::time::DurationMs;
use thiserror::Error;

/// Errors from the pure OT operations (compose, diff, transform,
/// validation). These are surfaced to callers unchanged.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum OtError {
    /// An argument failed a type or shape predicate.
    #[error("bad value: {0}")]
    BadValue(String),

    /// An API contract was violated (e.g. `set_field` against an
    /// unknown session).
    #[error("bad use: {0}")]
    BadUse(String),

    /// Stored data failed a required invariant. Surfaced as an
    /// internal error and logged with full context.
    #[error("bad data: {0}")]
    BadData(String),
}

/// Errors from the file store. A lost append race is *not* an error —
/// [`FileHandle::append_change`](crate::store::FileHandle::append_change)
/// returns `false` for that case.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum StoreError {
    /// A blocking operation's deadline elapsed. Callers must
    /// propagate this; no silent retries.
    #[error("timed out after {0}")]
    TimedOut(DurationMs),

    /// The requested revision has aged out of (or never entered)
    /// the retained history.
    #[error("revision not available: {rev_num}")]
    RevisionNotAvailable {
        /// The revision that was requested.
        rev_num: RevNum,
    },

    /// Stored bytes failed a required invariant.
    #[error("bad data: {0}")]
    BadData(String),

    /// An underlying I/O operation failed.
    #[error("io error: {0}")]
    Io(String),

    /// Catch-all.
    #[error("{0}")]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}

impl StoreError {
    /// Wrap a std I/O error.
    pub fn io(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}
