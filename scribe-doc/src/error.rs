//! Coordinator errors.

use otcore::{OtError, StoreError};
use thiserror::Error;

/// Errors from the document coordinator.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum DocError {
    /// A pure OT error propagated unchanged.
    #[error("ot error: {0}")]
    Ot(#[from] OtError),

    /// A store error propagated unchanged (including timeouts).
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// The update retry loop hit its attempt cap. Two writers on the
    /// same handle are serialized, so this indicates a broken
    /// serialization invariant rather than ordinary contention.
    #[error("append contention exhausted {0} attempts")]
    Contention(usize),
}
