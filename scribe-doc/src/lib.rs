#![deny(missing_docs)]
//! Per-document write serialization and snapshot materialization.
//!
//! A [`DocControl`] owns one flavor of one document's change log: it
//! serializes the update protocol (append, lost-race retry, rebase of
//! stale deltas over intervening changes), caches the latest snapshot,
//! and lets subscribers block for revisions they have not seen. The
//! [`Documents`] registry hands out at most one coordinator bundle per
//! document id.

mod control;
mod documents;
mod error;

pub use control::{DEFAULT_MAX_UPDATE_ATTEMPTS, DocControl};
pub use documents::{DocumentHandles, Documents};
pub use error::DocError;
