//! # otcore — OT value types and store protocol for scribe
//!
//! This crate defines the operational-transform data model every
//! higher layer of the scribe server depends on, and the protocol
//! boundary for the file store that persists it.
//!
//! ## The flavors
//!
//! | Flavor | Ops | Document criterion |
//! |--------|-----|--------------------|
//! | [`Body`] | `text` / `embed` / `retain` / `delete` | all inserts |
//! | [`Carets`] | `begin_session` / `set_field` / `end_session` | distinct `begin_session`s |
//! | [`Properties`] | `set_property` / `delete_property` | distinct `set_property`s |
//!
//! Each flavor is a marker type implementing [`Flavor`] over a
//! tagged-union op type; [`Delta`], [`Change`], and [`Snapshot`] are
//! generic over the flavor. All values are immutable, and deltas share
//! op storage so identity-preserving operations stay cheap.
//!
//! ## The algebra
//!
//! - `compose` is associative with the empty delta as identity.
//! - `diff` inverts composition: `old.compose(old.diff(new)) == new`.
//! - Body additionally supports [`transform`](delta::Delta::transform):
//!   two deltas produced against the same base converge,
//!   `a.compose(b.transform(a, false)) == b.compose(a.transform(b, true))`.
//!
//! Pure OT operations are synchronous and never block; only the store
//! protocol in [`store`] suspends.

#![deny(missing_docs)]

pub mod attr;
pub mod body;
pub mod caret;
pub mod delta;
pub mod error;
pub mod flavor;
pub mod id;
pub mod prop;
pub mod rev;
pub mod store;
pub mod time;

// Re-exports for convenience
pub use attr::AttrMap;
pub use body::{Body, BodyOp};
pub use caret::{Caret, CaretField, CaretOp, Carets};
pub use delta::{Change, Delta, Snapshot};
pub use error::{OtError, StoreError};
pub use flavor::{Flavor, TransformFlavor};
pub use id::{
    AuthorId, CaretId, DocumentId, FileId, IdPredicate, SessionId, TargetId, default_id_syntax,
};
pub use prop::{Properties, PropertyOp};
pub use rev::RevNum;
pub use store::{FileHandle, FileStore, Timeouts};
pub use time::{DurationMs, TimeMs};

/// Body delta.
pub type BodyDelta = Delta<Body>;
/// Body change.
pub type BodyChange = Change<Body>;
/// Body snapshot.
pub type BodySnapshot = Snapshot<Body>;
/// Caret delta.
pub type CaretDelta = Delta<Carets>;
/// Caret change.
pub type CaretChange = Change<Carets>;
/// Caret snapshot.
pub type CaretSnapshot = Snapshot<Carets>;
/// Property delta.
pub type PropertyDelta = Delta<Properties>;
/// Property change.
pub type PropertyChange = Change<Properties>;
/// Property snapshot.
pub type PropertySnapshot = Snapshot<Properties>;
