//! The flavor protocol — how one family of ops composes, diffs, and
//! rebases.
//!
//! Three flavors exist: [`Body`](crate::body::Body) (rich text),
//! [`Carets`](crate::caret::Carets) (per-session cursor state), and
//! [`Properties`](crate::prop::Properties) (document metadata). Each is
//! a zero-sized marker implementing this trait over its tagged-union op
//! type; the generic [`Delta`](crate::delta::Delta) /
//! [`Change`](crate::delta::Change) / [`Snapshot`](crate::delta::Snapshot)
//! values are parameterized by it.

use crate::error::OtError;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fmt::Debug;

/// One OT flavor: an op family plus its algebra.
///
/// Implementations must keep [`compose`](Flavor::compose) associative
/// with the empty op sequence as identity, and
/// [`diff`](Flavor::diff) inverse to composition:
/// `compose(old, diff(old, new), true) == new` for document inputs.
pub trait Flavor:
    Sized + Copy + Clone + PartialEq + Eq + Debug + Send + Sync + 'static
{
    /// The tagged-union op payload for this flavor.
    type Op: Clone + PartialEq + Debug + Serialize + DeserializeOwned + Send + Sync + 'static;

    /// Flavor tag used by codecs and diagnostics.
    const NAME: &'static str;

    /// Check one op's argument types and ranges. Fails with
    /// [`OtError::BadValue`].
    fn validate_op(op: &Self::Op) -> Result<(), OtError>;

    /// Whether this op sequence, composed onto the empty snapshot,
    /// produces a valid snapshot.
    fn is_document(ops: &[Self::Op]) -> bool;

    /// Compose `b` onto `a`. With `want_document`, the result must be
    /// a document delta (and flavor-specific resolution rules apply,
    /// e.g. `set_field` against an unknown session is
    /// [`OtError::BadUse`]).
    fn compose(a: &[Self::Op], b: &[Self::Op], want_document: bool) -> Result<Vec<Self::Op>, OtError>;

    /// Rebase `delta` (produced against an older base) over
    /// `intervening` changes already applied, with the intervening
    /// side holding tie priority. Last-writer-wins flavors return the
    /// delta unchanged; Body performs a true operational transform.
    fn rebase(delta: &[Self::Op], intervening: &[Self::Op]) -> Result<Vec<Self::Op>, OtError> {
        let _ = intervening;
        Ok(delta.to_vec())
    }

    /// Difference of two *document* op sequences: the ops that turn
    /// `old` into `new`. Empty iff the documents are equal.
    fn diff(old: &[Self::Op], new: &[Self::Op]) -> Result<Vec<Self::Op>, OtError>;

    /// Canonical form: merge contiguous compatible runs. The default
    /// is the identity; flavors without run structure need nothing.
    fn normalize(ops: &[Self::Op]) -> Vec<Self::Op> {
        ops.to_vec()
    }
}

/// Flavors supporting a full operational transform. Only Body needs
/// one; the other flavors rebase trivially.
pub trait TransformFlavor: Flavor {
    /// Rebase `this` over `other`, where both were produced against
    /// the same base document. `this_is_first` gives `this`'s
    /// insertions tie priority: when both sides insert at the same
    /// position, the first-priority side's insertions come first in
    /// the converged document.
    ///
    /// Convergence: for any such pair,
    /// `compose(a, transform(b, a, false)) == compose(b, transform(a, b, true))`.
    fn transform(
        this: &[Self::Op],
        other: &[Self::Op],
        this_is_first: bool,
    ) -> Result<Vec<Self::Op>, OtError>;
}
