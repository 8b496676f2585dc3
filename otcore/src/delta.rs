//! Generic delta, change, and snapshot values, parameterized by
//! [`Flavor`].
//!
//! All three are immutable values. A delta shares its op storage
//! through an `Arc`, so identity-preserving operations (composing with
//! an empty delta, `with_rev_num` at the same revision) hand back
//! values that share storage with the original.

use crate::error::OtError;
use crate::flavor::{Flavor, TransformFlavor};
use crate::id::AuthorId;
use crate::rev::RevNum;
use crate::time::TimeMs;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::sync::Arc;

/// An ordered sequence of ops of one flavor.
#[derive(Debug, Clone, PartialEq)]
pub struct Delta<F: Flavor> {
    ops: Arc<Vec<F::Op>>,
}

impl<F: Flavor> Delta<F> {
    /// The empty delta, the identity of composition.
    pub fn empty() -> Self {
        Self {
            ops: Arc::new(Vec::new()),
        }
    }

    /// Build a delta, validating every op.
    pub fn new(ops: Vec<F::Op>) -> Result<Self, OtError> {
        for op in &ops {
            F::validate_op(op)?;
        }
        Ok(Self::wrap(ops))
    }

    /// Wrap ops known to be valid (outputs of the flavor algebra).
    fn wrap(ops: Vec<F::Op>) -> Self {
        Self { ops: Arc::new(ops) }
    }

    /// The ops.
    pub fn ops(&self) -> &[F::Op] {
        &self.ops
    }

    /// Whether there are no ops.
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Whether this delta, composed onto the empty snapshot, produces
    /// a valid snapshot.
    pub fn is_document(&self) -> bool {
        F::is_document(&self.ops)
    }

    /// Whether two deltas share op storage. Used to observe identity
    /// returns; equal deltas need not share.
    pub fn shares_storage(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.ops, &other.ops)
    }

    /// Compose `other` onto this delta. With `want_document` the
    /// result must be a document delta.
    pub fn compose(&self, other: &Self, want_document: bool) -> Result<Self, OtError> {
        if other.is_empty() && (!want_document || self.is_document()) {
            return Ok(self.clone());
        }
        if self.is_empty() && other.is_document() {
            return Ok(other.clone());
        }
        F::compose(&self.ops, &other.ops, want_document).map(Self::wrap)
    }

    /// Difference of two document deltas: `self.compose(patch, true)`
    /// equals `newer`. Fails with [`OtError::BadUse`] on non-document
    /// input.
    pub fn diff(&self, newer: &Self) -> Result<Self, OtError> {
        if !self.is_document() || !newer.is_document() {
            return Err(OtError::BadUse(
                "diff is defined only for document deltas".into(),
            ));
        }
        F::diff(&self.ops, &newer.ops).map(Self::wrap)
    }

    /// Rebase this delta (produced against an older base) over
    /// `intervening` changes already applied, with the intervening
    /// side holding tie priority. Body transforms; last-writer-wins
    /// flavors come back unchanged.
    pub fn rebase(&self, intervening: &Self) -> Result<Self, OtError> {
        if intervening.is_empty() {
            return Ok(self.clone());
        }
        F::rebase(&self.ops, &intervening.ops).map(Self::wrap)
    }

    /// Canonical form: contiguous compatible runs merged.
    pub fn normalize(&self) -> Self {
        Self::wrap(F::normalize(&self.ops))
    }
}

impl<F: TransformFlavor> Delta<F> {
    /// Rebase this delta over `other`, both produced against the same
    /// base document. `this_is_first` gives this delta's insertions
    /// tie priority.
    pub fn transform(&self, other: &Self, this_is_first: bool) -> Result<Self, OtError> {
        if other.is_empty() {
            return Ok(self.clone());
        }
        F::transform(&self.ops, &other.ops, this_is_first).map(Self::wrap)
    }
}

impl<F: Flavor> Default for Delta<F> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<F: Flavor> Serialize for Delta<F> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.ops.as_slice().serialize(serializer)
    }
}

impl<'de, F: Flavor> Deserialize<'de> for Delta<F> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let ops = Vec::<F::Op>::deserialize(deserializer)?;
        Delta::new(ops).map_err(serde::de::Error::custom)
    }
}

/// A delta bundled with the revision number it produces and optional
/// authorship metadata. `timestamp` and `author_id` are absent on
/// synthetic changes (compositions of several changes, or the initial
/// change).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(bound(serialize = "F: Flavor", deserialize = "F: Flavor"))]
pub struct Change<F: Flavor> {
    /// The revision number produced by applying this change.
    pub rev_num: RevNum,
    /// The ops.
    pub delta: Delta<F>,
    /// When the change was made, if it reflects one author action.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<TimeMs>,
    /// Who made the change, if it reflects one author action.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author_id: Option<AuthorId>,
}

impl<F: Flavor> Change<F> {
    /// A fully attributed change.
    pub fn new(
        rev_num: RevNum,
        delta: Delta<F>,
        timestamp: Option<TimeMs>,
        author_id: Option<AuthorId>,
    ) -> Self {
        Self {
            rev_num,
            delta,
            timestamp,
            author_id,
        }
    }

    /// A synthetic change: no author, no timestamp.
    pub fn synthetic(rev_num: RevNum, delta: Delta<F>) -> Self {
        Self::new(rev_num, delta, None, None)
    }

    /// The authorless, timeless change that produces revision 0.
    pub fn initial() -> Self {
        Self::synthetic(RevNum::ZERO, Delta::empty())
    }
}

/// Materialized state: a revision number and a document delta.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(bound(serialize = "F: Flavor", deserialize = "F: Flavor"))]
#[serde(try_from = "SnapshotWire<F>")]
pub struct Snapshot<F: Flavor> {
    rev_num: RevNum,
    contents: Delta<F>,
}

/// Unvalidated snapshot shape used during deserialization.
#[derive(Deserialize)]
#[serde(bound(deserialize = "F: Flavor"))]
struct SnapshotWire<F: Flavor> {
    rev_num: RevNum,
    contents: Delta<F>,
}

impl<F: Flavor> TryFrom<SnapshotWire<F>> for Snapshot<F> {
    type Error = OtError;

    fn try_from(wire: SnapshotWire<F>) -> Result<Self, OtError> {
        Self::new(wire.rev_num, wire.contents)
    }
}

impl<F: Flavor> Snapshot<F> {
    /// The empty snapshot: revision 0, empty contents.
    pub fn empty() -> Self {
        Self {
            rev_num: RevNum::ZERO,
            contents: Delta::empty(),
        }
    }

    /// Build a snapshot. The contents must be a document delta.
    pub fn new(rev_num: RevNum, contents: Delta<F>) -> Result<Self, OtError> {
        if !contents.is_document() {
            return Err(OtError::BadValue(
                "snapshot contents must be a document delta".into(),
            ));
        }
        Ok(Self { rev_num, contents })
    }

    /// The revision number.
    pub fn rev_num(&self) -> RevNum {
        self.rev_num
    }

    /// The document contents.
    pub fn contents(&self) -> &Delta<F> {
        &self.contents
    }

    /// Apply one change. An empty change at this snapshot's revision
    /// returns a value sharing this snapshot's storage.
    pub fn compose(&self, change: &Change<F>) -> Result<Self, OtError> {
        if change.delta.is_empty() && change.rev_num == self.rev_num {
            return Ok(self.clone());
        }
        Ok(Self {
            rev_num: change.rev_num,
            contents: self.contents.compose(&change.delta, true)?,
        })
    }

    /// Apply a sequence of changes in order.
    pub fn compose_all<'a, I>(&self, changes: I) -> Result<Self, OtError>
    where
        I: IntoIterator<Item = &'a Change<F>>,
    {
        let mut snapshot = self.clone();
        for change in changes {
            snapshot = snapshot.compose(change)?;
        }
        Ok(snapshot)
    }

    /// The change that turns this snapshot into `newer`: revision
    /// number of `newer`, no timestamp, no author, delta empty iff the
    /// contents are equal.
    pub fn diff(&self, newer: &Self) -> Result<Change<F>, OtError> {
        let delta = self.contents.diff(&newer.contents)?;
        Ok(Change::synthetic(newer.rev_num, delta))
    }

    /// The same contents at a different revision. At the same revision
    /// this returns a value sharing this snapshot's storage.
    pub fn with_rev_num(&self, rev_num: RevNum) -> Self {
        if rev_num == self.rev_num {
            self.clone()
        } else {
            Self {
                rev_num,
                contents: self.contents.clone(),
            }
        }
    }
}

impl<F: Flavor> Default for Snapshot<F> {
    fn default() -> Self {
        Self::empty()
    }
}

// Flavor-specific conveniences.

use crate::caret::{Caret, CaretOp, Carets};
use crate::id::SessionId;
use crate::prop::{Properties, PropertyOp};

impl Snapshot<Carets> {
    /// The caret of one session, if present.
    pub fn caret(&self, session_id: &SessionId) -> Option<&Caret> {
        self.contents.ops().iter().find_map(|op| match op {
            CaretOp::BeginSession { caret } if &caret.session_id == session_id => Some(caret),
            _ => None,
        })
    }

    /// All carets, in session-id order.
    pub fn carets(&self) -> impl Iterator<Item = &Caret> {
        self.contents.ops().iter().filter_map(|op| match op {
            CaretOp::BeginSession { caret } => Some(caret),
            _ => None,
        })
    }
}

impl Snapshot<Properties> {
    /// One property's value, if set.
    pub fn property(&self, name: &str) -> Option<&serde_json::Value> {
        self.contents.ops().iter().find_map(|op| match op {
            PropertyOp::SetProperty { name: n, value } if n == name => Some(value),
            _ => None,
        })
    }
}
