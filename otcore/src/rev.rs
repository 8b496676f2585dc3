//! Revision numbers: non-negative integers, strictly monotone per
//! change stream.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A revision number. Revision 0 is produced by the authorless,
/// timeless initial change; every appended change produces the
/// successor of the revision it was applied to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RevNum(u64);

impl RevNum {
    /// The initial revision.
    pub const ZERO: Self = Self(0);

    /// Wrap a raw revision number.
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// The raw value.
    pub fn value(&self) -> u64 {
        self.0
    }

    /// The revision that follows `prev`: 0 when there is no previous
    /// revision, `n + 1` otherwise.
    pub fn after(prev: Option<RevNum>) -> Self {
        match prev {
            None => Self::ZERO,
            Some(Self(n)) => Self(n + 1),
        }
    }

    /// The successor of this revision.
    pub fn next(&self) -> Self {
        Self(self.0 + 1)
    }

    /// The predecessor of this revision, or `None` at revision 0.
    pub fn prev(&self) -> Option<Self> {
        self.0.checked_sub(1).map(Self)
    }
}

impl fmt::Display for RevNum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "r{}", self.0)
    }
}
