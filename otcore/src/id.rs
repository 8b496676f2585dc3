//! Typed ID wrappers for author, document, file, caret, session, and
//! target identifiers.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Typed ID wrappers prevent mixing up author IDs, document IDs, etc.
/// These are opaque strings underneath — compared only by equality,
/// never parsed or ordered by the protocol itself.
macro_rules! typed_id {
    ($name:ident, $doc:expr) => {
        #[doc = $doc]
        #[derive(Debug, Clone, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
        pub struct $name(pub String);

        impl $name {
            /// Create a new typed ID from anything that converts to String.
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Borrow the inner string.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_owned())
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }
    };
}

typed_id!(AuthorId, "Unique identifier for an author (an editing identity).");
typed_id!(DocumentId, "Unique identifier for a document.");
typed_id!(FileId, "Unique identifier for a stored change-log file.");
typed_id!(CaretId, "Public identifier of a caret (equal to its session's id).");
typed_id!(SessionId, "Unique identifier for an editing session on a document.");
typed_id!(TargetId, "Identifier of a capability target callable by remote id.");

impl From<CaretId> for SessionId {
    fn from(id: CaretId) -> Self {
        Self(id.0)
    }
}

impl From<SessionId> for CaretId {
    fn from(id: SessionId) -> Self {
        Self(id.0)
    }
}

/// Syntactic predicate applied to externally supplied identifiers.
/// Layers that accept ids off the wire run this (or a configured
/// replacement) before doing anything else with them.
pub type IdPredicate = fn(&str) -> bool;

/// The default identifier syntax: 1–64 characters drawn from
/// ASCII alphanumerics, `-`, `_`, and `.`.
pub fn default_id_syntax(s: &str) -> bool {
    !s.is_empty()
        && s.len() <= 64
        && s.chars()
            .all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '-' | '_' | '.'))
}
