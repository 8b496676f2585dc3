//! Authorization errors.

use thiserror::Error;

/// Errors from token handling and capability resolution.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum AuthError {
    /// A presented token failed the syntactic predicate. The message
    /// never includes the token itself.
    #[error("bad token: {0}")]
    BadToken(String),

    /// A presented token's secret did not match the stored one, or
    /// the caller lacks the capability it asked for.
    #[error("access refused")]
    Refused,

    /// The capability exists only in dev mode.
    #[error("not available in this mode: {0}")]
    WrongMode(String),

    /// Two capability providers offered the same method name.
    #[error("duplicate capability method: {0}")]
    DuplicateMethod(String),

    /// Catch-all.
    #[error("{0}")]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}
