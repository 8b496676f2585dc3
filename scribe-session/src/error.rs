//! Session-layer errors.

use thiserror::Error;

/// Errors from sessions and author access.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum SessionError {
    /// A coordinator error propagated unchanged.
    #[error("doc error: {0}")]
    Doc(#[from] scribe_doc::DocError),

    /// An authorization error propagated unchanged.
    #[error("auth error: {0}")]
    Auth(#[from] scribe_auth::AuthError),

    /// A pure OT error propagated unchanged.
    #[error("ot error: {0}")]
    Ot(#[from] otcore::OtError),

    /// An unknown session, author, or document id, on a path that
    /// does not tolerate absence.
    #[error("unknown id: {0}")]
    BadId(String),

    /// The session has already ended.
    #[error("session ended")]
    Ended,
}
