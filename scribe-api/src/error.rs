//! API-layer errors and the wire error shaping.

use crate::envelope::ErrorPayload;
use otcore::{OtError, StoreError, TargetId};
use scribe_auth::AuthError;
use scribe_doc::DocError;
use scribe_session::SessionError;
use thiserror::Error;

/// Errors from envelope decoding and dispatch.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum ApiError {
    /// The request body was not a valid envelope.
    #[error("bad envelope: {0}")]
    BadEnvelope(String),

    /// The named target is not in the context.
    #[error("unknown target: {0}")]
    UnknownTarget(TargetId),

    /// The method is not a whitelisted capability of the target's
    /// class.
    #[error("unknown method: {0}")]
    UnknownMethod(String),

    /// An argument was missing or failed to decode.
    #[error("bad argument {index}: {message}")]
    BadArgument {
        /// Zero-based argument position.
        index: usize,
        /// What went wrong.
        message: String,
    },

    /// The call needed a token and none was presented.
    #[error("missing author token")]
    MissingToken,

    /// This connection kind does not support the method.
    #[error("not supported on this connection: {0}")]
    WrongConnection(String),

    /// A server-side invariant broke while handling the call.
    #[error("internal error: {0}")]
    Internal(String),

    /// A session-layer error propagated unchanged.
    #[error("session error: {0}")]
    Session(#[from] SessionError),

    /// An authorization error propagated unchanged.
    #[error("auth error: {0}")]
    Auth(#[from] AuthError),

    /// A coordinator error propagated unchanged.
    #[error("doc error: {0}")]
    Doc(#[from] DocError),

    /// A pure OT error propagated unchanged.
    #[error("ot error: {0}")]
    Ot(#[from] OtError),
}

impl ApiError {
    /// Shape an error for the wire: the taxonomy kind plus a
    /// sanitized message.
    pub fn payload(&self) -> ErrorPayload {
        ErrorPayload {
            kind: self.kind().to_string(),
            message: self.to_string(),
        }
    }

    /// The taxonomy kind for this error.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::BadEnvelope(_) | Self::BadArgument { .. } => "bad_value",
            Self::UnknownTarget(_) => "bad_id",
            Self::UnknownMethod(_) | Self::WrongConnection(_) => "bad_use",
            Self::MissingToken => "refused",
            Self::Internal(_) => "bad_data",
            Self::Auth(err) => auth_kind(err),
            Self::Session(err) => session_kind(err),
            Self::Doc(err) => doc_kind(err),
            Self::Ot(err) => ot_kind(err),
        }
    }
}

fn ot_kind(err: &OtError) -> &'static str {
    match err {
        OtError::BadValue(_) => "bad_value",
        OtError::BadUse(_) => "bad_use",
        _ => "bad_data",
    }
}

fn store_kind(err: &StoreError) -> &'static str {
    match err {
        StoreError::TimedOut(_) => "timed_out",
        StoreError::RevisionNotAvailable { .. } => "revision_not_available",
        _ => "bad_data",
    }
}

fn doc_kind(err: &DocError) -> &'static str {
    match err {
        DocError::Ot(inner) => ot_kind(inner),
        DocError::Store(inner) => store_kind(inner),
        _ => "bad_data",
    }
}

fn session_kind(err: &SessionError) -> &'static str {
    match err {
        SessionError::Doc(inner) => doc_kind(inner),
        SessionError::Ot(inner) => ot_kind(inner),
        SessionError::Auth(inner) => auth_kind(inner),
        SessionError::BadId(_) => "bad_id",
        SessionError::Ended => "bad_use",
        _ => "bad_data",
    }
}

fn auth_kind(err: &AuthError) -> &'static str {
    match err {
        AuthError::BadToken(_) => "bad_value",
        AuthError::Refused => "refused",
        _ => "bad_use",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use otcore::RevNum;

    #[test]
    fn kinds_follow_the_taxonomy() {
        assert_eq!(ApiError::BadEnvelope("x".into()).kind(), "bad_value");
        assert_eq!(
            ApiError::UnknownTarget(TargetId::new("t")).kind(),
            "bad_id"
        );
        assert_eq!(ApiError::UnknownMethod("m".into()).kind(), "bad_use");
        assert_eq!(ApiError::MissingToken.kind(), "refused");
        assert_eq!(
            ApiError::from(SessionError::Ended).kind(),
            "bad_use"
        );
        assert_eq!(
            ApiError::from(DocError::Store(StoreError::TimedOut(
                otcore::DurationMs::from_millis(5)
            )))
            .kind(),
            "timed_out"
        );
        assert_eq!(
            ApiError::from(DocError::Store(StoreError::RevisionNotAvailable {
                rev_num: RevNum::ZERO
            }))
            .kind(),
            "revision_not_available"
        );
    }

    #[test]
    fn payload_is_kind_plus_message() {
        let payload = ApiError::UnknownMethod("explode".into()).payload();
        assert_eq!(payload.kind, "bad_use");
        assert!(payload.message.contains("explode"));
    }
}
