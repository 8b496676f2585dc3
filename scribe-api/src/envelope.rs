//! The wire envelope.
//!
//! Requests carry `(target_id, method, args[], req_id?)` plus the
//! per-call `author_token` context field — tokens never ride in a URL.
//! Responses echo the request id and carry either a payload or a
//! shaped error. Server pushes (websocket only) are notifications.

use otcore::TargetId;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One decoded request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestEnvelope {
    /// The capability target the call names.
    pub target_id: TargetId,
    /// The method to invoke on it.
    pub method: String,
    /// Positional arguments.
    #[serde(default)]
    pub args: Vec<Value>,
    /// Echoed back verbatim in the response. Required on websocket
    /// connections, absent on one-shot POST exchanges.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub req_id: Option<Value>,
    /// The per-call bearer token, where a call needs one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author_token: Option<String>,
}

/// One response.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ResponseEnvelope {
    /// The call succeeded.
    Ok {
        /// The echoed request id.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        req_id: Option<Value>,
        /// The encoded result.
        result: Value,
    },
    /// The call failed.
    Error {
        /// The echoed request id.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        req_id: Option<Value>,
        /// The shaped error.
        error: ErrorPayload,
    },
}

impl ResponseEnvelope {
    /// A success response.
    pub fn ok(req_id: Option<Value>, result: Value) -> Self {
        Self::Ok { req_id, result }
    }

    /// A failure response.
    pub fn error(req_id: Option<Value>, error: ErrorPayload) -> Self {
        Self::Error { req_id, error }
    }
}

/// What a caller learns about a failure: the kind, and a sanitized
/// message. Stack traces stay server-side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorPayload {
    /// The error kind, from the fixed taxonomy.
    pub kind: String,
    /// Human-readable detail, safe to relay.
    pub message: String,
}

/// A server-initiated push. Websocket connections only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationEnvelope {
    /// What happened (e.g. `revision`).
    pub notify: String,
    /// The target the notification concerns.
    pub target_id: TargetId,
    /// Event detail.
    pub payload: Value,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn request_roundtrip_with_defaults() {
        let decoded: RequestEnvelope =
            serde_json::from_value(json!({"target_id": "t1", "method": "poke"})).unwrap();
        assert_eq!(decoded.target_id, TargetId::new("t1"));
        assert!(decoded.args.is_empty());
        assert!(decoded.req_id.is_none());
        assert!(decoded.author_token.is_none());
    }

    #[test]
    fn response_tags_status() {
        let ok = serde_json::to_value(ResponseEnvelope::ok(Some(json!(7)), json!("fine"))).unwrap();
        assert_eq!(ok["status"], "ok");
        assert_eq!(ok["req_id"], 7);

        let err = serde_json::to_value(ResponseEnvelope::error(
            None,
            ErrorPayload {
                kind: "bad_value".into(),
                message: "nope".into(),
            },
        ))
        .unwrap();
        assert_eq!(err["status"], "error");
        assert_eq!(err["error"]["kind"], "bad_value");
    }
}
