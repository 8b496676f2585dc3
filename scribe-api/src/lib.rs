#![deny(missing_docs)]
//! RPC dispatch over HTTP POST and websocket for scribe.
//!
//! Both connection kinds decode the wire envelope into
//! `(target_id, method, args)`, look the target up in the shared
//! [`Context`], verify the method against the target class's
//! whitelist, invoke it, and write the response envelope back. A
//! connection earns its targets by presenting a bearer token to the
//! bootstrap `auth` target; tokens ride the envelope's `author_token`
//! field, never a URL. Server pushes (revision notifications) exist
//! only on websocket connections.

mod connection;
mod context;
mod envelope;
mod error;

pub use connection::{ConnectionTracker, api_routes};
pub use context::{AUTH_TARGET, Context, Target};
pub use envelope::{ErrorPayload, NotificationEnvelope, RequestEnvelope, ResponseEnvelope};
pub use error::ApiError;
