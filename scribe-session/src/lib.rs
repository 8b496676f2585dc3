#![deny(missing_docs)]
//! Author access, sessions, and caret publishing for scribe.
//!
//! An authenticated author holds an [`AuthorAccess`]: the capability
//! to open new sessions or rebind to live ones. A [`Session`] binds
//! `(author, document, caret)` to the document's coordinator bundle
//! and exposes the body/caret/property operations remote callers may
//! invoke. The [`SessionRegistry`] tracks every live session; the
//! [`IdleSweep`] ends the quiet ones, announcing each departure with
//! an `end_session` caret op.

mod access;
mod color;
mod error;
mod registry;
mod session;
mod sweep;

pub use access::AuthorAccess;
pub use error::SessionError;
pub use registry::SessionRegistry;
pub use session::Session;
pub use sweep::IdleSweep;
