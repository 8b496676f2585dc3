#![deny(missing_docs)]
//! # scribe — collaborative rich-text editing server core
//!
//! The umbrella crate: feature-gated re-exports of the workspace
//! members.
//!
//! | Feature | Crate | What it adds |
//! |---------|-------|--------------|
//! | `core` (default) | `otcore` | OT values, store protocol (as `ot`) |
//! | `store-memory` | `scribe-store-memory` | In-memory change logs |
//! | `store-fs` | `scribe-store-fs` | On-disk change logs |
//! | `doc` | `scribe-doc` | Per-document coordinators |
//! | `auth` | `scribe-auth` | Tokens and capabilities |
//! | `auth-static` | `scribe-auth-static` | Dev/test authority |
//! | `session` | `scribe-session` | Sessions and carets |
//! | `api` | `scribe-api` | POST/websocket RPC surface |
//! | `app` | `scribe-app` | Load, admission, the daemon |

/// OT values and the store protocol.
#[cfg(feature = "core")]
pub use otcore as ot;

/// Per-document coordinators.
#[cfg(feature = "doc")]
pub use scribe_doc as doc;

/// Tokens and capabilities.
#[cfg(feature = "auth")]
pub use scribe_auth as auth;

/// The static dev/test token authority.
#[cfg(feature = "auth-static")]
pub use scribe_auth_static as auth_static;

/// Sessions, author access, carets.
#[cfg(feature = "session")]
pub use scribe_session as session;

/// In-memory change logs.
#[cfg(feature = "store-memory")]
pub use scribe_store_memory as store_memory;

/// On-disk change logs.
#[cfg(feature = "store-fs")]
pub use scribe_store_fs as store_fs;

/// The POST/websocket RPC surface.
#[cfg(feature = "api")]
pub use scribe_api as api;

/// Load assessment, admission control, the daemon.
#[cfg(feature = "app")]
pub use scribe_app as app;
