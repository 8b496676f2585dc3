//! The root capability: session minting plus (in dev mode) token
//! override.
//!
//! `RootAccess` is a dispatch surface assembled from two capability
//! providers. Construction checks for duplicate method names so the
//! fused surface stays unambiguous.

use crate::authority::TokenAuthority;
use crate::error::AuthError;
use crate::token::BearerToken;
use async_trait::async_trait;
use otcore::{AuthorId, DocumentId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;

/// Everything a client needs to (re-)establish a session on a
/// document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionInfo {
    /// Where the API lives.
    pub api_url: String,
    /// The author's bearer token.
    pub author_token: BearerToken,
    /// The document the session targets.
    pub document_id: DocumentId,
}

/// Mints session info for `(author, document)` pairs.
#[async_trait]
pub trait SessionSource: Send + Sync {
    /// The method names this provider contributes to the root surface.
    fn method_names(&self) -> &'static [&'static str];

    /// Mint session info for any `(author, document)` pair.
    async fn make_session_info(
        &self,
        author_id: &AuthorId,
        document_id: &DocumentId,
    ) -> Result<SessionInfo, AuthError>;
}

/// Dev-mode control over author-token resolution.
#[async_trait]
pub trait TokenControl: Send + Sync {
    /// The method names this provider contributes to the root surface.
    fn method_names(&self) -> &'static [&'static str];

    /// Force `token` to resolve to `author_id` from now on.
    async fn use_token(&self, author_id: &AuthorId, token: &BearerToken)
    -> Result<(), AuthError>;
}

/// The capability granted by a root token.
pub struct RootAccess {
    sessions: Arc<dyn SessionSource>,
    tokens: Option<Arc<dyn TokenControl>>,
    methods: Vec<&'static str>,
}

impl std::fmt::Debug for RootAccess {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RootAccess")
            .field("methods", &self.methods)
            .finish()
    }
}

impl RootAccess {
    /// Fuse the providers into one dispatch surface. Fails when two
    /// providers contribute the same method name.
    pub fn new(
        sessions: Arc<dyn SessionSource>,
        tokens: Option<Arc<dyn TokenControl>>,
    ) -> Result<Self, AuthError> {
        let mut seen = BTreeSet::new();
        let mut methods = Vec::new();
        let contributed = sessions
            .method_names()
            .iter()
            .chain(tokens.iter().flat_map(|t| t.method_names().iter()));
        for name in contributed {
            if !seen.insert(*name) {
                return Err(AuthError::DuplicateMethod((*name).into()));
            }
            methods.push(*name);
        }
        Ok(Self {
            sessions,
            tokens,
            methods,
        })
    }

    /// The fused method names, for dispatch whitelisting.
    pub fn method_names(&self) -> &[&'static str] {
        &self.methods
    }

    /// Mint session info for any `(author, document)` pair.
    pub async fn make_session_info(
        &self,
        author_id: &AuthorId,
        document_id: &DocumentId,
    ) -> Result<SessionInfo, AuthError> {
        self.sessions.make_session_info(author_id, document_id).await
    }

    /// Dev-mode token override. Refused when no token control is
    /// mounted (prod mode).
    pub async fn use_token(
        &self,
        author_id: &AuthorId,
        token: &BearerToken,
    ) -> Result<(), AuthError> {
        match &self.tokens {
            Some(control) => control.use_token(author_id, token).await,
            None => Err(AuthError::WrongMode("use_token".into())),
        }
    }
}

/// The standard session source: pairs the configured API URL with
/// author tokens from the authority.
pub struct SessionMinter {
    api_url: String,
    authority: Arc<dyn TokenAuthority>,
}

impl SessionMinter {
    /// Create a minter advertising `api_url`.
    pub fn new(api_url: impl Into<String>, authority: Arc<dyn TokenAuthority>) -> Self {
        Self {
            api_url: api_url.into(),
            authority,
        }
    }
}

#[async_trait]
impl SessionSource for SessionMinter {
    fn method_names(&self) -> &'static [&'static str] {
        &["make_session_info"]
    }

    async fn make_session_info(
        &self,
        author_id: &AuthorId,
        document_id: &DocumentId,
    ) -> Result<SessionInfo, AuthError> {
        let author_token = self.authority.author_token(author_id).await?;
        Ok(SessionInfo {
            api_url: self.api_url.clone(),
            author_token,
            document_id: document_id.clone(),
        })
    }
}
