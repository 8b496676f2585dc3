#![deny(missing_docs)]
//! Static token authority for scribe.
//!
//! Root tokens are whatever the constructor was given; author tokens
//! are minted on demand and remembered. Intended for dev and test use
//! only — nothing here talks to a real authority.

use async_trait::async_trait;
use otcore::{AuthorId, DurationMs};
use scribe_auth::{
    AuthError, BearerToken, TokenAuthority, TokenControl, TokenPredicate, default_token_syntax,
};
use std::collections::HashMap;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{Notify, RwLock};

/// Default polling interval for root-token change watchers.
const DEFAULT_POLL_INTERVAL: DurationMs = DurationMs::from_secs(60);

/// A token authority backed by in-memory maps.
pub struct StaticTokenAuthority {
    syntax: TokenPredicate,
    poll_interval: DurationMs,
    minted: AtomicU64,
    state: RwLock<State>,
    root_changed: Notify,
}

#[derive(Default)]
struct State {
    root: Vec<BearerToken>,
    authors: HashMap<AuthorId, BearerToken>,
}

impl StaticTokenAuthority {
    /// Create an authority with the given root tokens and the default
    /// token syntax.
    pub fn new(root: Vec<BearerToken>) -> Self {
        Self::with_syntax(root, default_token_syntax)
    }

    /// Create an authority with an explicit syntactic predicate.
    pub fn with_syntax(root: Vec<BearerToken>, syntax: TokenPredicate) -> Self {
        Self {
            syntax,
            poll_interval: DEFAULT_POLL_INTERVAL,
            minted: AtomicU64::new(0),
            state: RwLock::new(State {
                root,
                authors: HashMap::new(),
            }),
            root_changed: Notify::new(),
        }
    }

    /// Replace the root-token set, waking change watchers.
    pub async fn set_root_tokens(&self, root: Vec<BearerToken>) {
        self.state.write().await.root = root;
        self.root_changed.notify_waiters();
    }

    /// Mint a fresh token for an author. Deterministic prefix (so ids
    /// stay stable per author), unique suffix.
    fn mint(&self, author_id: &AuthorId) -> Result<BearerToken, AuthError> {
        let mut hasher = DefaultHasher::new();
        author_id.hash(&mut hasher);
        let prefix = hasher.finish();
        let suffix = self.minted.fetch_add(1, Ordering::Relaxed);
        let secret = format!("{prefix:016x}{suffix:016x}");
        BearerToken::parse(secret, default_token_syntax)
    }
}

#[async_trait]
impl TokenAuthority for StaticTokenAuthority {
    fn is_token(&self, s: &str) -> bool {
        (self.syntax)(s)
    }

    fn token_from_string(&self, s: &str) -> Result<BearerToken, AuthError> {
        BearerToken::parse(s, self.syntax)
    }

    async fn root_tokens(&self) -> Vec<BearerToken> {
        self.state.read().await.root.clone()
    }

    async fn when_root_tokens_change(&self, timeout: Option<DurationMs>) {
        let wait = timeout.unwrap_or(self.poll_interval);
        let notified = self.root_changed.notified();
        tokio::select! {
            _ = notified => {}
            _ = tokio::time::sleep(wait.to_std()) => {}
        }
    }

    async fn author_token(&self, author_id: &AuthorId) -> Result<BearerToken, AuthError> {
        if let Some(token) = self.state.read().await.authors.get(author_id) {
            return Ok(token.clone());
        }
        let mut state = self.state.write().await;
        // Another caller may have minted while we waited for the lock.
        if let Some(token) = state.authors.get(author_id) {
            return Ok(token.clone());
        }
        let token = self.mint(author_id)?;
        state.authors.insert(author_id.clone(), token.clone());
        Ok(token)
    }

    async fn author_for_token(&self, token: &BearerToken) -> Option<AuthorId> {
        let state = self.state.read().await;
        for (author_id, stored) in &state.authors {
            if stored.same_id(token) {
                // Equal ids must mean equal secrets, or the token is
                // refused outright.
                return (stored == token).then(|| author_id.clone());
            }
        }
        None
    }
}

#[async_trait]
impl TokenControl for StaticTokenAuthority {
    fn method_names(&self) -> &'static [&'static str] {
        &["use_token"]
    }

    async fn use_token(
        &self,
        author_id: &AuthorId,
        token: &BearerToken,
    ) -> Result<(), AuthError> {
        let mut state = self.state.write().await;
        state.authors.insert(author_id.clone(), token.clone());
        Ok(())
    }
}
