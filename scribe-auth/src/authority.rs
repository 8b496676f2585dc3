//! The token authority — where tokens come from and what they grant.

use crate::error::AuthError;
use crate::token::BearerToken;
use async_trait::async_trait;
use otcore::{AuthorId, DurationMs};

/// The configured source of truth for tokens.
///
/// The server never invents tokens; it asks the authority. Bindings
/// may be cached until [`when_root_tokens_change`]
/// (TokenAuthority::when_root_tokens_change) signals that they may
/// have changed.
#[async_trait]
pub trait TokenAuthority: Send + Sync {
    /// Syntactic predicate for token strings.
    fn is_token(&self, s: &str) -> bool;

    /// Parse a presented token string, applying the syntax predicate.
    fn token_from_string(&self, s: &str) -> Result<BearerToken, AuthError>;

    /// The current set of root tokens.
    async fn root_tokens(&self) -> Vec<BearerToken>;

    /// Resolves after the root-token set may have changed, or after
    /// the polling interval (the default when `timeout` is absent),
    /// whichever comes first.
    async fn when_root_tokens_change(&self, timeout: Option<DurationMs>);

    /// The token identifying an author, minting one if the author has
    /// none yet.
    async fn author_token(&self, author_id: &AuthorId) -> Result<BearerToken, AuthError>;

    /// The author a presented token identifies, or `None` for a token
    /// that identifies nobody. Secret comparison is constant-time.
    async fn author_for_token(&self, token: &BearerToken) -> Option<AuthorId>;
}
