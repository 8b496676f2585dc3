//! Bearer tokens.
//!
//! A token is an opaque string. Its first 16 characters are the *id*:
//! the lookup key, safe to log. The full string is the *secret* and
//! never appears in logs or `Debug` output. Two tokens with the same
//! id must carry the same secret or access is refused.

use crate::error::AuthError;
use serde::{Deserialize, Serialize};
use std::fmt;
use subtle::ConstantTimeEq;

/// How many leading characters of a token form its id.
pub const TOKEN_ID_LENGTH: usize = 16;

/// Syntactic predicate applied to presented token strings.
pub type TokenPredicate = fn(&str) -> bool;

/// The default token syntax: at least 16 ASCII alphanumeric or `-`
/// characters.
pub fn default_token_syntax(s: &str) -> bool {
    s.len() >= TOKEN_ID_LENGTH && s.chars().all(|ch| ch.is_ascii_alphanumeric() || ch == '-')
}

/// An opaque bearer token.
#[derive(Clone, Serialize)]
#[serde(transparent)]
pub struct BearerToken {
    secret: String,
}

impl<'de> Deserialize<'de> for BearerToken {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let secret = String::deserialize(deserializer)?;
        if secret.len() < TOKEN_ID_LENGTH || !secret.is_char_boundary(TOKEN_ID_LENGTH) {
            return Err(serde::de::Error::custom("token too short for an id"));
        }
        Ok(Self { secret })
    }
}

impl BearerToken {
    /// Wrap a full token string. The string must satisfy the given
    /// syntactic predicate.
    pub fn parse(secret: impl Into<String>, syntax: TokenPredicate) -> Result<Self, AuthError> {
        let secret = secret.into();
        if !syntax(&secret) {
            // The rejected string is itself secret material.
            return Err(AuthError::BadToken("token failed syntax check".into()));
        }
        if secret.len() < TOKEN_ID_LENGTH || !secret.is_char_boundary(TOKEN_ID_LENGTH) {
            return Err(AuthError::BadToken("token too short for an id".into()));
        }
        Ok(Self { secret })
    }

    /// The loggable id: the first [`TOKEN_ID_LENGTH`] characters.
    pub fn id(&self) -> &str {
        &self.secret[..TOKEN_ID_LENGTH]
    }

    /// The full secret. Handle with care; never log.
    pub fn secret(&self) -> &str {
        &self.secret
    }

    /// Whether two tokens share an id (regardless of secret).
    pub fn same_id(&self, other: &BearerToken) -> bool {
        self.id() == other.id()
    }
}

impl PartialEq for BearerToken {
    /// Constant-time comparison of the full secrets.
    fn eq(&self, other: &Self) -> bool {
        self.secret.as_bytes().ct_eq(other.secret.as_bytes()).into()
    }
}

impl Eq for BearerToken {}

impl fmt::Debug for BearerToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BearerToken")
            .field("id", &self.id())
            .field("secret", &"[REDACTED]")
            .finish()
    }
}

impl fmt::Display for BearerToken {
    /// Displays only the id; the secret never reaches log formatting.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}...", self.id())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token(s: &str) -> BearerToken {
        BearerToken::parse(s, default_token_syntax).unwrap()
    }

    #[test]
    fn syntax_is_enforced() {
        assert!(BearerToken::parse("tooshort", default_token_syntax).is_err());
        assert!(BearerToken::parse("has spaces here yes", default_token_syntax).is_err());
        assert!(BearerToken::parse("0123456789abcdef", default_token_syntax).is_ok());
    }

    #[test]
    fn id_is_the_first_sixteen_characters() {
        let t = token("0123456789abcdefSECRETPART");
        assert_eq!(t.id(), "0123456789abcdef");
        assert_eq!(t.secret(), "0123456789abcdefSECRETPART");
    }

    #[test]
    fn equality_covers_the_full_secret() {
        let a = token("0123456789abcdefAAAA");
        let b = token("0123456789abcdefBBBB");
        assert!(a.same_id(&b));
        assert_ne!(a, b);
        assert_eq!(a, a.clone());
    }

    #[test]
    fn debug_and_display_never_leak_the_secret() {
        let t = token("0123456789abcdefSECRETPART");
        let debug = format!("{t:?}");
        let display = format!("{t}");
        assert!(debug.contains("0123456789abcdef"));
        assert!(debug.contains("[REDACTED]"));
        assert!(!debug.contains("SECRETPART"));
        assert!(!display.contains("SECRETPART"));
    }

    #[test]
    fn serde_carries_the_secret_transparently() {
        let t = token("0123456789abcdefXYZ");
        let encoded = serde_json::to_string(&t).unwrap();
        assert_eq!(encoded, "\"0123456789abcdefXYZ\"");
        let decoded: BearerToken = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded, t);
    }
}
