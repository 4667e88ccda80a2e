//! Caller authentication via bearer tokens
//!
//! # Architecture
//!
//! - Clients send `Authorization: Bearer <token>`
//! - Configuration stores only the SHA-256 hex digest of each token
//! - A matching digest resolves to a [`Caller`] carrying username and role
//!
//! # Pure Functions
//!
//! No HTTP framework dependencies (Axum, etc.) - the middleware lives in
//! the service crate.

use crate::config::TokenEntry;
use crate::db::models::Role;
use crate::{Error, Result};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::HashMap;

// ========================================
// Error Types
// ========================================

/// Authentication error types
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiAuthError {
    /// No Authorization header present
    MissingToken,

    /// Authorization header present but not `Bearer <token>`
    MalformedHeader(String),

    /// Token digest matches no configured entry
    UnknownToken,
}

impl std::fmt::Display for ApiAuthError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ApiAuthError::MissingToken => write!(f, "Missing bearer token"),
            ApiAuthError::MalformedHeader(reason) => {
                write!(f, "Malformed Authorization header: {}", reason)
            }
            ApiAuthError::UnknownToken => write!(f, "Unknown token"),
        }
    }
}

impl std::error::Error for ApiAuthError {}

// ========================================
// Caller
// ========================================

/// Authenticated caller identity
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Caller {
    pub username: String,
    pub role: Role,
}

impl Caller {
    pub fn new(username: impl Into<String>, role: Role) -> Self {
        Self {
            username: username.into(),
            role,
        }
    }

    /// Local operator running the CLI on the server host
    pub fn operator() -> Self {
        let username = std::env::var("USER")
            .or_else(|_| std::env::var("USERNAME"))
            .unwrap_or_else(|_| "operator".to_string());
        Self::new(username, Role::Admin)
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

// ========================================
// Token Hashing
// ========================================

/// SHA-256 hex digest of a raw token
///
/// # Examples
///
/// ```
/// use sreq_common::api::auth::hash_token;
///
/// assert_eq!(
///     hash_token("test"),
///     "9f86d081884c7d659a2feaa0c55ad015a3bf4f1b2b0b822cd15d6c15b0f00a08"
/// );
/// ```
pub fn hash_token(token: &str) -> String {
    let digest = Sha256::digest(token.as_bytes());
    format!("{:x}", digest)
}

/// Extract the token from an `Authorization` header value
pub fn parse_bearer(header_value: &str) -> std::result::Result<&str, ApiAuthError> {
    let (scheme, token) = header_value
        .trim()
        .split_once(' ')
        .ok_or_else(|| ApiAuthError::MalformedHeader("expected 'Bearer <token>'".to_string()))?;

    if !scheme.eq_ignore_ascii_case("bearer") {
        return Err(ApiAuthError::MalformedHeader(format!(
            "unsupported scheme: {}",
            scheme
        )));
    }

    let token = token.trim();
    if token.is_empty() {
        return Err(ApiAuthError::MalformedHeader("empty token".to_string()));
    }

    Ok(token)
}

// ========================================
// Token Registry
// ========================================

/// Lookup table from token digest to caller
#[derive(Debug, Clone, Default)]
pub struct TokenRegistry {
    callers: HashMap<String, Caller>,
}

impl TokenRegistry {
    /// Build registry from configured token entries
    ///
    /// Rejects digests that are not 64 hex characters.
    pub fn from_entries(entries: &[TokenEntry]) -> Result<Self> {
        let mut callers = HashMap::with_capacity(entries.len());

        for entry in entries {
            let digest = entry.sha256.trim().to_ascii_lowercase();
            if digest.len() != 64 || !digest.chars().all(|c| c.is_ascii_hexdigit()) {
                return Err(Error::Config(format!(
                    "Token for '{}' is not a SHA-256 hex digest",
                    entry.username
                )));
            }
            callers.insert(digest, Caller::new(entry.username.clone(), entry.role));
        }

        Ok(Self { callers })
    }

    /// Resolve a raw token to its caller
    pub fn authenticate(&self, token: &str) -> std::result::Result<Caller, ApiAuthError> {
        self.callers
            .get(&hash_token(token))
            .cloned()
            .ok_or(ApiAuthError::UnknownToken)
    }

    /// Whether any configured token grants the admin role
    pub fn has_admin(&self) -> bool {
        self.callers.values().any(Caller::is_admin)
    }

    pub fn len(&self) -> usize {
        self.callers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.callers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(token: &str, username: &str, role: Role) -> TokenEntry {
        TokenEntry {
            sha256: hash_token(token),
            username: username.to_string(),
            role,
        }
    }

    #[test]
    fn test_authenticate_known_token() {
        let registry = TokenRegistry::from_entries(&[
            entry("admin-secret", "alice", Role::Admin),
            entry("user-secret", "bob", Role::User),
        ])
        .unwrap();

        let caller = registry.authenticate("admin-secret").unwrap();
        assert_eq!(caller.username, "alice");
        assert!(caller.is_admin());

        let caller = registry.authenticate("user-secret").unwrap();
        assert!(!caller.is_admin());
    }

    #[test]
    fn test_unknown_token_rejected() {
        let registry =
            TokenRegistry::from_entries(&[entry("admin-secret", "alice", Role::Admin)]).unwrap();

        assert_eq!(
            registry.authenticate("guess"),
            Err(ApiAuthError::UnknownToken)
        );
    }

    #[test]
    fn test_uppercase_digest_accepted() {
        let mut e = entry("admin-secret", "alice", Role::Admin);
        e.sha256 = e.sha256.to_ascii_uppercase();

        let registry = TokenRegistry::from_entries(&[e]).unwrap();
        assert!(registry.authenticate("admin-secret").is_ok());
    }

    #[test]
    fn test_invalid_digest_rejected() {
        let bad = TokenEntry {
            sha256: "not-a-digest".to_string(),
            username: "alice".to_string(),
            role: Role::Admin,
        };

        assert!(TokenRegistry::from_entries(&[bad]).is_err());
    }

    #[test]
    fn test_parse_bearer() {
        assert_eq!(parse_bearer("Bearer abc").unwrap(), "abc");
        assert_eq!(parse_bearer("bearer   abc ").unwrap(), "abc");
        assert!(matches!(
            parse_bearer("Basic abc"),
            Err(ApiAuthError::MalformedHeader(_))
        ));
        assert!(matches!(
            parse_bearer("Bearer"),
            Err(ApiAuthError::MalformedHeader(_))
        ));
    }

    #[test]
    fn test_has_admin() {
        let registry = TokenRegistry::from_entries(&[entry("u", "bob", Role::User)]).unwrap();
        assert!(!registry.has_admin());
        assert!(TokenRegistry::default().is_empty());
    }
}
