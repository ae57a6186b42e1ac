//! Token types and authorization.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use time::OffsetDateTime;
use uuid::Uuid;

/// Unique identifier for a token.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TokenId(Uuid);

impl TokenId {
    /// Generate a new random token ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Wrap an existing UUID.
    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    /// Parse from a string.
    pub fn parse(s: &str) -> crate::Result<Self> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| crate::Error::InvalidToken(format!("invalid token ID: {e}")))
    }

    /// Get the underlying UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for TokenId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for TokenId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TokenId({})", self.0)
    }
}

impl fmt::Display for TokenId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Token scopes for authorization.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TokenScope {
    /// Read farms, visitor entries and profiles.
    #[serde(rename = "farm:read")]
    FarmRead,
    /// Register visitors, upload photos, edit profiles.
    #[serde(rename = "farm:write")]
    FarmWrite,
    /// Operator access: orphan reconciliation, system logs, settings, tokens.
    #[serde(rename = "system:admin")]
    SystemAdmin,
}

impl TokenScope {
    /// Parse from string.
    pub fn parse(s: &str) -> crate::Result<Self> {
        match s {
            "farm:read" => Ok(Self::FarmRead),
            "farm:write" => Ok(Self::FarmWrite),
            "system:admin" => Ok(Self::SystemAdmin),
            _ => Err(crate::Error::InvalidToken(format!("unknown scope: {s}"))),
        }
    }

    /// Get the string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FarmRead => "farm:read",
            Self::FarmWrite => "farm:write",
            Self::SystemAdmin => "system:admin",
        }
    }

    /// Check if this scope implies another scope.
    pub fn implies(&self, other: &Self) -> bool {
        match self {
            Self::SystemAdmin => true,
            Self::FarmWrite => matches!(other, Self::FarmWrite | Self::FarmRead),
            Self::FarmRead => matches!(other, Self::FarmRead),
        }
    }
}

impl fmt::Display for TokenScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A validated token with its metadata.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Token {
    /// Token identifier.
    pub id: TokenId,
    /// Granted scopes.
    pub scopes: HashSet<TokenScope>,
    /// When the token expires.
    #[serde(with = "time::serde::rfc3339::option")]
    pub expires_at: Option<OffsetDateTime>,
    /// When the token was revoked (if revoked).
    #[serde(with = "time::serde::rfc3339::option")]
    pub revoked_at: Option<OffsetDateTime>,
    /// When the token was created.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    /// Description for the token, also used as the audit actor label.
    pub description: Option<String>,
}

impl Token {
    /// Check if the token is valid (not expired or revoked).
    pub fn is_valid(&self) -> bool {
        if self.revoked_at.is_some() {
            return false;
        }

        if let Some(expires_at) = self.expires_at
            && OffsetDateTime::now_utc() > expires_at
        {
            return false;
        }

        true
    }

    /// Check if the token has a specific scope.
    pub fn has_scope(&self, scope: TokenScope) -> bool {
        self.scopes.iter().any(|s| s.implies(&scope))
    }

    /// Check if the token has operator access.
    pub fn is_admin(&self) -> bool {
        self.is_valid() && self.has_scope(TokenScope::SystemAdmin)
    }
}

/// Request to create a token.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CreateTokenRequest {
    /// Scopes to grant.
    pub scopes: Vec<String>,
    /// Expiration duration in seconds (optional).
    pub expires_in: Option<u64>,
    /// Description for the token.
    pub description: Option<String>,
}

/// Response from creating a token.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CreateTokenResponse {
    /// The token ID.
    pub token_id: String,
    /// The token secret (only returned once).
    pub token_secret: String,
    /// When the token expires.
    pub expires_at: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token_with(scopes: &[TokenScope]) -> Token {
        Token {
            id: TokenId::new(),
            scopes: scopes.iter().copied().collect(),
            expires_at: None,
            revoked_at: None,
            created_at: OffsetDateTime::now_utc(),
            description: None,
        }
    }

    #[test]
    fn test_scope_implies() {
        assert!(TokenScope::SystemAdmin.implies(&TokenScope::FarmRead));
        assert!(TokenScope::SystemAdmin.implies(&TokenScope::FarmWrite));
        assert!(TokenScope::SystemAdmin.implies(&TokenScope::SystemAdmin));

        assert!(TokenScope::FarmWrite.implies(&TokenScope::FarmRead));
        assert!(!TokenScope::FarmWrite.implies(&TokenScope::SystemAdmin));

        assert!(TokenScope::FarmRead.implies(&TokenScope::FarmRead));
        assert!(!TokenScope::FarmRead.implies(&TokenScope::FarmWrite));
    }

    #[test]
    fn test_scope_parse_roundtrip() {
        for scope in [
            TokenScope::FarmRead,
            TokenScope::FarmWrite,
            TokenScope::SystemAdmin,
        ] {
            assert_eq!(TokenScope::parse(scope.as_str()).unwrap(), scope);
        }
        assert!(TokenScope::parse("farm:delete").is_err());
    }

    #[test]
    fn test_revoked_token_is_not_admin() {
        let mut token = token_with(&[TokenScope::SystemAdmin]);
        assert!(token.is_admin());

        token.revoked_at = Some(OffsetDateTime::now_utc());
        assert!(!token.is_valid());
        assert!(!token.is_admin());
    }

    #[test]
    fn test_expired_token_is_invalid() {
        let mut token = token_with(&[TokenScope::FarmRead]);
        token.expires_at = Some(OffsetDateTime::now_utc() - time::Duration::minutes(1));
        assert!(!token.is_valid());
    }

    #[test]
    fn test_write_token_lacks_admin() {
        let token = token_with(&[TokenScope::FarmWrite]);
        assert!(token.has_scope(TokenScope::FarmRead));
        assert!(!token.is_admin());
    }
}
