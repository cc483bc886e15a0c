//! Token claims and the authenticated identity derived from them.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

use crate::permissions::{has_permission, has_role};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    Access,
    Refresh,
    #[serde(other)]
    Other,
}

impl TokenType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenType::Access => "access",
            TokenType::Refresh => "refresh",
            TokenType::Other => "other",
        }
    }
}

/// Claims carried by a bearer token. Decoded per request, never stored.
///
/// The `user_id` field is redacted in Debug output.
#[derive(Clone, Serialize, Deserialize)]
pub struct TokenClaims {
    pub user_id: String,

    #[serde(default)]
    pub role: String,

    #[serde(default)]
    pub permissions: HashSet<String>,

    #[serde(rename = "type")]
    pub token_type: TokenType,

    /// Expiration timestamp (Unix epoch seconds).
    pub exp: i64,
}

impl fmt::Debug for TokenClaims {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenClaims")
            .field("user_id", &"[REDACTED]")
            .field("role", &self.role)
            .field("permissions", &self.permissions)
            .field("token_type", &self.token_type)
            .field("exp", &self.exp)
            .finish()
    }
}

/// An already-authenticated principal.
///
/// Only the token validator produces one, so holding an `Identity` means the
/// signature, expiry and active-store checks all passed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: String,
    pub role: String,
    pub permissions: HashSet<String>,
}

impl Identity {
    pub fn has_permission(&self, required: &str) -> bool {
        has_permission(&self.permissions, required)
    }

    pub fn has_role(&self, required: &str) -> bool {
        has_role(&self.role, required)
    }
}

impl From<TokenClaims> for Identity {
    fn from(claims: TokenClaims) -> Self {
        Self {
            user_id: claims.user_id,
            role: claims.role,
            permissions: claims.permissions,
        }
    }
}
