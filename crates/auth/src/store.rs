//! Active-token stores.
//!
//! The login flow records every issued access token as active; logout removes
//! it. The validator treats absence as revocation, independently of the
//! token's own expiry.

use async_trait::async_trait;
use dashmap::DashSet;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use sha2::{Digest, Sha256};
use tokio::sync::OnceCell;
use tracing::{info, warn};

use crate::error::AuthError;

/// Existence check for (user, token) active-token records.
#[async_trait]
pub trait ActiveTokenStore: Send + Sync {
    async fn is_active(&self, user_id: &str, token: &str) -> Result<bool, AuthError>;
}

/// Process-local store, used in tests and single-node setups.
#[derive(Default)]
pub struct MemoryActiveTokens {
    tokens: DashSet<(String, String)>,
}

impl MemoryActiveTokens {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn activate(&self, user_id: &str, token: &str) {
        self.tokens.insert((user_id.to_string(), token.to_string()));
    }

    pub fn revoke(&self, user_id: &str, token: &str) {
        self.tokens.remove(&(user_id.to_string(), token.to_string()));
    }

    /// Drop every active token of `user_id`.
    pub fn revoke_all(&self, user_id: &str) {
        self.tokens.retain(|(user, _)| user != user_id);
    }
}

#[async_trait]
impl ActiveTokenStore for MemoryActiveTokens {
    async fn is_active(&self, user_id: &str, token: &str) -> Result<bool, AuthError> {
        Ok(self
            .tokens
            .contains(&(user_id.to_string(), token.to_string())))
    }
}

/// Redis-backed store.
///
/// A token is active while the key `<prefix>:<user_id>:<sha256(token) hex>`
/// exists. Hashing keeps raw credentials out of the keyspace.
///
/// The connection is established on first use, on whichever runtime serves
/// that request, and reconnects automatically afterwards.
pub struct RedisActiveTokens {
    client: redis::Client,
    connection: OnceCell<ConnectionManager>,
    key_prefix: String,
}

impl RedisActiveTokens {
    pub fn new(redis_url: &str, key_prefix: &str) -> Result<Self, AuthError> {
        let client = redis::Client::open(redis_url).map_err(|e| {
            warn!(error = %e, "invalid redis url for active-token store");
            AuthError::Store(e.to_string())
        })?;

        info!(key_prefix, "redis active-token store configured");
        Ok(Self {
            client,
            connection: OnceCell::new(),
            key_prefix: key_prefix.to_string(),
        })
    }

    pub fn key(&self, user_id: &str, token: &str) -> String {
        active_token_key(&self.key_prefix, user_id, token)
    }

    async fn connection(&self) -> Result<ConnectionManager, AuthError> {
        let connection = self
            .connection
            .get_or_try_init(|| async {
                ConnectionManager::new(self.client.clone()).await.map_err(|e| {
                    warn!(error = %e, "failed to connect active-token store");
                    AuthError::Store(e.to_string())
                })
            })
            .await?;
        Ok(connection.clone())
    }
}

#[async_trait]
impl ActiveTokenStore for RedisActiveTokens {
    async fn is_active(&self, user_id: &str, token: &str) -> Result<bool, AuthError> {
        let mut connection = self.connection().await?;
        connection
            .exists(self.key(user_id, token))
            .await
            .map_err(|e| AuthError::Store(e.to_string()))
    }
}

/// Key under which an active token is recorded.
pub fn active_token_key(prefix: &str, user_id: &str, token: &str) -> String {
    let digest = Sha256::digest(token.as_bytes());
    format!("{}:{}:{}", prefix, user_id, hex::encode(digest))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_store_tracks_activation() {
        let store = MemoryActiveTokens::new();
        assert!(!store.is_active("u1", "t1").await.unwrap());

        store.activate("u1", "t1");
        store.activate("u1", "t2");
        assert!(store.is_active("u1", "t1").await.unwrap());
        // Same token under a different user is a different record.
        assert!(!store.is_active("u2", "t1").await.unwrap());

        store.revoke("u1", "t1");
        assert!(!store.is_active("u1", "t1").await.unwrap());
        assert!(store.is_active("u1", "t2").await.unwrap());

        store.revoke_all("u1");
        assert!(!store.is_active("u1", "t2").await.unwrap());
    }

    #[test]
    fn redis_store_rejects_bad_url() {
        assert!(matches!(
            RedisActiveTokens::new("not a url", "auth:active"),
            Err(AuthError::Store(_))
        ));
        let store = RedisActiveTokens::new("redis://127.0.0.1:6379", "auth:active").unwrap();
        assert_eq!(store.key("u1", "t"), active_token_key("auth:active", "u1", "t"));
    }

    #[test]
    fn key_hashes_token() {
        let key = active_token_key("auth:active", "u1", "secret.token.value");
        assert!(key.starts_with("auth:active:u1:"));
        assert!(!key.contains("secret"));
        // sha256 hex digest
        assert_eq!(key.rsplit(':').next().unwrap().len(), 64);
        assert_eq!(key, active_token_key("auth:active", "u1", "secret.token.value"));
    }
}
