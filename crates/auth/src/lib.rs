//! Bearer-token authentication and permission checks for the gateway.

pub mod authorizer;
pub mod claims;
pub mod error;
pub mod permissions;
pub mod store;
pub mod validator;

pub use authorizer::Authorizer;
pub use claims::{Identity, TokenClaims, TokenType};
pub use error::AuthError;
pub use permissions::{has_permission, has_role, PermissionEngine, ADMIN_PERMISSION, ADMIN_ROLE};
pub use store::{active_token_key, ActiveTokenStore, MemoryActiveTokens, RedisActiveTokens};
pub use validator::{parse_algorithm, TokenValidator, MAX_TOKEN_SIZE_BYTES};

use gatehouse_common::{ActiveTokensBackend, AuditSink, AuthConfig};
use std::sync::Arc;

/// Build the configured active-token store.
pub fn active_store_from_config(config: &AuthConfig) -> Result<Arc<dyn ActiveTokenStore>, AuthError> {
    match config.active_tokens.backend {
        ActiveTokensBackend::Memory => Ok(Arc::new(MemoryActiveTokens::new())),
        ActiveTokensBackend::Redis => {
            let url = config.active_tokens.redis_url.as_deref().ok_or_else(|| {
                AuthError::Store("redis backend configured without redis_url".to_string())
            })?;
            let store = RedisActiveTokens::new(url, &config.active_tokens.key_prefix)?;
            Ok(Arc::new(store))
        }
    }
}

/// Build an [`Authorizer`] from configuration and an already-built store.
pub fn authorizer_from_config(
    service: &str,
    config: &AuthConfig,
    store: Arc<dyn ActiveTokenStore>,
    audit: Arc<dyn AuditSink>,
) -> Result<Authorizer, AuthError> {
    let validator = TokenValidator::from_config(service, config, store, audit.clone())?;
    Ok(Authorizer::new(service, Arc::new(validator), audit))
}
