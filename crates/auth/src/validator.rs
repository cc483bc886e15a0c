//! Bearer token verification.
//!
//! A token is accepted only when all of the following hold:
//!
//! 1. It is no larger than [`MAX_TOKEN_SIZE_BYTES`] (checked before decoding)
//! 2. Its signature verifies with the configured secret and algorithm
//! 3. It has not expired (`exp`, with the configured leeway)
//! 4. For access tokens, the active-token store still holds it
//!
//! Every attempt, accepted or not, is written to the audit sink.

use gatehouse_common::{AuditEvent, AuditOutcome, AuditSink, AuthConfig};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use std::str::FromStr;
use std::sync::Arc;
use tracing::debug;

use crate::claims::{TokenClaims, TokenType};
use crate::error::AuthError;
use crate::store::ActiveTokenStore;

/// Maximum accepted token size in bytes (8KB).
pub const MAX_TOKEN_SIZE_BYTES: usize = 8192;

pub struct TokenValidator {
    service: String,
    decoding_key: DecodingKey,
    validation: Validation,
    active_tokens: Arc<dyn ActiveTokenStore>,
    audit: Arc<dyn AuditSink>,
}

impl TokenValidator {
    /// Create a validator for HMAC-signed tokens.
    ///
    /// `service` names the component doing the verification and keys the
    /// audit trail.
    pub fn new(
        service: impl Into<String>,
        secret: &str,
        algorithm: Algorithm,
        leeway_secs: u64,
        active_tokens: Arc<dyn ActiveTokenStore>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        let mut validation = Validation::new(algorithm);
        validation.leeway = leeway_secs;
        validation.validate_exp = true;
        validation.validate_aud = false;
        validation.set_required_spec_claims(&["exp"]);

        Self {
            service: service.into(),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
            active_tokens,
            audit,
        }
    }

    pub fn from_config(
        service: impl Into<String>,
        config: &AuthConfig,
        active_tokens: Arc<dyn ActiveTokenStore>,
        audit: Arc<dyn AuditSink>,
    ) -> Result<Self, AuthError> {
        let algorithm = parse_algorithm(&config.algorithm)?;
        Ok(Self::new(
            service,
            &config.secret,
            algorithm,
            config.leeway_secs,
            active_tokens,
            audit,
        ))
    }

    /// Verify `token` and return its claims.
    pub async fn verify_token(&self, token: &str) -> Result<TokenClaims, AuthError> {
        let result = self.verify(token).await;

        let event = match &result {
            Ok(claims) => AuditEvent::new("token_verify", AuditOutcome::Allowed)
                .user(claims.user_id.clone())
                .detail(format!("type={}", claims.token_type.as_str())),
            Err(e) => AuditEvent::new("token_verify", AuditOutcome::Denied).detail(e.to_string()),
        };
        self.audit.record(event.service(self.service.clone()));

        result
    }

    async fn verify(&self, token: &str) -> Result<TokenClaims, AuthError> {
        if token.len() > MAX_TOKEN_SIZE_BYTES {
            return Err(AuthError::TooLarge(MAX_TOKEN_SIZE_BYTES));
        }

        let data = decode::<TokenClaims>(token, &self.decoding_key, &self.validation).map_err(
            |e| {
                debug!(error = %e, "token decode failed");
                match e.kind() {
                    ErrorKind::ExpiredSignature => AuthError::Expired,
                    ErrorKind::InvalidSignature => AuthError::Invalid("bad signature".to_string()),
                    ErrorKind::InvalidAlgorithm => {
                        AuthError::Invalid("unexpected algorithm".to_string())
                    }
                    _ => AuthError::Invalid(e.to_string()),
                }
            },
        )?;
        let claims = data.claims;

        if claims.token_type == TokenType::Access
            && !self.active_tokens.is_active(&claims.user_id, token).await?
        {
            return Err(AuthError::Revoked);
        }

        Ok(claims)
    }
}

/// Parse a configured algorithm name, accepting only HMAC variants.
pub fn parse_algorithm(name: &str) -> Result<Algorithm, AuthError> {
    match Algorithm::from_str(name) {
        Ok(alg @ (Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512)) => Ok(alg),
        _ => Err(AuthError::UnsupportedAlgorithm(name.to_string())),
    }
}
