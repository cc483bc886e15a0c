use gatehouse_common::{AuditEvent, AuditOutcome, AuditSink, RouteAuthPolicy};
use std::sync::Arc;
use tracing::debug;

use crate::claims::{Identity, TokenType};
use crate::error::AuthError;
use crate::permissions::PermissionEngine;
use crate::validator::TokenValidator;

/// Request-level authentication plus route policy enforcement.
#[derive(Clone)]
pub struct Authorizer {
    service: String,
    validator: Arc<TokenValidator>,
    permissions: PermissionEngine,
    audit: Arc<dyn AuditSink>,
}

impl Authorizer {
    pub fn new(
        service: impl Into<String>,
        validator: Arc<TokenValidator>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        let service = service.into();
        Self {
            permissions: PermissionEngine::new(service.clone(), audit.clone()),
            service,
            validator,
            audit,
        }
    }

    /// Extract the token from an `Authorization: Bearer <token>` value.
    pub fn bearer_token(authorization: Option<&str>) -> Option<&str> {
        let value = authorization?.trim();
        let (scheme, token) = value.split_once(' ')?;
        if !scheme.eq_ignore_ascii_case("bearer") {
            return None;
        }
        let token = token.trim();
        (!token.is_empty()).then_some(token)
    }

    /// Authenticate a request from its `Authorization` header value.
    ///
    /// Only access tokens identify a caller; refresh tokens are rejected.
    pub async fn authenticate(&self, authorization: Option<&str>) -> Result<Identity, AuthError> {
        let Some(token) = Self::bearer_token(authorization) else {
            self.audit.record(
                AuditEvent::new("token_verify", AuditOutcome::Denied)
                    .service(self.service.clone())
                    .detail(AuthError::MissingToken.to_string()),
            );
            return Err(AuthError::MissingToken);
        };

        let claims = self.validator.verify_token(token).await?;
        if claims.token_type != TokenType::Access {
            debug!(token_type = claims.token_type.as_str(), "non-access token presented");
            return Err(AuthError::WrongTokenType(claims.token_type.as_str().to_string()));
        }
        Ok(Identity::from(claims))
    }

    /// Authenticate, then enforce the route's role and permission requirements.
    pub async fn authorize_request(
        &self,
        authorization: Option<&str>,
        policy: &RouteAuthPolicy,
    ) -> Result<Identity, AuthError> {
        let identity = self.authenticate(authorization).await?;
        self.permissions.enforce(&identity, policy)?;
        Ok(identity)
    }
}
