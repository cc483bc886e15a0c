use gatehouse_common::GatewayError;
use thiserror::Error;

/// Authentication and authorization failures.
///
/// Display strings are meant for logs and audit events; callers of the
/// gateway only ever see a generic message.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("missing bearer token")]
    MissingToken,

    #[error("token exceeds {0} bytes")]
    TooLarge(usize),

    #[error("invalid token: {0}")]
    Invalid(String),

    #[error("token expired")]
    Expired,

    #[error("token is not active (revoked or logged out)")]
    Revoked,

    #[error("{0} token cannot authorize requests")]
    WrongTokenType(String),

    #[error("active-token store unavailable: {0}")]
    Store(String),

    #[error("permission '{0}' not granted")]
    MissingPermission(String),

    #[error("role '{0}' required")]
    MissingRole(String),

    #[error("unsupported signing algorithm '{0}'")]
    UnsupportedAlgorithm(String),
}

impl AuthError {
    /// `true` for failures that mean "who you are is fine, but not allowed".
    pub fn is_authorization(&self) -> bool {
        matches!(self, AuthError::MissingPermission(_) | AuthError::MissingRole(_))
    }
}

impl From<AuthError> for GatewayError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::UnsupportedAlgorithm(_) => GatewayError::Internal(err.to_string()),
            e if e.is_authorization() => GatewayError::AuthorizationDenied(e.to_string()),
            e => GatewayError::AuthenticationFailed(e.to_string()),
        }
    }
}
