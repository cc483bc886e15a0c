use thiserror::Error;

/// Every way a request can end at the gateway instead of at an upstream.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GatewayError {
    #[error("rate limit exceeded for client {0}")]
    AdmissionDenied(String),

    #[error("no route matches path {0}")]
    RouteNotFound(String),

    #[error("service {0} has no healthy endpoints")]
    ServiceUnavailable(String),

    #[error("upstream connection failed: {0}")]
    UpstreamConnection(String),

    #[error("upstream timed out: {0}")]
    UpstreamTimeout(String),

    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("authorization denied: {0}")]
    AuthorizationDenied(String),

    #[error("internal gateway error: {0}")]
    Internal(String),
}

impl GatewayError {
    /// HTTP status code returned to the caller.
    pub fn status_code(&self) -> u16 {
        match self {
            GatewayError::AdmissionDenied(_) => 429,
            GatewayError::RouteNotFound(_) => 404,
            GatewayError::ServiceUnavailable(_) => 503,
            GatewayError::UpstreamConnection(_) => 502,
            GatewayError::UpstreamTimeout(_) => 504,
            GatewayError::AuthenticationFailed(_) => 401,
            GatewayError::AuthorizationDenied(_) => 403,
            GatewayError::Internal(_) => 500,
        }
    }

    /// Stable machine-readable name, used in response bodies and audit events.
    pub fn kind(&self) -> &'static str {
        match self {
            GatewayError::AdmissionDenied(_) => "rate_limited",
            GatewayError::RouteNotFound(_) => "route_not_found",
            GatewayError::ServiceUnavailable(_) => "service_unavailable",
            GatewayError::UpstreamConnection(_) => "bad_gateway",
            GatewayError::UpstreamTimeout(_) => "gateway_timeout",
            GatewayError::AuthenticationFailed(_) => "unauthenticated",
            GatewayError::AuthorizationDenied(_) => "forbidden",
            GatewayError::Internal(_) => "internal_error",
        }
    }

    /// JSON body written for gateway-local failures.
    ///
    /// Authentication details stay in the logs; the caller only sees the kind.
    pub fn body(&self) -> serde_json::Value {
        let message = match self {
            GatewayError::AuthenticationFailed(_) => "invalid or expired token".to_string(),
            GatewayError::AuthorizationDenied(_) => "insufficient privileges".to_string(),
            other => other.to_string(),
        };
        serde_json::json!({
            "error": self.kind(),
            "message": message,
        })
    }
}

pub type GatewayResult<T> = Result<T, GatewayError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_follow_taxonomy() {
        assert_eq!(GatewayError::AdmissionDenied("c".into()).status_code(), 429);
        assert_eq!(GatewayError::RouteNotFound("/x".into()).status_code(), 404);
        assert_eq!(GatewayError::ServiceUnavailable("s".into()).status_code(), 503);
        assert_eq!(GatewayError::UpstreamConnection("e".into()).status_code(), 502);
        assert_eq!(GatewayError::UpstreamTimeout("e".into()).status_code(), 504);
        assert_eq!(GatewayError::AuthenticationFailed("e".into()).status_code(), 401);
        assert_eq!(GatewayError::AuthorizationDenied("e".into()).status_code(), 403);
        assert_eq!(GatewayError::Internal("e".into()).status_code(), 500);
    }

    #[test]
    fn auth_body_hides_reason() {
        let body = GatewayError::AuthenticationFailed("signature mismatch".into()).body();
        assert_eq!(body["error"], "unauthenticated");
        assert!(!body["message"].as_str().unwrap().contains("signature"));
    }
}
