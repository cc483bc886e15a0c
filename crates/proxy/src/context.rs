use gatehouse_common::GatewayError;
use std::time::Instant;

use crate::gateway::ProxyTarget;

/// Per-request context carried through the Pingora proxy pipeline.
pub struct RequestContext {
    /// Rate-limit key: first `X-Forwarded-For` entry, else the socket peer IP.
    pub client_id: String,

    /// Socket peer IP, appended to `X-Forwarded-For` upstream.
    pub peer_ip: Option<String>,

    /// Request correlation id, forwarded as `X-Request-ID`.
    pub request_id: String,

    /// Request start time for latency measurement.
    pub request_start: Instant,

    /// HTTP method (cached for logging).
    pub method: String,

    /// Request path and query (cached for logging).
    pub uri: String,

    /// Dispatch decision, set once the request is admitted.
    pub target: Option<ProxyTarget>,

    /// Gateway-local failure answered instead of proxying.
    pub local_error: Option<GatewayError>,

    /// Response status code sent downstream.
    pub response_status: u16,
}

impl RequestContext {
    pub fn new() -> Self {
        Self {
            client_id: String::new(),
            peer_ip: None,
            request_id: String::new(),
            request_start: Instant::now(),
            method: String::new(),
            uri: String::new(),
            target: None,
            local_error: None,
            response_status: 0,
        }
    }

    /// Service label for metrics and logs.
    pub fn service(&self) -> &str {
        self.target
            .as_ref()
            .map(|t| t.route.service.as_str())
            .unwrap_or("-")
    }
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Pick the rate-limit key for a request.
pub fn client_id(forwarded_for: Option<&str>, peer_ip: Option<&str>) -> String {
    forwarded_for
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .or(peer_ip)
        .unwrap_or("unknown")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_id_prefers_first_forwarded_entry() {
        assert_eq!(client_id(Some("203.0.113.7, 10.0.0.1"), Some("10.0.0.2")), "203.0.113.7");
        assert_eq!(client_id(Some("  "), Some("10.0.0.2")), "10.0.0.2");
        assert_eq!(client_id(None, Some("::1")), "::1");
        assert_eq!(client_id(None, None), "unknown");
    }
}
