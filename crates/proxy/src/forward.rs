use gatehouse_common::GatewayError;
use http::HeaderMap;
use pingora_core::{Error, ErrorSource, ErrorType, Result};
use pingora_http::{RequestHeader, ResponseHeader};
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::time::Duration;
use tracing::warn;

/// Connection-scoped headers never forwarded across a hop. Framing headers
/// (`transfer-encoding`, `content-length`) are re-established by the HTTP
/// codec on each side and are left alone here.
pub const HOP_BY_HOP_HEADERS: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-connection",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "upgrade",
];

/// Identity headers only the gateway may set.
pub const IDENTITY_HEADERS: &[&str] = &["x-user-id", "x-user-role"];

/// Every hop-by-hop header name present on this message, including the ones
/// nominated by its `Connection` header.
pub fn hop_by_hop_names(headers: &HeaderMap) -> Vec<String> {
    let mut names: Vec<String> = HOP_BY_HOP_HEADERS.iter().map(|h| h.to_string()).collect();

    for value in headers.get_all(http::header::CONNECTION) {
        let Ok(value) = value.to_str() else {
            continue;
        };
        for token in value.split(',') {
            let token = token.trim().to_ascii_lowercase();
            if !token.is_empty() && !names.contains(&token) {
                names.push(token);
            }
        }
    }

    names
}

pub fn strip_request_hop_by_hop(request: &mut RequestHeader) {
    for name in hop_by_hop_names(&request.headers) {
        request.remove_header(name.as_str());
    }
}

pub fn strip_response_hop_by_hop(response: &mut ResponseHeader) {
    for name in hop_by_hop_names(&response.headers) {
        response.remove_header(name.as_str());
    }
}

/// Tag the response with the gateway's request id unless the upstream
/// already supplied one.
pub fn ensure_request_id(response: &mut ResponseHeader, request_id: &str) -> Result<()> {
    if response.headers.contains_key("x-request-id") {
        return Ok(());
    }
    response.insert_header("x-request-id", request_id)
}

/// Resolve an endpoint address, giving up after `deadline`.
///
/// An expired deadline is a connect timeout (504); a failed or empty lookup
/// means there is no route to the endpoint (502).
pub async fn resolve_within<F, I>(
    endpoint: &str,
    lookup: F,
    deadline: Duration,
) -> Result<SocketAddr>
where
    F: Future<Output = io::Result<I>>,
    I: Iterator<Item = SocketAddr>,
{
    match tokio::time::timeout(deadline, lookup).await {
        Ok(Ok(mut addrs)) => addrs
            .next()
            .ok_or_else(|| Error::new_up(ErrorType::ConnectNoRoute)),
        Ok(Err(e)) => {
            warn!(endpoint, error = %e, "failed to resolve upstream endpoint");
            Err(Error::new_up(ErrorType::ConnectNoRoute))
        }
        Err(_) => {
            warn!(
                endpoint,
                timeout_ms = deadline.as_millis() as u64,
                "upstream resolution timed out"
            );
            Err(Error::new_up(ErrorType::ConnectTimedout))
        }
    }
}

/// How a failed proxy attempt should be answered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProxyFailure {
    /// Gateway-local failure, answered with a JSON error body.
    Gateway(GatewayError),
    /// Bare status: an explicit HTTP status error, or a malformed downstream request.
    Status(u16),
    /// The caller went away; nothing can be written back.
    Disconnected,
}

impl ProxyFailure {
    pub fn status_code(&self) -> u16 {
        match self {
            ProxyFailure::Gateway(e) => e.status_code(),
            ProxyFailure::Status(code) => *code,
            ProxyFailure::Disconnected => 0,
        }
    }
}

/// Map a Pingora error to the caller-visible outcome.
///
/// Upstream timeouts become 504, any other upstream failure 502, and
/// internal failures 500.
pub fn classify_proxy_error(error: &Error) -> ProxyFailure {
    if let ErrorType::HTTPStatus(code) = error.etype() {
        return ProxyFailure::Status(*code);
    }

    match error.esource() {
        ErrorSource::Upstream => match error.etype() {
            ErrorType::ConnectTimedout | ErrorType::ReadTimedout | ErrorType::WriteTimedout => {
                ProxyFailure::Gateway(GatewayError::UpstreamTimeout(error.to_string()))
            }
            _ => ProxyFailure::Gateway(GatewayError::UpstreamConnection(error.to_string())),
        },
        ErrorSource::Downstream => match error.etype() {
            ErrorType::ReadError | ErrorType::WriteError | ErrorType::ConnectionClosed => {
                ProxyFailure::Disconnected
            }
            _ => ProxyFailure::Status(400),
        },
        ErrorSource::Internal | ErrorSource::Unset => match error.etype() {
            ErrorType::ConnectTimedout => {
                ProxyFailure::Gateway(GatewayError::UpstreamTimeout(error.to_string()))
            }
            etype if is_connect_failure(etype) => {
                ProxyFailure::Gateway(GatewayError::UpstreamConnection(error.to_string()))
            }
            _ => ProxyFailure::Gateway(GatewayError::Internal(error.to_string())),
        },
    }
}

/// Connection-establishment failures are upstream failures even when the
/// error was not tagged with its source.
fn is_connect_failure(etype: &ErrorType) -> bool {
    matches!(
        etype,
        ErrorType::ConnectRefused
            | ErrorType::ConnectNoRoute
            | ErrorType::ConnectError
            | ErrorType::TLSHandshakeFailure
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_fixed_and_nominated_headers() {
        let mut req = RequestHeader::build("GET", b"/api/v1/thinking?q=1", None).unwrap();
        req.insert_header("connection", "keep-alive, x-session-hint").unwrap();
        req.insert_header("keep-alive", "timeout=5").unwrap();
        req.insert_header("proxy-authorization", "Basic Zm9v").unwrap();
        req.insert_header("x-session-hint", "abc").unwrap();
        req.insert_header("te", "trailers").unwrap();
        req.insert_header("authorization", "Bearer t").unwrap();
        req.insert_header("content-type", "application/json").unwrap();

        strip_request_hop_by_hop(&mut req);

        for gone in ["connection", "keep-alive", "proxy-authorization", "x-session-hint", "te"] {
            assert!(req.headers.get(gone).is_none(), "{gone} should be stripped");
        }
        assert!(req.headers.get("authorization").is_some());
        assert!(req.headers.get("content-type").is_some());
        assert_eq!(req.uri.query(), Some("q=1"));
    }

    #[test]
    fn strips_response_headers() {
        let mut resp = ResponseHeader::build(200u16, None).unwrap();
        resp.insert_header("connection", "close").unwrap();
        resp.insert_header("upgrade", "h2c").unwrap();
        resp.insert_header("x-backend", "space-service").unwrap();

        strip_response_hop_by_hop(&mut resp);

        assert!(resp.headers.get("connection").is_none());
        assert!(resp.headers.get("upgrade").is_none());
        assert!(resp.headers.get("x-backend").is_some());
    }

    #[test]
    fn keeps_upstream_request_id() {
        let mut resp = ResponseHeader::build(200u16, None).unwrap();
        resp.insert_header("x-request-id", "from-upstream").unwrap();
        ensure_request_id(&mut resp, "from-gateway").unwrap();
        assert_eq!(resp.headers["x-request-id"], "from-upstream");

        let mut resp = ResponseHeader::build(200u16, None).unwrap();
        ensure_request_id(&mut resp, "from-gateway").unwrap();
        assert_eq!(resp.headers["x-request-id"], "from-gateway");
    }

    #[tokio::test]
    async fn resolution_is_bounded_by_deadline() {
        let stalled = std::future::pending::<io::Result<std::vec::IntoIter<SocketAddr>>>();
        let err = resolve_within("stalled:80", stalled, Duration::from_millis(20))
            .await
            .unwrap_err();
        assert!(matches!(err.etype(), ErrorType::ConnectTimedout));
        assert_eq!(classify_proxy_error(&err).status_code(), 504);
    }

    #[tokio::test]
    async fn resolution_failures_are_bad_gateway() {
        let failed = async {
            Err::<std::vec::IntoIter<SocketAddr>, _>(io::Error::new(
                io::ErrorKind::NotFound,
                "no such host",
            ))
        };
        let err = resolve_within("missing:80", failed, Duration::from_secs(1))
            .await
            .unwrap_err();
        assert_eq!(classify_proxy_error(&err).status_code(), 502);

        let empty = async { Ok(Vec::<SocketAddr>::new().into_iter()) };
        let err = resolve_within("empty:80", empty, Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err.etype(), ErrorType::ConnectNoRoute));

        let addr: SocketAddr = "127.0.0.1:9001".parse().unwrap();
        let resolved = async move { Ok(vec![addr].into_iter()) };
        assert_eq!(
            resolve_within("local:9001", resolved, Duration::from_secs(1))
                .await
                .unwrap(),
            addr
        );
    }

    #[test]
    fn classifies_upstream_failures() {
        let refused = Error::new_up(ErrorType::ConnectRefused);
        assert_eq!(classify_proxy_error(&refused).status_code(), 502);

        for etype in [
            ErrorType::ConnectTimedout,
            ErrorType::ReadTimedout,
            ErrorType::WriteTimedout,
        ] {
            assert_eq!(classify_proxy_error(&Error::new_up(etype)).status_code(), 504);
        }

        let closed = Error::new_up(ErrorType::ConnectionClosed);
        assert!(matches!(
            classify_proxy_error(&closed),
            ProxyFailure::Gateway(GatewayError::UpstreamConnection(_))
        ));
    }

    #[test]
    fn classifies_downstream_and_internal_failures() {
        assert_eq!(
            classify_proxy_error(&Error::new_down(ErrorType::ConnectionClosed)),
            ProxyFailure::Disconnected
        );
        assert_eq!(
            classify_proxy_error(&Error::new_down(ErrorType::InvalidHTTPHeader)),
            ProxyFailure::Status(400)
        );
        assert_eq!(
            classify_proxy_error(&Error::new_in(ErrorType::InternalError)).status_code(),
            500
        );
        assert_eq!(
            classify_proxy_error(&Error::new(ErrorType::ConnectRefused)).status_code(),
            502
        );
        assert_eq!(
            classify_proxy_error(&Error::new(ErrorType::HTTPStatus(413))),
            ProxyFailure::Status(413)
        );
    }
}
