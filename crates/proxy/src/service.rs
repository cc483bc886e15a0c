use async_trait::async_trait;
use bytes::Bytes;
use gatehouse_common::GatewayError;
use pingora_core::prelude::*;
use pingora_core::upstreams::peer::HttpPeer;
use pingora_http::{RequestHeader, ResponseHeader};
use pingora_proxy::{FailToProxy, ProxyHttp, Session};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::context::{client_id, RequestContext};
use crate::forward::{
    classify_proxy_error, ensure_request_id, resolve_within, strip_request_hop_by_hop,
    strip_response_hop_by_hop, ProxyFailure, IDENTITY_HEADERS,
};
use crate::gateway::{Gateway, InboundRequest};

/// Pingora front end of the gateway: answers the local endpoints, runs
/// dispatch, and relays everything else to the selected endpoint.
pub struct GatewayProxy {
    gateway: Arc<Gateway>,
}

impl GatewayProxy {
    pub fn new(gateway: Arc<Gateway>) -> Self {
        Self { gateway }
    }

    pub fn gateway(&self) -> &Arc<Gateway> {
        &self.gateway
    }
}

fn header_str<'a>(header: &'a RequestHeader, name: &str) -> Option<&'a str> {
    header.headers.get(name).and_then(|v| v.to_str().ok())
}

/// Write a complete JSON response generated by the gateway itself.
async fn respond_json(
    session: &mut Session,
    status: u16,
    body: &Value,
    request_id: &str,
    retry_after: Option<u64>,
) -> Result<()> {
    let body = Bytes::from(body.to_string());

    let mut resp = ResponseHeader::build(status, Some(4))?;
    resp.insert_header("content-type", "application/json")?;
    resp.insert_header("content-length", body.len().to_string())?;
    if !request_id.is_empty() {
        resp.insert_header("x-request-id", request_id)?;
    }
    if let Some(secs) = retry_after {
        resp.insert_header("retry-after", secs.to_string())?;
    }

    session.write_response_header(Box::new(resp), false).await?;
    session.write_response_body(Some(body), true).await?;
    Ok(())
}

#[async_trait]
impl ProxyHttp for GatewayProxy {
    type CTX = RequestContext;

    fn new_ctx(&self) -> Self::CTX {
        RequestContext::new()
    }

    async fn request_filter(&self, session: &mut Session, ctx: &mut Self::CTX) -> Result<bool> {
        self.gateway.metrics().requests_total.inc();

        ctx.peer_ip = session
            .client_addr()
            .and_then(|addr| addr.as_inet())
            .map(|addr| addr.ip().to_string());

        let header = session.req_header();
        ctx.method = header.method.as_str().to_string();
        ctx.uri = header
            .uri
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or("/")
            .to_string();
        ctx.client_id = client_id(header_str(header, "x-forwarded-for"), ctx.peer_ip.as_deref());
        ctx.request_id = header_str(header, "x-request-id")
            .map(str::to_string)
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        let path = header.uri.path().to_string();
        let authorization = header_str(header, "authorization").map(str::to_string);
        let is_get = header.method == http::Method::GET;

        // Gateway-local endpoints bypass admission control.
        if is_get && path == "/health" {
            let body = self.gateway.health_report();
            respond_json(session, 200, &body, &ctx.request_id, None).await?;
            ctx.response_status = 200;
            return Ok(true);
        }
        if is_get && path == "/services" {
            let body = self.gateway.services_report().await;
            respond_json(session, 200, &body, &ctx.request_id, None).await?;
            ctx.response_status = 200;
            return Ok(true);
        }

        let request = InboundRequest {
            client_id: &ctx.client_id,
            path: &path,
            authorization: authorization.as_deref(),
        };

        match self.gateway.dispatch(&request).await {
            Ok(target) => {
                ctx.target = Some(target);
                Ok(false)
            }
            Err(e) => {
                let status = e.status_code();
                info!(
                    client_id = %ctx.client_id,
                    uri = %ctx.uri,
                    status,
                    reason = %e,
                    "request rejected by gateway"
                );
                let retry_after = match e {
                    GatewayError::AdmissionDenied(_) => {
                        self.gateway.limiter().map(|l| l.window_secs())
                    }
                    _ => None,
                };
                session.set_keepalive(None);
                respond_json(session, status, &e.body(), &ctx.request_id, retry_after).await?;
                ctx.response_status = status;
                ctx.local_error = Some(e);
                Ok(true)
            }
        }
    }

    async fn upstream_peer(
        &self,
        _session: &mut Session,
        ctx: &mut Self::CTX,
    ) -> Result<Box<HttpPeer>> {
        let Some(target) = ctx.target.as_ref() else {
            return Err(Error::explain(
                InternalError,
                "request reached upstream selection without a target",
            ));
        };
        let endpoint = &target.endpoint;

        let timeouts = self.gateway.upstream_timeouts();
        let addr = resolve_within(
            &endpoint.to_string(),
            tokio::net::lookup_host((endpoint.host.as_str(), endpoint.port)),
            timeouts.connect,
        )
        .await?;

        debug!(service = %target.route.service, %addr, "selected upstream peer");

        let mut peer = HttpPeer::new(addr, false, String::new());
        peer.options.connection_timeout = Some(timeouts.connect);
        peer.options.read_timeout = Some(timeouts.read);
        peer.options.write_timeout = Some(timeouts.read);
        Ok(Box::new(peer))
    }

    async fn upstream_request_filter(
        &self,
        _session: &mut Session,
        upstream_request: &mut RequestHeader,
        ctx: &mut Self::CTX,
    ) -> Result<()> {
        strip_request_hop_by_hop(upstream_request);

        // Identity headers are only ever derived from a verified token.
        for name in IDENTITY_HEADERS {
            upstream_request.remove_header(*name);
        }
        if let Some(identity) = ctx.target.as_ref().and_then(|t| t.identity.as_ref()) {
            upstream_request.insert_header("x-user-id", identity.user_id.as_str())?;
            upstream_request.insert_header("x-user-role", identity.role.as_str())?;
        }

        if let Some(peer_ip) = &ctx.peer_ip {
            let forwarded = match header_str(upstream_request, "x-forwarded-for") {
                Some(existing) => format!("{}, {}", existing, peer_ip),
                None => peer_ip.clone(),
            };
            upstream_request.insert_header("x-forwarded-for", forwarded)?;
        }
        upstream_request.insert_header("x-request-id", ctx.request_id.as_str())?;
        Ok(())
    }

    async fn response_filter(
        &self,
        _session: &mut Session,
        upstream_response: &mut ResponseHeader,
        ctx: &mut Self::CTX,
    ) -> Result<()>
    where
        Self::CTX: Send + Sync,
    {
        // Upstream status, headers and body are relayed as-is, 4xx/5xx included.
        strip_response_hop_by_hop(upstream_response);
        ensure_request_id(upstream_response, &ctx.request_id)?;
        ctx.response_status = upstream_response.status.as_u16();
        Ok(())
    }

    async fn fail_to_proxy(
        &self,
        session: &mut Session,
        e: &Error,
        ctx: &mut Self::CTX,
    ) -> FailToProxy
    where
        Self::CTX: Send + Sync,
    {
        let failure = classify_proxy_error(e);
        let code = failure.status_code();

        match failure {
            ProxyFailure::Gateway(err) => {
                warn!(
                    service = ctx.service(),
                    uri = %ctx.uri,
                    status = code,
                    error = %e,
                    "proxying failed"
                );
                self.gateway.record_failure(Some(ctx.service()), &ctx.uri, &err);
                if session.response_written().is_none() {
                    if let Err(write_err) =
                        respond_json(session, code, &err.body(), &ctx.request_id, None).await
                    {
                        debug!(error = %write_err, "failed to write error response");
                    }
                }
                ctx.local_error = Some(err);
            }
            ProxyFailure::Status(status) => {
                if session.response_written().is_none() {
                    let _ = session.respond_error(status).await;
                }
            }
            ProxyFailure::Disconnected => {
                debug!(uri = %ctx.uri, error = %e, "downstream disconnected");
            }
        }

        ctx.response_status = code;
        FailToProxy {
            error_code: code,
            can_reuse_downstream: false,
        }
    }

    async fn logging(&self, session: &mut Session, error: Option<&Error>, ctx: &mut Self::CTX) {
        let duration = ctx.request_start.elapsed();
        let status = session
            .response_written()
            .map(|resp| resp.status.as_u16())
            .unwrap_or(ctx.response_status);
        let status_label = status.to_string();

        self.gateway
            .metrics()
            .request_duration
            .with_label_values(&[ctx.service(), status_label.as_str()])
            .observe(duration.as_secs_f64());

        info!(
            request_id = %ctx.request_id,
            client_id = %ctx.client_id,
            method = %ctx.method,
            uri = %ctx.uri,
            service = ctx.service(),
            upstream = ctx.target.as_ref().map(|t| t.endpoint.to_string()).unwrap_or_default(),
            status,
            duration_ms = duration.as_millis() as u64,
            local_error = ctx.local_error.as_ref().map(|e| e.kind()).unwrap_or("-"),
            error = ?error.map(|e| e.etype()),
            "request completed"
        );
    }
}
