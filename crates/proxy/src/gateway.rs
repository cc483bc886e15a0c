//! Per-request dispatch: admission, routing, discovery, selection and
//! authorization, in that order.
//!
//! Everything here is independent of Pingora so the whole decision path can
//! be exercised against in-memory collaborators.

use anyhow::Context;
use gatehouse_admin::GatewayMetrics;
use gatehouse_auth::{authorizer_from_config, ActiveTokenStore, Authorizer, Identity};
use gatehouse_common::{
    AppConfig, AuditEvent, AuditLog, AuditOutcome, AuditSink, GatewayError, GatewayResult,
    RouteConfig,
};
use gatehouse_discovery::{ServiceEndpoint, ServiceRegistry};
use gatehouse_rate_limit::RateLimiter;
use gatehouse_router::{RouteTable, SharedRouteTable};
use serde_json::{json, Map, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::upstream::LoadBalancer;

/// Name under which the gateway appears in audit events.
pub const GATEWAY_SERVICE: &str = "api-gateway";

/// The parts of an inbound request that dispatch decisions depend on.
#[derive(Debug, Clone, Copy)]
pub struct InboundRequest<'a> {
    pub client_id: &'a str,
    pub path: &'a str,
    pub authorization: Option<&'a str>,
}

/// Where an admitted request goes, and on whose behalf.
#[derive(Debug, Clone)]
pub struct ProxyTarget {
    pub route: RouteConfig,
    pub endpoint: ServiceEndpoint,
    pub identity: Option<Identity>,
}

#[derive(Debug, Clone, Copy)]
pub struct UpstreamTimeouts {
    pub connect: Duration,
    pub read: Duration,
}

/// Process-wide gateway state, shared by the proxy service, the admin API
/// and the background services.
pub struct Gateway {
    limiter: Option<RateLimiter>,
    routes: SharedRouteTable,
    registry: Arc<dyn ServiceRegistry>,
    balancer: LoadBalancer,
    authorizer: Authorizer,
    audit: Arc<AuditLog>,
    metrics: Arc<GatewayMetrics>,
    discovery_timeout: Duration,
    upstream_timeouts: UpstreamTimeouts,
}

impl Gateway {
    pub fn from_config(
        config: &AppConfig,
        registry: Arc<dyn ServiceRegistry>,
        active_tokens: Arc<dyn ActiveTokenStore>,
    ) -> anyhow::Result<Self> {
        let limiter = if config.rate_limit.enabled {
            Some(RateLimiter::new(
                config.rate_limit.max_requests,
                config.rate_limit.window_secs,
            ))
        } else {
            info!("rate limiting disabled");
            None
        };

        let audit = Arc::new(AuditLog::new(
            config.audit.retention_secs,
            config.audit.capacity,
        ));
        let metrics = Arc::new(GatewayMetrics::new().context("failed to register metrics")?);
        let authorizer =
            authorizer_from_config(GATEWAY_SERVICE, &config.auth, active_tokens, audit.clone())
                .context("failed to build token validator")?;

        info!(
            routes = config.routes.len(),
            discovery = ?config.discovery.backend,
            "gateway initialized"
        );

        Ok(Self {
            limiter,
            routes: SharedRouteTable::new(RouteTable::new(config.routes.clone())),
            registry,
            balancer: LoadBalancer::new(),
            authorizer,
            audit,
            metrics,
            discovery_timeout: Duration::from_millis(config.discovery.timeout_ms),
            upstream_timeouts: UpstreamTimeouts {
                connect: Duration::from_millis(config.server.upstream_connect_timeout_ms),
                read: Duration::from_millis(config.server.upstream_read_timeout_ms),
            },
        })
    }

    pub fn routes(&self) -> &SharedRouteTable {
        &self.routes
    }

    pub fn metrics(&self) -> &Arc<GatewayMetrics> {
        &self.metrics
    }

    pub fn audit_log(&self) -> &Arc<AuditLog> {
        &self.audit
    }

    pub fn limiter(&self) -> Option<&RateLimiter> {
        self.limiter.as_ref()
    }

    pub fn authorizer(&self) -> &Authorizer {
        &self.authorizer
    }

    pub fn upstream_timeouts(&self) -> UpstreamTimeouts {
        self.upstream_timeouts
    }

    /// Decide where `request` goes. Every rejection is audited and counted
    /// before it is returned.
    pub async fn dispatch(&self, request: &InboundRequest<'_>) -> GatewayResult<ProxyTarget> {
        let result = self.try_dispatch(request).await;
        if let Err(ref e) = result {
            self.record_failure(None, request.path, e);
        }
        result
    }

    async fn try_dispatch(&self, request: &InboundRequest<'_>) -> GatewayResult<ProxyTarget> {
        if let Some(limiter) = &self.limiter {
            if !limiter.check(request.client_id) {
                return Err(GatewayError::AdmissionDenied(request.client_id.to_string()));
            }
        }

        let route = self
            .routes
            .load()
            .resolve(request.path)
            .cloned()
            .ok_or_else(|| GatewayError::RouteNotFound(request.path.to_string()))?;

        let endpoints = self.discover(&route.service).await?;
        let endpoint = self
            .balancer
            .select(&route.service, route.balance, &endpoints)
            .cloned()
            .ok_or_else(|| GatewayError::ServiceUnavailable(route.service.clone()))?;

        let identity = match &route.auth {
            Some(policy) => Some(
                self.authorizer
                    .authorize_request(request.authorization, policy)
                    .await?,
            ),
            None => None,
        };

        debug!(
            service = %route.service,
            endpoint = %endpoint,
            user_id = identity.as_ref().map(|i| i.user_id.as_str()).unwrap_or("-"),
            "request dispatched"
        );

        Ok(ProxyTarget {
            route,
            endpoint,
            identity,
        })
    }

    /// Healthy endpoints of `service`, bounded by the discovery deadline.
    async fn discover(&self, service: &str) -> GatewayResult<Vec<ServiceEndpoint>> {
        match tokio::time::timeout(self.discovery_timeout, self.registry.discover(service)).await {
            Ok(endpoints) if endpoints.is_empty() => {
                Err(GatewayError::ServiceUnavailable(service.to_string()))
            }
            Ok(endpoints) => Ok(endpoints),
            Err(_) => {
                warn!(
                    service,
                    timeout_ms = self.discovery_timeout.as_millis() as u64,
                    "discovery timed out"
                );
                Err(GatewayError::UpstreamTimeout(format!(
                    "discovery of {} exceeded {}ms",
                    service,
                    self.discovery_timeout.as_millis()
                )))
            }
        }
    }

    /// Audit and count a gateway-local failure.
    pub fn record_failure(&self, service: Option<&str>, path: &str, error: &GatewayError) {
        let service = service.or(match error {
            GatewayError::ServiceUnavailable(name) => Some(name.as_str()),
            _ => None,
        });
        let status = error.status_code();
        let status_label = status.to_string();
        match error {
            GatewayError::AdmissionDenied(_) => self.metrics.rate_limited_total.inc(),
            GatewayError::AuthenticationFailed(_) | GatewayError::AuthorizationDenied(_) => self
                .metrics
                .auth_failures_total
                .with_label_values(&[status_label.as_str()])
                .inc(),
            GatewayError::ServiceUnavailable(_)
            | GatewayError::UpstreamConnection(_)
            | GatewayError::UpstreamTimeout(_)
            | GatewayError::Internal(_) => self
                .metrics
                .upstream_errors_total
                .with_label_values(&[service.unwrap_or("-"), status_label.as_str()])
                .inc(),
            GatewayError::RouteNotFound(_) => {}
        }

        let outcome = if status >= 500 {
            AuditOutcome::Failed
        } else {
            AuditOutcome::Denied
        };
        self.audit.record(
            AuditEvent::new(error.kind(), outcome)
                .service(service.unwrap_or(GATEWAY_SERVICE))
                .detail(format!("path={} status={} {}", path, status, error)),
        );
    }

    /// Body of `GET /health`.
    pub fn health_report(&self) -> Value {
        json!({
            "status": "healthy",
            "timestamp": chrono::Utc::now().to_rfc3339(),
        })
    }

    /// Body of `GET /services`: one entry per routed service with its
    /// currently healthy instances. A service reached by several routes is
    /// reported under its first route.
    pub async fn services_report(&self) -> Value {
        let table = self.routes.load();
        let mut report = Map::new();

        for route in table.routes() {
            if report.contains_key(&route.service) {
                continue;
            }
            let instances = tokio::time::timeout(
                self.discovery_timeout,
                self.registry.discover(&route.service),
            )
            .await
            .unwrap_or_default();

            report.insert(
                route.service.clone(),
                json!({
                    "route": route.path_prefix,
                    "instanceCount": instances.len(),
                    "instances": instances,
                }),
            );
        }

        Value::Object(report)
    }
}
