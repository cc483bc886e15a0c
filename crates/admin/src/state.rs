use std::sync::Arc;

use gatehouse_auth::Authorizer;
use gatehouse_common::AuditLog;
use gatehouse_router::SharedRouteTable;
use prometheus::{HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts, Registry};

/// Shared state type alias used across all route handlers.
pub type SharedState = Arc<AppState>;

/// State the admin API reads from and the proxy writes into.
pub struct AppState {
    pub routes: SharedRouteTable,
    pub metrics: Arc<GatewayMetrics>,
    pub audit_log: Arc<AuditLog>,
    /// Guards the mutating endpoints.
    pub authorizer: Authorizer,
    pub start_time: std::time::Instant,
}

/// Prometheus metrics collected by the gateway.
pub struct GatewayMetrics {
    pub registry: Registry,
    pub requests_total: IntCounter,
    pub rate_limited_total: IntCounter,
    pub auth_failures_total: IntCounterVec,
    pub upstream_errors_total: IntCounterVec,
    pub request_duration: HistogramVec,
}

impl GatewayMetrics {
    /// Create all collectors and register them against a fresh registry.
    pub fn new() -> prometheus::Result<Self> {
        let registry = Registry::new();

        let requests_total = IntCounter::with_opts(Opts::new(
            "gatehouse_requests_total",
            "Total number of requests received",
        ))?;

        let rate_limited_total = IntCounter::with_opts(Opts::new(
            "gatehouse_rate_limited_total",
            "Total number of requests rejected by the rate limiter",
        ))?;

        let auth_failures_total = IntCounterVec::new(
            Opts::new(
                "gatehouse_auth_failures_total",
                "Requests rejected by authentication or authorization",
            ),
            &["status"],
        )?;

        let upstream_errors_total = IntCounterVec::new(
            Opts::new(
                "gatehouse_upstream_errors_total",
                "Gateway-generated upstream failures by service and status",
            ),
            &["service", "status"],
        )?;

        let request_duration = HistogramVec::new(
            HistogramOpts::new(
                "gatehouse_request_duration_seconds",
                "End-to-end request duration in seconds",
            )
            .buckets(vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 5.0, 30.0]),
            &["service", "status"],
        )?;

        registry.register(Box::new(requests_total.clone()))?;
        registry.register(Box::new(rate_limited_total.clone()))?;
        registry.register(Box::new(auth_failures_total.clone()))?;
        registry.register(Box::new(upstream_errors_total.clone()))?;
        registry.register(Box::new(request_duration.clone()))?;

        Ok(Self {
            registry,
            requests_total,
            rate_limited_total,
            auth_failures_total,
            upstream_errors_total,
            request_duration,
        })
    }
}

impl AppState {
    pub fn new(
        routes: SharedRouteTable,
        metrics: Arc<GatewayMetrics>,
        audit_log: Arc<AuditLog>,
        authorizer: Authorizer,
    ) -> Self {
        Self {
            routes,
            metrics,
            audit_log,
            authorizer,
            start_time: std::time::Instant::now(),
        }
    }
}
