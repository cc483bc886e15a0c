use anyhow::{Context, Result};
use gatehouse_auth::active_store_from_config;
use gatehouse_discovery::{ServiceRegistration, ServiceRegistry};
use gatehouse_proxy::config::{registry_from_config, self_registration, ProxyConfig};
use gatehouse_proxy::{Gateway, GatewayProxy};
use gatehouse_rate_limit::RateLimiter;
use pingora_core::server::{Server, ShutdownWatch};
use pingora_core::services::background::{background_service, BackgroundService};
use pingora_proxy::http_proxy_service;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

fn main() -> Result<()> {
    // Initialize tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).json().init();

    let config_path = ProxyConfig::path_from_args(std::env::args());
    info!(config_path = %config_path, "starting gatehouse");

    let proxy_config = ProxyConfig::load(&config_path)?;
    info!(
        config_path = %proxy_config.config_path.display(),
        routes = proxy_config.config.routes.len(),
        "configuration loaded"
    );
    let app_config = proxy_config.config;

    let registry = registry_from_config(&app_config.discovery)?;
    let active_tokens =
        active_store_from_config(&app_config.auth).context("failed to set up active-token store")?;
    let gateway = Arc::new(Gateway::from_config(&app_config, registry.clone(), active_tokens)?);

    // Create Pingora server
    let mut server = Server::new(None)?;
    server.bootstrap();

    let mut proxy_service =
        http_proxy_service(&server.configuration, GatewayProxy::new(gateway.clone()));
    for listen_addr in &app_config.server.listen {
        info!(addr = %listen_addr, "adding listener");
        proxy_service.add_tcp(listen_addr);
    }
    server.add_service(proxy_service);

    if app_config.server.admin.enabled {
        let state = Arc::new(gatehouse_admin::AppState::new(
            gateway.routes().clone(),
            gateway.metrics().clone(),
            gateway.audit_log().clone(),
            gateway.authorizer().clone(),
        ));
        server.add_service(background_service(
            "admin API",
            AdminBackgroundService {
                listen_addr: app_config.server.admin.listen.clone(),
                state,
            },
        ));
    }

    if let Some(limiter) = gateway.limiter() {
        server.add_service(background_service(
            "rate limit sweeper",
            RateLimitSweeper {
                limiter: limiter.clone(),
                interval: Duration::from_secs(app_config.rate_limit.sweep_interval_secs.max(1)),
            },
        ));
    }

    if let Some(registration) = self_registration(&app_config.discovery) {
        server.add_service(background_service(
            "self registration",
            SelfRegistration {
                registry,
                registration,
            },
        ));
    }

    info!("gatehouse started");
    server.run_forever();
}

/// Background service to run the admin API alongside Pingora.
struct AdminBackgroundService {
    listen_addr: String,
    state: gatehouse_admin::SharedStateType,
}

#[async_trait::async_trait]
impl BackgroundService for AdminBackgroundService {
    async fn start(&self, mut shutdown: ShutdownWatch) {
        info!(addr = %self.listen_addr, "starting admin API");

        tokio::select! {
            result = gatehouse_admin::run_admin_server(self.state.clone(), &self.listen_addr) => {
                if let Err(e) = result {
                    error!(error = %e, "admin API server error");
                }
            }
            _ = shutdown.changed() => {
                info!("admin API shutting down");
            }
        }
    }
}

/// Periodically evicts idle rate-limit windows.
struct RateLimitSweeper {
    limiter: RateLimiter,
    interval: Duration,
}

#[async_trait::async_trait]
impl BackgroundService for RateLimitSweeper {
    async fn start(&self, mut shutdown: ShutdownWatch) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.limiter.cleanup();
                    info!(tracked_clients = self.limiter.tracked_clients(), "rate limit sweep");
                }
                _ = shutdown.changed() => {
                    info!("rate limit sweeper stopping");
                    return;
                }
            }
        }
    }
}

/// Advertises the gateway in the registry for the lifetime of the process.
struct SelfRegistration {
    registry: Arc<dyn ServiceRegistry>,
    registration: ServiceRegistration,
}

#[async_trait::async_trait]
impl BackgroundService for SelfRegistration {
    async fn start(&self, mut shutdown: ShutdownWatch) {
        self.registry.register(&self.registration).await;

        let _ = shutdown.changed().await;
        self.registry
            .deregister(&self.registration.service_id())
            .await;
        info!(service_id = %self.registration.service_id(), "gateway deregistered");
    }
}
