use anyhow::{Context, Result};
use gatehouse_common::{AppConfig, DiscoveryBackend, DiscoveryConfig};
use gatehouse_discovery::{ConsulRegistry, ServiceRegistration, ServiceRegistry, StaticRegistry};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Configuration file used when none is given on the command line.
pub const DEFAULT_CONFIG_PATH: &str = "config/gatehouse.yaml";

/// Resolved configuration with the path it was read from.
pub struct ProxyConfig {
    pub config: AppConfig,
    pub config_path: PathBuf,
}

impl ProxyConfig {
    pub fn load(path: &str) -> Result<Self> {
        info!(path = path, "loading configuration");
        let config =
            AppConfig::load(path).with_context(|| format!("failed to load config from {path}"))?;
        Ok(Self {
            config,
            config_path: PathBuf::from(path),
        })
    }

    /// Config path from the first CLI argument, else [`DEFAULT_CONFIG_PATH`].
    pub fn path_from_args(mut args: impl Iterator<Item = String>) -> String {
        args.nth(1)
            .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string())
    }
}

/// Build the configured discovery backend.
pub fn registry_from_config(config: &DiscoveryConfig) -> Result<Arc<dyn ServiceRegistry>> {
    match config.backend {
        DiscoveryBackend::Static => {
            info!(services = config.services.len(), "using static service registry");
            Ok(Arc::new(StaticRegistry::from_config(&config.services)))
        }
        DiscoveryBackend::Consul => {
            let registry = ConsulRegistry::new(
                &config.consul.address,
                Duration::from_millis(config.consul.timeout_ms),
                Duration::from_secs(config.consul.health_check_interval_secs),
            )
            .context("failed to build consul client")?;
            Ok(Arc::new(registry))
        }
    }
}

/// The gateway's own registration, when self-registration is configured.
pub fn self_registration(config: &DiscoveryConfig) -> Option<ServiceRegistration> {
    config.register.as_ref().map(|r| {
        ServiceRegistration::new(
            r.service_name.clone(),
            r.host.clone(),
            r.port,
            r.health_check_url.clone(),
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_defaults_without_argument() {
        let args = vec!["gatehouse".to_string()];
        assert_eq!(ProxyConfig::path_from_args(args.into_iter()), DEFAULT_CONFIG_PATH);

        let args = vec!["gatehouse".to_string(), "/etc/gatehouse.yaml".to_string()];
        assert_eq!(ProxyConfig::path_from_args(args.into_iter()), "/etc/gatehouse.yaml");
    }

    #[tokio::test]
    async fn static_registry_is_seeded_from_config() {
        let config = AppConfig::from_yaml(
            r#"
server:
  listen: ["127.0.0.1:8080"]
discovery:
  services:
    echo-service:
      - host: 127.0.0.1
        port: 9001
  register:
    service_name: api-gateway
    host: 127.0.0.1
    port: 8080
    health_check_url: http://127.0.0.1:8080/health
auth:
  secret: s
"#,
        )
        .unwrap();

        let registry = registry_from_config(&config.discovery).unwrap();
        let endpoints = registry.discover("echo-service").await;
        assert_eq!(endpoints.len(), 1);
        assert_eq!(endpoints[0].port, 9001);

        let registration = self_registration(&config.discovery).unwrap();
        assert_eq!(registration.service_id(), "api-gateway-127.0.0.1-8080");
    }
}
