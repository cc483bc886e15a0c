use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::{dedup_endpoints, DiscoveryError, ServiceEndpoint, ServiceRegistration, ServiceRegistry};

/// How long Consul keeps a critical instance before reaping it.
const DEREGISTER_CRITICAL_AFTER: &str = "1m";

/// Registry backed by the Consul agent HTTP API.
#[derive(Clone)]
pub struct ConsulRegistry {
    client: Client,
    base_url: String,
    check_interval: Duration,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct AgentServiceRegistration<'a> {
    #[serde(rename = "ID")]
    id: String,
    name: &'a str,
    address: &'a str,
    port: u16,
    check: AgentServiceCheck<'a>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct AgentServiceCheck<'a> {
    #[serde(rename = "HTTP")]
    http: &'a str,
    interval: String,
    timeout: String,
    deregister_critical_service_after: &'static str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct HealthEntry {
    node: HealthNode,
    service: HealthService,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct HealthNode {
    #[serde(default)]
    address: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct HealthService {
    #[serde(default)]
    address: String,
    port: u16,
    #[serde(default)]
    weights: Option<ServiceWeights>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ServiceWeights {
    passing: u32,
}

impl ConsulRegistry {
    /// Create a registry talking to the agent at `address`
    /// (e.g. `http://127.0.0.1:8500`).
    ///
    /// `timeout` bounds every request to the agent; `check_interval` is the
    /// health-probe period requested for registered endpoints.
    pub fn new(
        address: &str,
        timeout: Duration,
        check_interval: Duration,
    ) -> Result<Self, DiscoveryError> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()?;

        info!(address, timeout_ms = timeout.as_millis() as u64, "consul registry configured");
        Ok(Self {
            client,
            base_url: address.trim_end_matches('/').to_string(),
            check_interval,
        })
    }

    async fn try_register(&self, registration: &ServiceRegistration) -> Result<(), DiscoveryError> {
        let interval_secs = self.check_interval.as_secs().max(1);
        let body = AgentServiceRegistration {
            id: registration.service_id(),
            name: &registration.service_name,
            address: &registration.host,
            port: registration.port,
            check: AgentServiceCheck {
                http: &registration.health_check_url,
                interval: format!("{}s", interval_secs),
                timeout: format!("{}s", interval_secs.min(5)),
                deregister_critical_service_after: DEREGISTER_CRITICAL_AFTER,
            },
        };

        let response = self
            .client
            .put(format!("{}/v1/agent/service/register", self.base_url))
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(DiscoveryError::Status(response.status().as_u16()));
        }
        Ok(())
    }

    async fn try_deregister(&self, service_id: &str) -> Result<(), DiscoveryError> {
        let response = self
            .client
            .put(format!(
                "{}/v1/agent/service/deregister/{}",
                self.base_url, service_id
            ))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(DiscoveryError::Status(response.status().as_u16()));
        }
        Ok(())
    }

    async fn try_discover(&self, service_name: &str) -> Result<Vec<ServiceEndpoint>, DiscoveryError> {
        let response = self
            .client
            .get(format!("{}/v1/health/service/{}", self.base_url, service_name))
            .query(&[("passing", "true")])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(DiscoveryError::Status(response.status().as_u16()));
        }

        let entries: Vec<HealthEntry> = response.json().await?;
        let endpoints = entries
            .into_iter()
            .map(|entry| {
                // An empty service address means "use the node's address".
                let host = if entry.service.address.is_empty() {
                    entry.node.address
                } else {
                    entry.service.address
                };
                let weight = entry.service.weights.map(|w| w.passing).unwrap_or(1);
                ServiceEndpoint::new(host, entry.service.port).with_weight(weight)
            })
            .filter(|e| !e.host.is_empty())
            .collect();

        Ok(dedup_endpoints(endpoints))
    }
}

#[async_trait]
impl ServiceRegistry for ConsulRegistry {
    async fn register(&self, registration: &ServiceRegistration) {
        match self.try_register(registration).await {
            Ok(()) => info!(
                service = %registration.service_name,
                id = %registration.service_id(),
                "registered endpoint with consul"
            ),
            Err(e) => warn!(
                service = %registration.service_name,
                error = %e,
                "failed to register endpoint with consul"
            ),
        }
    }

    async fn deregister(&self, service_id: &str) {
        match self.try_deregister(service_id).await {
            Ok(()) => info!(id = service_id, "deregistered endpoint from consul"),
            Err(e) => warn!(id = service_id, error = %e, "failed to deregister endpoint from consul"),
        }
    }

    async fn discover(&self, service_name: &str) -> Vec<ServiceEndpoint> {
        match self.try_discover(service_name).await {
            Ok(endpoints) => {
                debug!(service = service_name, count = endpoints.len(), "consul lookup complete");
                endpoints
            }
            Err(e) => {
                warn!(service = service_name, error = %e, "consul lookup failed");
                Vec::new()
            }
        }
    }
}
