//! Service discovery for the Gatehouse API gateway.
//!
//! The gateway only ever needs two things from a discovery backend: advertise
//! an endpoint, and list the healthy endpoints of a logical service. Both sit
//! behind the [`ServiceRegistry`] trait so dispatch logic can run against the
//! in-memory [`StaticRegistry`] in tests and fixed deployments, or against
//! Consul through [`ConsulRegistry`].
//!
//! Backend failures never surface as errors: registration failures are
//! logged, and discovery failures yield an empty endpoint set which callers
//! treat as "service unavailable".

pub mod consul;
pub mod static_registry;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use thiserror::Error;

pub use consul::ConsulRegistry;
pub use static_registry::StaticRegistry;

/// One network-addressable instance of a logical service.
///
/// Two endpoints are the same instance when host and port match; `weight`
/// only informs weighted selection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceEndpoint {
    pub host: String,
    pub port: u16,
    #[serde(default = "default_weight", skip_serializing)]
    pub weight: u32,
}

fn default_weight() -> u32 {
    1
}

impl ServiceEndpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            weight: default_weight(),
        }
    }

    pub fn with_weight(mut self, weight: u32) -> Self {
        self.weight = weight;
        self
    }

    /// `host:port`, suitable for a TCP connect.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn same_instance(&self, other: &ServiceEndpoint) -> bool {
        self.host == other.host && self.port == other.port
    }
}

impl fmt::Display for ServiceEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Everything a backend needs to advertise and health-probe an endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceRegistration {
    pub service_name: String,
    pub host: String,
    pub port: u16,
    pub health_check_url: String,
}

impl ServiceRegistration {
    pub fn new(
        service_name: impl Into<String>,
        host: impl Into<String>,
        port: u16,
        health_check_url: impl Into<String>,
    ) -> Self {
        Self {
            service_name: service_name.into(),
            host: host.into(),
            port,
            health_check_url: health_check_url.into(),
        }
    }

    /// Stable identity; re-registering with the same id replaces, never duplicates.
    pub fn service_id(&self) -> String {
        format!("{}-{}-{}", self.service_name, self.host, self.port)
    }

    pub fn endpoint(&self) -> ServiceEndpoint {
        ServiceEndpoint::new(self.host.clone(), self.port)
    }
}

#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("discovery backend request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("discovery backend returned status {0}")]
    Status(u16),
}

/// Narrow view of a discovery backend used by the gateway.
#[async_trait]
pub trait ServiceRegistry: Send + Sync {
    /// Advertise an endpoint. Failures are logged and swallowed.
    async fn register(&self, registration: &ServiceRegistration);

    /// Withdraw a previously registered endpoint. Failures are logged and swallowed.
    async fn deregister(&self, service_id: &str);

    /// Healthy endpoints of `service_name`, in backend order, unique by
    /// (host, port). Empty when the backend is unreachable or nothing is healthy.
    async fn discover(&self, service_name: &str) -> Vec<ServiceEndpoint>;
}

/// Drop repeated (host, port) pairs, keeping the first occurrence.
pub fn dedup_endpoints(endpoints: Vec<ServiceEndpoint>) -> Vec<ServiceEndpoint> {
    let mut seen = HashSet::new();
    endpoints
        .into_iter()
        .filter(|e| seen.insert((e.host.clone(), e.port)))
        .collect()
}
