use async_trait::async_trait;
use gatehouse_common::StaticEndpoint;
use std::collections::BTreeMap;
use std::sync::{PoisonError, RwLock};
use tracing::{debug, info};

use crate::{dedup_endpoints, ServiceEndpoint, ServiceRegistration, ServiceRegistry};

/// In-memory registry seeded from configuration.
///
/// Every listed endpoint is considered healthy. Registrations made at runtime
/// are kept alongside the configured ones.
pub struct StaticRegistry {
    services: RwLock<BTreeMap<String, Vec<ServiceEndpoint>>>,
}

impl StaticRegistry {
    pub fn new() -> Self {
        Self {
            services: RwLock::new(BTreeMap::new()),
        }
    }

    pub fn from_config(services: &BTreeMap<String, Vec<StaticEndpoint>>) -> Self {
        let table = services
            .iter()
            .map(|(name, endpoints)| {
                let endpoints = endpoints
                    .iter()
                    .map(|e| ServiceEndpoint::new(e.host.clone(), e.port).with_weight(e.weight))
                    .collect();
                (name.clone(), dedup_endpoints(endpoints))
            })
            .collect::<BTreeMap<_, _>>();

        info!(services = table.len(), "static service registry loaded");
        Self {
            services: RwLock::new(table),
        }
    }

    /// Add an endpoint directly, bypassing health-check metadata.
    pub fn insert(&self, service_name: &str, endpoint: ServiceEndpoint) {
        let mut services = self.services.write().unwrap_or_else(PoisonError::into_inner);
        let entry = services.entry(service_name.to_string()).or_default();
        if !entry.iter().any(|e| e.same_instance(&endpoint)) {
            entry.push(endpoint);
        }
    }

    pub fn service_names(&self) -> Vec<String> {
        self.services
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect()
    }
}

impl Default for StaticRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ServiceRegistry for StaticRegistry {
    async fn register(&self, registration: &ServiceRegistration) {
        debug!(
            service = %registration.service_name,
            id = %registration.service_id(),
            "registering endpoint in static registry"
        );
        self.insert(&registration.service_name, registration.endpoint());
    }

    async fn deregister(&self, service_id: &str) {
        let mut services = self.services.write().unwrap_or_else(PoisonError::into_inner);
        for (name, endpoints) in services.iter_mut() {
            endpoints.retain(|e| format!("{}-{}-{}", name, e.host, e.port) != service_id);
        }
        services.retain(|_, endpoints| !endpoints.is_empty());
    }

    async fn discover(&self, service_name: &str) -> Vec<ServiceEndpoint> {
        self.services
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(service_name)
            .cloned()
            .unwrap_or_default()
    }
}
