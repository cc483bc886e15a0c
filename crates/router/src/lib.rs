//! Prefix routing for the Gatehouse API gateway.
//!
//! Routes are evaluated in the order they were configured and the first
//! entry whose prefix matches the request path wins. Matching is a plain
//! string prefix test; overlapping prefixes are allowed and resolved purely
//! by order.

use arc_swap::ArcSwap;
use gatehouse_common::{validate_routes, RouteConfig};
use std::sync::Arc;
use tracing::info;

/// An immutable, ordered route table.
#[derive(Debug, Clone, Default)]
pub struct RouteTable {
    routes: Vec<RouteConfig>,
}

impl RouteTable {
    pub fn new(routes: Vec<RouteConfig>) -> Self {
        Self { routes }
    }

    /// First route whose prefix matches `path`, if any.
    pub fn resolve(&self, path: &str) -> Option<&RouteConfig> {
        self.routes
            .iter()
            .find(|route| path.starts_with(&route.path_prefix))
    }

    pub fn routes(&self) -> &[RouteConfig] {
        &self.routes
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

/// Route table shared between the proxy and the admin API.
///
/// Readers take a snapshot with [`load`](SharedRouteTable::load) and keep
/// resolving against it for the lifetime of a request, even if the table is
/// replaced concurrently.
#[derive(Clone)]
pub struct SharedRouteTable {
    inner: Arc<ArcSwap<RouteTable>>,
}

impl SharedRouteTable {
    pub fn new(table: RouteTable) -> Self {
        Self {
            inner: Arc::new(ArcSwap::from_pointee(table)),
        }
    }

    pub fn load(&self) -> Arc<RouteTable> {
        self.inner.load_full()
    }

    /// Validate and atomically install a new route table.
    pub fn replace(&self, routes: Vec<RouteConfig>) -> anyhow::Result<()> {
        validate_routes(&routes)?;
        let count = routes.len();
        self.inner.store(Arc::new(RouteTable::new(routes)));
        info!(routes = count, "route table replaced");
        Ok(())
    }
}
