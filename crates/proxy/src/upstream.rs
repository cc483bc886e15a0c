use dashmap::DashMap;
use gatehouse_common::BalanceStrategy;
use gatehouse_discovery::ServiceEndpoint;
use rand::Rng;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Picks one endpoint out of a freshly discovered set.
///
/// Round-robin keeps one counter per logical service name, so the rotation
/// survives endpoints reordering or changing between discovery calls.
#[derive(Default)]
pub struct LoadBalancer {
    counters: DashMap<String, Arc<AtomicUsize>>,
}

impl LoadBalancer {
    pub fn new() -> Self {
        Self::default()
    }

    fn counter(&self, service: &str) -> Arc<AtomicUsize> {
        if let Some(counter) = self.counters.get(service) {
            return Arc::clone(&counter);
        }
        Arc::clone(&self.counters.entry(service.to_string()).or_default())
    }

    /// Next endpoint in rotation for `service`. Every call advances the
    /// counter by exactly one.
    pub fn select_round_robin<'a>(
        &self,
        service: &str,
        endpoints: &'a [ServiceEndpoint],
    ) -> Option<&'a ServiceEndpoint> {
        if endpoints.is_empty() {
            return None;
        }
        let n = self.counter(service).fetch_add(1, Ordering::Relaxed);
        endpoints.get(n % endpoints.len())
    }

    /// Weighted random choice: draw uniformly from `[1, sum(weights)]` and
    /// return the first endpoint whose cumulative weight reaches the draw.
    ///
    /// Endpoints without a matching weight count as weight 0. An all-zero
    /// weight set falls back to round-robin.
    pub fn select_weighted<'a>(
        &self,
        service: &str,
        endpoints: &'a [ServiceEndpoint],
        weights: &[u32],
    ) -> Option<&'a ServiceEndpoint> {
        if endpoints.is_empty() {
            return None;
        }

        let total: u64 = weights.iter().take(endpoints.len()).map(|&w| w as u64).sum();
        if total == 0 {
            return self.select_round_robin(service, endpoints);
        }

        let draw = rand::thread_rng().gen_range(1..=total);
        pick_cumulative(endpoints, weights, draw)
    }

    /// Select according to the route's strategy, using each endpoint's own weight.
    pub fn select<'a>(
        &self,
        service: &str,
        strategy: BalanceStrategy,
        endpoints: &'a [ServiceEndpoint],
    ) -> Option<&'a ServiceEndpoint> {
        match strategy {
            BalanceStrategy::RoundRobin => self.select_round_robin(service, endpoints),
            BalanceStrategy::Weighted => {
                let weights: Vec<u32> = endpoints.iter().map(|e| e.weight).collect();
                self.select_weighted(service, endpoints, &weights)
            }
        }
    }

    pub fn tracked_services(&self) -> usize {
        self.counters.len()
    }
}

fn pick_cumulative<'a>(
    endpoints: &'a [ServiceEndpoint],
    weights: &[u32],
    draw: u64,
) -> Option<&'a ServiceEndpoint> {
    let mut cumulative = 0u64;
    for (endpoint, &weight) in endpoints.iter().zip(weights) {
        cumulative += weight as u64;
        if cumulative >= draw {
            return Some(endpoint);
        }
    }
    None
}
