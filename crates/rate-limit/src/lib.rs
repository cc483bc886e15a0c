//! Per-client admission control for the Gatehouse API gateway.
//!
//! The limiter implements a sliding-window log: every admitted request's
//! instant is kept per client, and a new request is admitted only while fewer
//! than `max_requests` of those instants fall inside the trailing window.
//! Unlike fixed or interpolated windows this never admits a burst that
//! straddles a window boundary.
//!
//! State is held in a [`DashMap`](dashmap::DashMap) of per-client mutexes and
//! idle clients are evicted by [`RateLimiter::cleanup`], which the gateway
//! runs on a timer.

pub mod sliding_window;

use std::sync::Arc;

pub use sliding_window::SlidingWindowLimiter;

/// The gateway-facing rate limiter: a sliding-window log plus the configured
/// default budget.
///
/// The limiter is cheaply cloneable (backed by `Arc`) and safe to share across
/// tasks and threads.
#[derive(Clone)]
pub struct RateLimiter {
    inner: Arc<SlidingWindowLimiter>,
    max_requests: usize,
    window_secs: u64,
}

impl RateLimiter {
    /// Create a rate limiter with a default budget.
    ///
    /// * `max_requests` - requests admitted per client within one window
    /// * `window_secs`  - trailing window length in seconds
    pub fn new(max_requests: usize, window_secs: u64) -> Self {
        tracing::info!(max_requests, window_secs, "creating sliding window rate limiter");
        Self {
            inner: Arc::new(SlidingWindowLimiter::new()),
            max_requests,
            window_secs,
        }
    }

    /// Check `client_id` against an explicit budget.
    pub fn is_allowed(&self, client_id: &str, max_requests: usize, window_secs: u64) -> bool {
        self.inner.is_allowed(client_id, max_requests, window_secs)
    }

    /// Check `client_id` against the default budget.
    ///
    /// Returns `true` if the request is permitted, `false` if the caller has
    /// exceeded the rate limit and should receive a 429 response.
    pub fn check(&self, client_id: &str) -> bool {
        self.is_allowed(client_id, self.max_requests, self.window_secs)
    }

    /// Evict clients that have been idle for a full window.
    pub fn cleanup(&self) {
        self.inner.cleanup();
        tracing::trace!("rate limiter cleanup tick completed");
    }

    pub fn tracked_clients(&self) -> usize {
        self.inner.tracked_clients()
    }

    pub fn max_requests(&self) -> usize {
        self.max_requests
    }

    pub fn window_secs(&self) -> u64 {
        self.window_secs
    }
}
