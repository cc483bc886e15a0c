use dashmap::DashMap;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

/// Admitted request times for one client, oldest first.
struct ClientWindow {
    timestamps: VecDeque<Instant>,
    /// Window length used by the most recent check, so the sweep knows when
    /// the log has fully aged out.
    window: Duration,
    last_seen: Instant,
}

/// A concurrent sliding-window-log rate limiter.
///
/// Each client keeps the exact instants of its admitted requests. A request
/// is admitted when fewer than `max_requests` of those fall within the
/// trailing window. Every client sits behind its own mutex, so the map shard
/// lock is only held long enough to find (or create) that mutex; unrelated
/// clients never wait on each other's check-and-append.
pub struct SlidingWindowLimiter {
    windows: DashMap<String, Arc<Mutex<ClientWindow>>>,
}

impl SlidingWindowLimiter {
    pub fn new() -> Self {
        Self {
            windows: DashMap::new(),
        }
    }

    /// Check whether a request from `client_id` is allowed.
    ///
    /// Returns `true` and records the request when fewer than `max_requests`
    /// requests were admitted in the last `window_secs`; otherwise returns
    /// `false` without recording anything.
    pub fn is_allowed(&self, client_id: &str, max_requests: usize, window_secs: u64) -> bool {
        self.is_allowed_at(client_id, max_requests, window_secs, Instant::now())
    }

    pub(crate) fn is_allowed_at(
        &self,
        client_id: &str,
        max_requests: usize,
        window_secs: u64,
        now: Instant,
    ) -> bool {
        let window = Duration::from_secs(window_secs);
        let slot = self.slot(client_id, window, now);
        Self::admit(&slot, max_requests, window, now)
    }

    /// Purge, check and append under the client's own lock.
    fn admit(
        slot: &Mutex<ClientWindow>,
        max_requests: usize,
        window: Duration,
        now: Instant,
    ) -> bool {
        let mut state = slot.lock().unwrap_or_else(PoisonError::into_inner);

        state.window = window;
        state.last_seen = now;

        // Purge everything at or before the window's trailing edge.
        while let Some(&oldest) = state.timestamps.front() {
            if now.saturating_duration_since(oldest) >= window {
                state.timestamps.pop_front();
            } else {
                break;
            }
        }

        if state.timestamps.len() >= max_requests {
            return false;
        }

        state.timestamps.push_back(now);
        true
    }

    fn slot(&self, client_id: &str, window: Duration, now: Instant) -> Arc<Mutex<ClientWindow>> {
        if let Some(existing) = self.windows.get(client_id) {
            return Arc::clone(existing.value());
        }
        let entry = self.windows.entry(client_id.to_string()).or_insert_with(|| {
            Arc::new(Mutex::new(ClientWindow {
                timestamps: VecDeque::new(),
                window,
                last_seen: now,
            }))
        });
        Arc::clone(entry.value())
    }

    /// Remove clients whose every logged request has aged out of the window.
    ///
    /// Windows still referenced by an in-flight check are left alone and
    /// picked up by a later sweep. `retain` holds the shard write lock, so no
    /// new reference can be taken while the count is inspected.
    pub fn cleanup(&self) {
        self.cleanup_at(Instant::now());
    }

    pub(crate) fn cleanup_at(&self, now: Instant) {
        self.windows.retain(|_key, slot| {
            if Arc::strong_count(slot) > 1 {
                return true;
            }
            match slot.try_lock() {
                Ok(state) => now.saturating_duration_since(state.last_seen) < state.window,
                Err(_) => true,
            }
        });

        tracing::debug!(
            remaining = self.windows.len(),
            "sliding window cleanup complete"
        );
    }

    /// Number of clients currently tracked.
    pub fn tracked_clients(&self) -> usize {
        self.windows.len()
    }
}

impl Default for SlidingWindowLimiter {
    fn default() -> Self {
        Self::new()
    }
}
