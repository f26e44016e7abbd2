//! Per-client minimum-interval rate limiting.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::debug;

/// Admits at most one request per client within `min_interval`.
///
/// The check and the update happen under one lock, so two concurrent
/// requests from the same client can never both pass.
pub struct RateLimiter {
    min_interval: Duration,
    last_allowed: Mutex<HashMap<String, Instant>>,
}

impl RateLimiter {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_allowed: Mutex::new(HashMap::new()),
        }
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    pub fn allow(&self, client_id: &str) -> bool {
        self.allow_at(client_id, Instant::now())
    }

    /// Same as [`RateLimiter::allow`] at an explicit instant.
    pub fn allow_at(&self, client_id: &str, now: Instant) -> bool {
        let mut last_allowed = self.last_allowed.lock();
        if let Some(last) = last_allowed.get(client_id) {
            if now.saturating_duration_since(*last) < self.min_interval {
                debug!("Rate limited client {}", client_id);
                return false;
            }
        }
        last_allowed.insert(client_id.to_string(), now);
        true
    }

    /// Drop clients idle for longer than `max_idle`; returns how many.
    ///
    /// `max_idle` is raised to the minimum interval so eviction never turns
    /// a rejection into an admission.
    pub fn evict_idle(&self, max_idle: Duration) -> usize {
        self.evict_idle_at(max_idle, Instant::now())
    }

    pub fn evict_idle_at(&self, max_idle: Duration, now: Instant) -> usize {
        let max_idle = max_idle.max(self.min_interval);
        let mut last_allowed = self.last_allowed.lock();
        let before = last_allowed.len();
        last_allowed.retain(|_, last| now.saturating_duration_since(*last) <= max_idle);
        before - last_allowed.len()
    }

    /// Number of tracked clients.
    pub fn len(&self) -> usize {
        self.last_allowed.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
