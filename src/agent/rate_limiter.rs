//! Rate Limiter
//!
//! Token buckets that cap how often the pipeline calls its text generator.

use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Named call budgets. Purposes without a bucket are unlimited.
#[derive(Default)]
pub struct RateLimiter {
    buckets: HashMap<String, Budget>,
}

/// Continuously refilling budget of `capacity` calls per `window`.
struct Budget {
    capacity: f64,
    available: f64,
    per_second: f64,
    updated: Instant,
}

impl Budget {
    fn new(max_calls: u32, window: Duration) -> Self {
        let capacity = max_calls.max(1) as f64;
        let window = window.as_secs_f64();
        Self {
            capacity,
            available: capacity,
            per_second: if window > 0.0 { capacity / window } else { f64::INFINITY },
            updated: Instant::now(),
        }
    }

    fn top_up(&mut self) {
        let now = Instant::now();
        let gained = now.duration_since(self.updated).as_secs_f64() * self.per_second;
        self.available = (self.available + gained).min(self.capacity);
        self.updated = now;
    }

    fn take(&mut self) -> bool {
        self.top_up();
        if self.available >= 1.0 {
            self.available -= 1.0;
            true
        } else {
            false
        }
    }

    fn wait_time(&mut self) -> Duration {
        self.top_up();
        if self.available >= 1.0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64((1.0 - self.available) / self.per_second)
    }
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allows `max_calls` per `window` for `purpose`.
    pub fn with_bucket(mut self, purpose: &str, max_calls: u32, window: Duration) -> Self {
        self.buckets.insert(purpose.to_string(), Budget::new(max_calls, window));
        self
    }

    /// Spends one call from `purpose`'s budget if any is left.
    pub fn check(&mut self, purpose: &str) -> bool {
        self.buckets.get_mut(purpose).map_or(true, Budget::take)
    }

    /// How long until `purpose` can be called again.
    pub fn retry_after(&mut self, purpose: &str) -> Duration {
        self.buckets
            .get_mut(purpose)
            .map_or(Duration::ZERO, Budget::wait_time)
    }

    /// Refills every budget.
    pub fn reset(&mut self) {
        for budget in self.buckets.values_mut() {
            budget.available = budget.capacity;
            budget.updated = Instant::now();
        }
    }
}
