//! Login attempt throttling.
//!
//! Counts failed login attempts per client key in a fixed window that starts
//! at the first failure. State is process-local and never persisted; a
//! restart clears all counters.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// Throttle policy: how many failures in a window trip the block.
#[derive(Debug, Clone)]
pub struct ThrottlePolicy {
    /// Failures allowed before the key is blocked.
    pub max_failures: u32,
    /// Length of the counting window, measured from the first failure.
    pub window: Duration,
}

impl Default for ThrottlePolicy {
    fn default() -> Self {
        Self {
            max_failures: 3,
            window: Duration::from_secs(60),
        }
    }
}

impl ThrottlePolicy {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn max_failures(mut self, max: u32) -> Self {
        self.max_failures = max;
        self
    }

    #[must_use]
    pub fn window(mut self, window: Duration) -> Self {
        self.window = window;
        self
    }
}

#[derive(Debug, Clone, Copy)]
struct Attempt {
    count: u32,
    window_start: Instant,
}

/// In-memory per-key failure counter.
///
/// A failure recorded after the window expired resets the counter to 1 and
/// starts a new window. Updates to a single key are atomic under the map
/// lock. The throttle never fails: if the lock is poisoned the counters are
/// still served from the recovered state.
pub struct LoginThrottle {
    policy: ThrottlePolicy,
    attempts: Mutex<HashMap<String, Attempt>>,
}

impl LoginThrottle {
    pub fn new(policy: ThrottlePolicy) -> Self {
        Self {
            policy,
            attempts: Mutex::new(HashMap::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Attempt>> {
        self.attempts
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Record a failed attempt for `key`.
    pub fn record_failure(&self, key: &str) {
        self.record_failure_at(key, Instant::now());
    }

    fn record_failure_at(&self, key: &str, now: Instant) {
        let mut attempts = self.lock();
        let entry = attempts.entry(key.to_string()).or_insert(Attempt {
            count: 0,
            window_start: now,
        });

        if now.duration_since(entry.window_start) >= self.policy.window {
            entry.count = 1;
            entry.window_start = now;
        } else {
            entry.count += 1;
        }

        if entry.count >= self.policy.max_failures {
            tracing::warn!(
                target: "accounts.throttle.blocked",
                key = %key,
                count = entry.count,
                "login throttle tripped"
            );
        }
    }

    /// Whether `key` is currently blocked.
    pub fn is_blocked(&self, key: &str) -> bool {
        self.is_blocked_at(key, Instant::now())
    }

    fn is_blocked_at(&self, key: &str, now: Instant) -> bool {
        let attempts = self.lock();
        match attempts.get(key) {
            Some(entry) => {
                entry.count >= self.policy.max_failures
                    && now.duration_since(entry.window_start) < self.policy.window
            }
            None => false,
        }
    }

    /// Drop entries whose window has expired. Callers run this periodically
    /// to keep the map from growing with one-off keys.
    pub fn purge_expired(&self) {
        self.purge_expired_at(Instant::now());
    }

    fn purge_expired_at(&self, now: Instant) {
        let mut attempts = self.lock();
        attempts.retain(|_, entry| now.duration_since(entry.window_start) < self.policy.window);
    }

    #[cfg(test)]
    fn tracked_keys(&self) -> usize {
        self.lock().len()
    }
}

impl Default for LoginThrottle {
    fn default() -> Self {
        Self::new(ThrottlePolicy::default())
    }
}
