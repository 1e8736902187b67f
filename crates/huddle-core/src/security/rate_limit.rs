use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::clock::Clock;
use crate::config::RateLimitPolicy;

/// Per-key attempt history over a fixed window.
///
/// Admission is `attempts within window < max_attempts`. Recording always
/// appends; callers check, then record. State is in memory only.
pub struct RateLimiter {
    policy: RateLimitPolicy,
    clock: Arc<dyn Clock>,
    attempts: Mutex<HashMap<String, VecDeque<u64>>>,
}

impl RateLimiter {
    pub fn new(policy: RateLimitPolicy, clock: Arc<dyn Clock>) -> Self {
        Self {
            policy,
            clock,
            attempts: Mutex::new(HashMap::new()),
        }
    }

    pub fn can_attempt(&self, key: &str) -> bool {
        let now = self.clock.now_millis();
        let mut attempts = self.attempts.lock();
        let Some(history) = attempts.get_mut(key) else {
            return self.policy.max_attempts > 0;
        };
        while let Some(&oldest) = history.front() {
            if now.saturating_sub(oldest) >= self.policy.window_ms {
                history.pop_front();
            } else {
                break;
            }
        }
        let allowed = history.len() < self.policy.max_attempts;
        if history.is_empty() {
            attempts.remove(key);
        }
        allowed
    }

    pub fn record_attempt(&self, key: &str) {
        let now = self.clock.now_millis();
        self.attempts
            .lock()
            .entry(key.to_string())
            .or_default()
            .push_back(now);
    }

    pub fn reset(&self, key: &str) {
        self.attempts.lock().remove(key);
    }
}
