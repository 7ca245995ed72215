//! Rate limiting for repetitive error logs.
//!
//! When the fast store goes down every telemetry push and every allocation
//! hits the same connection error. [`LogThrottle`] lets a caller log each
//! distinct error at most once per window. It is plain injected state, so
//! tests construct a fresh one instead of sharing a process-wide map.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Default window between two logs of the same fingerprint.
pub const DEFAULT_LOG_THROTTLE: Duration = Duration::from_secs(60);

/// TTL map from error fingerprint to the last time it was logged.
#[derive(Debug)]
pub struct LogThrottle {
    window: Duration,
    last_logged: Mutex<HashMap<String, Instant>>,
}

impl Default for LogThrottle {
    fn default() -> Self {
        Self::new(DEFAULT_LOG_THROTTLE)
    }
}

impl LogThrottle {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last_logged: Mutex::new(HashMap::new()),
        }
    }

    /// Returns `true` (and records the time) when `fingerprint` has not been
    /// logged within the window.
    pub fn should_log(&self, fingerprint: &str) -> bool {
        let now = Instant::now();
        let mut map = self
            .last_logged
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        // Expired entries are dropped so the map only holds live fingerprints.
        map.retain(|_, at| now.duration_since(*at) < self.window);

        if map.contains_key(fingerprint) {
            return false;
        }
        map.insert(fingerprint.to_string(), now);
        true
    }

    /// Forget every fingerprint.
    pub fn reset(&self) {
        self.last_logged
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clear();
    }

    /// Number of fingerprints currently suppressed.
    pub fn tracked(&self) -> usize {
        self.last_logged
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }
}

/// Fingerprint for an error raised in a given context.
pub fn fingerprint(context: &str, error: &impl std::fmt::Display) -> String {
    format!("{context}:{error}")
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_occurrence_is_logged_then_suppressed() {
        let throttle = LogThrottle::default();
        assert!(throttle.should_log("redis:connection refused"));
        assert!(!throttle.should_log("redis:connection refused"));
        assert_eq!(throttle.tracked(), 1);
    }

    #[test]
    fn distinct_fingerprints_are_independent() {
        let throttle = LogThrottle::default();
        assert!(throttle.should_log("a"));
        assert!(throttle.should_log("b"));
        assert!(!throttle.should_log("a"));
    }

    #[test]
    fn reset_allows_logging_again() {
        let throttle = LogThrottle::default();
        assert!(throttle.should_log("a"));
        throttle.reset();
        assert_eq!(throttle.tracked(), 0);
        assert!(throttle.should_log("a"));
    }

    #[test]
    fn zero_window_never_suppresses() {
        let throttle = LogThrottle::new(Duration::ZERO);
        assert!(throttle.should_log("a"));
        assert!(throttle.should_log("a"));
    }

    #[test]
    fn entries_expire_after_window() {
        let throttle = LogThrottle::new(Duration::from_millis(20));
        assert!(throttle.should_log("a"));
        std::thread::sleep(Duration::from_millis(40));
        assert!(throttle.should_log("a"));
    }

    #[test]
    fn fingerprint_combines_context_and_error() {
        assert_eq!(fingerprint("cache.write", &"timeout"), "cache.write:timeout");
    }
}
