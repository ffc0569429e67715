//! Fixed-window request counters.
//!
//! Each key gets a window that opens on its first request and lasts
//! `window_ms`. Within the window at most `max_requests` calls are allowed;
//! the first call after the window closes opens a new one.

use std::collections::HashMap;
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::debug;

/// Window size and capacity of a [`RateLimiter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitSettings {
    pub max_requests: u32,
    pub window_ms: u64,
}

impl RateLimitSettings {
    pub const fn new(max_requests: u32, window_ms: u64) -> Self {
        Self {
            max_requests,
            window_ms,
        }
    }

    /// 60 requests per minute.
    pub const fn per_user() -> Self {
        Self::new(60, 60_000)
    }

    /// 1000 requests per minute.
    pub const fn per_customer() -> Self {
        Self::new(1000, 60_000)
    }

    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }
}

/// Settings for the two limiters the orchestrator owns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimits {
    /// Keyed by acting user id.
    pub user: RateLimitSettings,
    /// Keyed by customer id.
    pub customer: RateLimitSettings,
}

impl Default for RateLimits {
    fn default() -> Self {
        Self {
            user: RateLimitSettings::per_user(),
            customer: RateLimitSettings::per_customer(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Window {
    count: u32,
    reset_at: Instant,
}

/// In-memory fixed-window rate limiter.
///
/// Uses [`tokio::time::Instant`], so tests can drive it with
/// `tokio::time::pause` / `advance`.
#[derive(Debug)]
pub struct RateLimiter {
    settings: RateLimitSettings,
    windows: Mutex<HashMap<String, Window>>,
}

impl RateLimiter {
    pub fn new(settings: RateLimitSettings) -> Self {
        Self {
            settings,
            windows: Mutex::new(HashMap::new()),
        }
    }

    pub fn settings(&self) -> RateLimitSettings {
        self.settings
    }

    /// Counts one request for `key`; returns `false` when the window is full.
    pub fn is_allowed(&self, key: &str) -> bool {
        let now = Instant::now();
        let mut windows = self.windows.lock();

        match windows.get_mut(key) {
            Some(window) if now < window.reset_at => {
                if window.count >= self.settings.max_requests {
                    debug!(key = %key, "Rate limit exceeded");
                    return false;
                }
                window.count += 1;
                true
            }
            _ => {
                windows.insert(
                    key.to_string(),
                    Window {
                        count: 1,
                        reset_at: now + self.settings.window(),
                    },
                );
                true
            }
        }
    }

    /// Requests left in the current window of `key`.
    pub fn remaining(&self, key: &str) -> u32 {
        let now = Instant::now();
        match self.windows.lock().get(key) {
            Some(window) if now < window.reset_at => {
                self.settings.max_requests.saturating_sub(window.count)
            }
            _ => self.settings.max_requests,
        }
    }

    /// Time until the window of `key` closes; zero when no window is open.
    pub fn reset_in(&self, key: &str) -> Duration {
        let now = Instant::now();
        match self.windows.lock().get(key) {
            Some(window) if now < window.reset_at => window.reset_at - now,
            _ => Duration::ZERO,
        }
    }

    /// Forgets the window of `key`.
    pub fn reset(&self, key: &str) {
        self.windows.lock().remove(key);
    }

    /// Drops every closed window and returns how many were removed.
    pub fn cleanup(&self) -> usize {
        let now = Instant::now();
        let mut windows = self.windows.lock();
        let before = windows.len();
        windows.retain(|_, window| now < window.reset_at);
        before - windows.len()
    }

    /// Number of tracked keys.
    pub fn tracked(&self) -> usize {
        self.windows.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_window_blocks_then_reopens() {
        let limiter = RateLimiter::new(RateLimitSettings::new(3, 1_000));

        for _ in 0..3 {
            assert!(limiter.is_allowed("u1"));
        }
        assert!(!limiter.is_allowed("u1"));
        assert_eq!(limiter.remaining("u1"), 0);
        assert!(limiter.is_allowed("u2"));

        tokio::time::advance(Duration::from_millis(999)).await;
        assert!(!limiter.is_allowed("u1"));

        tokio::time::advance(Duration::from_millis(1)).await;
        assert!(limiter.is_allowed("u1"));
        assert_eq!(limiter.remaining("u1"), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_in_and_cleanup() {
        let limiter = RateLimiter::new(RateLimitSettings::new(10, 60_000));
        assert_eq!(limiter.reset_in("u1"), Duration::ZERO);

        limiter.is_allowed("u1");
        tokio::time::advance(Duration::from_secs(20)).await;
        limiter.is_allowed("u2");
        assert_eq!(limiter.reset_in("u1"), Duration::from_secs(40));

        tokio::time::advance(Duration::from_secs(40)).await;
        assert_eq!(limiter.cleanup(), 1);
        assert_eq!(limiter.tracked(), 1);
    }

    #[test]
    fn test_reset_clears_key() {
        let limiter = RateLimiter::new(RateLimitSettings::new(1, 60_000));
        assert!(limiter.is_allowed("u1"));
        assert!(!limiter.is_allowed("u1"));
        limiter.reset("u1");
        assert!(limiter.is_allowed("u1"));
    }

    #[test]
    fn test_default_limits() {
        let limits: RateLimits =
            serde_json::from_str(r#"{ "user": { "max_requests": 5, "window_ms": 10 } }"#)
                .unwrap();
        assert_eq!(limits.user, RateLimitSettings::new(5, 10));
        assert_eq!(limits.customer, RateLimitSettings::per_customer());
    }
}
