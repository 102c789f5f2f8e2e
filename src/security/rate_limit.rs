use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, PoisonError};

use crate::config::RateLimitConfig;
use crate::error::{PaygateError, Result};
use crate::utils::clock::Clock;

/// Sliding-window rate limiter. Per-key (tenant) request tracking.
pub struct SlidingWindowRateLimiter {
    max_requests: u32,
    window_ms: i64,
    clock: Arc<dyn Clock>,
    entries: Mutex<HashMap<String, VecDeque<i64>>>,
}

impl SlidingWindowRateLimiter {
    pub fn new(config: RateLimitConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            max_requests: config.max_requests,
            window_ms: config.window_ms as i64,
            clock,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Returns true if the request is allowed, false if rate-limited.
    /// Only admitted requests are recorded.
    pub fn is_allowed(&self, key: &str) -> bool {
        let now = self.clock.now_millis();
        let cutoff = now - self.window_ms;
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);

        let timestamps = entries.entry(key.to_string()).or_default();

        // Remove expired entries
        while timestamps.front().is_some_and(|&t| t <= cutoff) {
            timestamps.pop_front();
        }

        if timestamps.len() >= self.max_requests as usize {
            return false;
        }

        timestamps.push_back(now);
        true
    }

    /// Like [`is_allowed`](Self::is_allowed) but as a `Result` for `?` chains.
    pub fn check(&self, key: &str) -> Result<()> {
        if self.is_allowed(key) {
            Ok(())
        } else {
            Err(PaygateError::RateLimited {
                key: key.to_string(),
            })
        }
    }

    /// Requests still admissible for `key` in the current window.
    pub fn remaining(&self, key: &str) -> u32 {
        let cutoff = self.clock.now_millis() - self.window_ms;
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let live = entries
            .get(key)
            .map(|timestamps| timestamps.iter().filter(|&&t| t > cutoff).count())
            .unwrap_or(0);
        self.max_requests.saturating_sub(live as u32)
    }

    pub fn reset(&self, key: &str) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
    }

    /// Remove keys with no active timestamps (call periodically).
    pub fn sweep(&self) {
        let cutoff = self.clock.now_millis() - self.window_ms;
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);

        entries.retain(|_, timestamps| {
            while timestamps.front().is_some_and(|&t| t <= cutoff) {
                timestamps.pop_front();
            }
            !timestamps.is_empty()
        });
    }

    /// Number of tracked keys.
    pub fn entry_count(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

/// Per-tenant limits for webhook ingress and outbound gateway calls.
pub struct TenantRateLimiter {
    ingress: SlidingWindowRateLimiter,
    outbound: SlidingWindowRateLimiter,
}

impl TenantRateLimiter {
    pub fn new(
        ingress: RateLimitConfig,
        outbound: RateLimitConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            ingress: SlidingWindowRateLimiter::new(ingress, clock.clone()),
            outbound: SlidingWindowRateLimiter::new(outbound, clock),
        }
    }

    pub fn check_ingress(&self, tenant: &str) -> Result<()> {
        self.ingress.check(tenant)
    }

    pub fn check_outbound(&self, tenant: &str) -> Result<()> {
        self.outbound.check(tenant)
    }

    pub fn ingress(&self) -> &SlidingWindowRateLimiter {
        &self.ingress
    }

    pub fn outbound(&self) -> &SlidingWindowRateLimiter {
        &self.outbound
    }

    pub fn sweep(&self) {
        self.ingress.sweep();
        self.outbound.sweep();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::clock::ManualClock;

    fn limiter(max_requests: u32, window_ms: u64) -> (SlidingWindowRateLimiter, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::starting_now());
        let limiter = SlidingWindowRateLimiter::new(
            RateLimitConfig {
                max_requests,
                window_ms,
            },
            clock.clone(),
        );
        (limiter, clock)
    }

    #[test]
    fn test_default_config() {
        let cfg = RateLimitConfig::default();
        assert_eq!(cfg.max_requests, 100);
        assert_eq!(cfg.window_ms, 60_000);
    }

    #[test]
    fn test_window_admits_again_after_expiry() {
        let (limiter, clock) = limiter(2, 1000);
        assert!(limiter.is_allowed("tenant"));
        assert!(limiter.is_allowed("tenant"));
        assert!(!limiter.is_allowed("tenant"));
        clock.advance_millis(1001);
        assert!(limiter.is_allowed("tenant"));
    }

    #[test]
    fn test_boundary_is_exclusive() {
        let (limiter, clock) = limiter(1, 1000);
        assert!(limiter.is_allowed("k"));
        clock.advance_millis(999);
        assert!(!limiter.is_allowed("k"));
        clock.advance_millis(1);
        assert!(limiter.is_allowed("k"));
    }

    #[test]
    fn test_keys_independent() {
        let (limiter, _) = limiter(1, 60_000);
        assert!(limiter.is_allowed("a"));
        assert!(limiter.is_allowed("b"));
        assert!(!limiter.is_allowed("a"));
    }

    #[test]
    fn test_rejections_are_not_recorded() {
        let (limiter, clock) = limiter(1, 1000);
        assert!(limiter.is_allowed("k"));
        clock.advance_millis(500);
        assert!(!limiter.is_allowed("k"));
        clock.advance_millis(501);
        // Only the first admitted request counted.
        assert!(limiter.is_allowed("k"));
    }

    #[test]
    fn test_zero_limit_blocks_everything() {
        let (limiter, _) = limiter(0, 1000);
        assert!(!limiter.is_allowed("k"));
        assert_eq!(limiter.remaining("k"), 0);
    }

    #[test]
    fn test_remaining_and_reset() {
        let (limiter, _) = limiter(3, 60_000);
        assert_eq!(limiter.remaining("k"), 3);
        limiter.is_allowed("k");
        limiter.is_allowed("k");
        assert_eq!(limiter.remaining("k"), 1);
        limiter.reset("k");
        assert_eq!(limiter.remaining("k"), 3);
    }

    #[test]
    fn test_check_returns_rate_limited() {
        let (limiter, _) = limiter(1, 60_000);
        assert!(limiter.check("acme").is_ok());
        match limiter.check("acme") {
            Err(PaygateError::RateLimited { key }) => assert_eq!(key, "acme"),
            other => panic!("expected RateLimited, got {:?}", other),
        }
    }

    #[test]
    fn test_sweep_clears_stale_keys() {
        let (limiter, clock) = limiter(5, 10);
        limiter.is_allowed("a");
        limiter.is_allowed("b");
        clock.advance_millis(20);
        limiter.sweep();
        assert_eq!(limiter.entry_count(), 0);
    }

    #[test]
    fn test_tenant_rate_limiter_separate_limits() {
        let clock: Arc<dyn Clock> = Arc::new(ManualClock::starting_now());
        let trl = TenantRateLimiter::new(
            RateLimitConfig {
                max_requests: 1,
                window_ms: 60_000,
            },
            RateLimitConfig {
                max_requests: 2,
                window_ms: 60_000,
            },
            clock,
        );
        assert!(trl.check_ingress("t").is_ok());
        assert!(trl.check_ingress("t").is_err());
        assert!(trl.check_outbound("t").is_ok());
        assert!(trl.check_outbound("t").is_ok());
        assert!(trl.check_outbound("t").is_err());
    }
}
