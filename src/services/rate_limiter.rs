//! Request throttling and login brute-force protection
//!
//! Both are built on [`SlidingWindowLimiter`], which keeps the timestamps
//! of recent hits per key in memory. Limits are per process.

use chrono::{DateTime, Duration, Utc};
use std::collections::{HashMap, VecDeque};
use std::net::IpAddr;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::config::ThrottleConfig;

/// Outcome of a rate limit check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    Allowed { remaining: u32 },
    Limited { retry_after: std::time::Duration },
}

impl RateDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, RateDecision::Allowed { .. })
    }
}

/// Sliding window counter keyed by string
pub struct SlidingWindowLimiter {
    limit: u32,
    window: Duration,
    hits: RwLock<HashMap<String, VecDeque<DateTime<Utc>>>>,
}

impl SlidingWindowLimiter {
    pub fn new(limit: u32, window: Duration) -> Self {
        Self {
            limit,
            window,
            hits: RwLock::new(HashMap::new()),
        }
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    /// Check the key and record a hit if it is allowed
    pub async fn check(&self, key: &str) -> RateDecision {
        self.check_at(key, Utc::now()).await
    }

    async fn check_at(&self, key: &str, now: DateTime<Utc>) -> RateDecision {
        let mut hits = self.hits.write().await;
        let times = hits.entry(key.to_string()).or_default();
        self.prune(times, now);

        if let Some(retry_after) = self.retry_after(times, now) {
            return RateDecision::Limited { retry_after };
        }

        times.push_back(now);
        RateDecision::Allowed {
            remaining: self.limit.saturating_sub(times.len() as u32),
        }
    }

    /// Inspect the key without recording anything
    pub async fn peek(&self, key: &str) -> RateDecision {
        let now = Utc::now();
        let hits = self.hits.read().await;
        let Some(times) = hits.get(key) else {
            return RateDecision::Allowed {
                remaining: self.limit,
            };
        };

        let live: VecDeque<DateTime<Utc>> = times
            .iter()
            .copied()
            .filter(|t| *t > now - self.window)
            .collect();
        match self.retry_after(&live, now) {
            Some(retry_after) => RateDecision::Limited { retry_after },
            None => RateDecision::Allowed {
                remaining: self.limit.saturating_sub(live.len() as u32),
            },
        }
    }

    /// Record a hit unconditionally
    pub async fn record(&self, key: &str) {
        let now = Utc::now();
        let mut hits = self.hits.write().await;
        let times = hits.entry(key.to_string()).or_default();
        self.prune(times, now);
        times.push_back(now);
    }

    pub async fn reset(&self, key: &str) {
        self.hits.write().await.remove(key);
    }

    /// Drop hits older than the window and forget keys left empty
    pub async fn cleanup(&self) {
        let now = Utc::now();
        let mut hits = self.hits.write().await;
        hits.retain(|_, times| {
            self.prune(times, now);
            !times.is_empty()
        });
    }

    pub async fn tracked_keys(&self) -> usize {
        self.hits.read().await.len()
    }

    fn prune(&self, times: &mut VecDeque<DateTime<Utc>>, now: DateTime<Utc>) {
        let cutoff = now - self.window;
        while times.front().is_some_and(|t| *t <= cutoff) {
            times.pop_front();
        }
    }

    fn retry_after(
        &self,
        times: &VecDeque<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Option<std::time::Duration> {
        if (times.len() as u32) < self.limit {
            return None;
        }
        let oldest = times.front().copied().unwrap_or(now);
        let wait = (oldest + self.window - now)
            .to_std()
            .unwrap_or_default()
            .max(std::time::Duration::from_secs(1));
        Some(wait)
    }
}

/// Hourly request quota, separate for anonymous and authenticated callers
pub struct RequestThrottle {
    anonymous: SlidingWindowLimiter,
    authenticated: SlidingWindowLimiter,
}

impl RequestThrottle {
    pub fn new(anon_per_hour: u32, user_per_hour: u32) -> Self {
        Self {
            anonymous: SlidingWindowLimiter::new(anon_per_hour, Duration::hours(1)),
            authenticated: SlidingWindowLimiter::new(user_per_hour, Duration::hours(1)),
        }
    }

    pub fn from_config(config: &ThrottleConfig) -> Self {
        Self::new(config.anon_per_hour, config.user_per_hour)
    }

    pub async fn check_anonymous(&self, ip: IpAddr) -> RateDecision {
        self.anonymous.check(&format!("anon:{}", ip)).await
    }

    pub async fn check_user(&self, user_id: Uuid) -> RateDecision {
        self.authenticated.check(&format!("user:{}", user_id)).await
    }

    pub async fn cleanup(&self) {
        self.anonymous.cleanup().await;
        self.authenticated.cleanup().await;
    }
}

/// Failed login counter keyed by lowercased email
pub struct LoginRateLimiter {
    failures: SlidingWindowLimiter,
}

impl LoginRateLimiter {
    pub fn new(attempts: u32, window: Duration) -> Self {
        Self {
            failures: SlidingWindowLimiter::new(attempts, window),
        }
    }

    pub fn from_config(config: &ThrottleConfig) -> Self {
        Self::new(
            config.login_attempts,
            Duration::minutes(i64::from(config.login_window_minutes)),
        )
    }

    /// Returns how long to wait when the email is locked out
    pub async fn is_limited(&self, email: &str) -> Option<std::time::Duration> {
        match self.failures.peek(&email.to_lowercase()).await {
            RateDecision::Limited { retry_after } => Some(retry_after),
            RateDecision::Allowed { .. } => None,
        }
    }

    pub async fn record_failure(&self, email: &str) {
        self.failures.record(&email.to_lowercase()).await;
    }

    /// Forget failures after a successful login
    pub async fn clear(&self, email: &str) {
        self.failures.reset(&email.to_lowercase()).await;
    }

    pub async fn cleanup(&self) {
        self.failures.cleanup().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[tokio::test]
    async fn test_sliding_window_limits_and_counts_down() {
        let limiter = SlidingWindowLimiter::new(3, Duration::hours(1));

        assert_eq!(limiter.check("k").await, RateDecision::Allowed { remaining: 2 });
        assert_eq!(limiter.check("k").await, RateDecision::Allowed { remaining: 1 });
        assert_eq!(limiter.check("k").await, RateDecision::Allowed { remaining: 0 });

        match limiter.check("k").await {
            RateDecision::Limited { retry_after } => {
                assert!(retry_after.as_secs() > 3500 && retry_after.as_secs() <= 3600);
            }
            other => panic!("expected limit, got {:?}", other),
        }

        // Other keys are independent
        assert!(limiter.check("other").await.is_allowed());
    }

    #[tokio::test]
    async fn test_window_slides() {
        let limiter = SlidingWindowLimiter::new(2, Duration::minutes(10));
        let start = Utc::now();

        assert!(limiter.check_at("k", start).await.is_allowed());
        assert!(limiter.check_at("k", start + Duration::minutes(1)).await.is_allowed());
        assert!(!limiter.check_at("k", start + Duration::minutes(2)).await.is_allowed());

        // The first hit has left the window
        assert!(limiter.check_at("k", start + Duration::minutes(11)).await.is_allowed());
    }

    #[tokio::test]
    async fn test_cleanup_forgets_stale_keys() {
        let limiter = SlidingWindowLimiter::new(5, Duration::milliseconds(10));
        limiter.check("a").await;
        limiter.check("b").await;
        assert_eq!(limiter.tracked_keys().await, 2);

        tokio::time::sleep(std::time::Duration::from_millis(30)).await;
        limiter.cleanup().await;
        assert_eq!(limiter.tracked_keys().await, 0);
    }

    #[tokio::test]
    async fn test_throttle_separates_anonymous_and_users() {
        let throttle = RequestThrottle::new(1, 2);
        let ip = IpAddr::from_str("10.0.0.1").unwrap();
        let user = Uuid::new_v4();

        assert!(throttle.check_anonymous(ip).await.is_allowed());
        assert!(!throttle.check_anonymous(ip).await.is_allowed());

        assert!(throttle.check_user(user).await.is_allowed());
        assert!(throttle.check_user(user).await.is_allowed());
        assert!(!throttle.check_user(user).await.is_allowed());
    }

    #[tokio::test]
    async fn test_login_limiter_case_insensitive_and_clear() {
        let limiter = LoginRateLimiter::new(3, Duration::minutes(15));

        limiter.record_failure("Writer@Example.com").await;
        limiter.record_failure("writer@example.com").await;
        assert!(limiter.is_limited("WRITER@example.com").await.is_none());

        limiter.record_failure("writer@EXAMPLE.com").await;
        assert!(limiter.is_limited("writer@example.com").await.is_some());

        limiter.clear("Writer@Example.com").await;
        assert!(limiter.is_limited("writer@example.com").await.is_none());
    }

    #[tokio::test]
    async fn test_peek_does_not_record() {
        let limiter = SlidingWindowLimiter::new(1, Duration::hours(1));
        for _ in 0..5 {
            assert!(limiter.peek("k").await.is_allowed());
        }
        assert!(limiter.check("k").await.is_allowed());
        assert!(!limiter.peek("k").await.is_allowed());
    }
}
