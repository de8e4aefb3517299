//! Throttling for one-time code sign-in
//!
//! Two independent limits:
//! - wrong codes per email within a sliding window (the code is revoked once
//!   the limit is hit, and verification stays locked until the window passes)
//! - sign-in requests per client IP per minute

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::net::IpAddr;
use tokio::sync::RwLock;

/// Sign-in requests one IP may make per minute
pub const IP_REQUESTS_PER_MINUTE: usize = 10;

/// Seconds a throttled IP is told to wait
pub const IP_RETRY_AFTER_SECS: i64 = 60;

pub struct SignInLimiter {
    failures: RwLock<HashMap<String, Vec<DateTime<Utc>>>>,
    requests: RwLock<HashMap<IpAddr, Vec<DateTime<Utc>>>>,
    max_failures: usize,
    failure_window: Duration,
}

impl SignInLimiter {
    pub fn new(max_failures: usize, failure_window: Duration) -> Self {
        Self {
            failures: RwLock::new(HashMap::new()),
            requests: RwLock::new(HashMap::new()),
            max_failures: max_failures.max(1),
            failure_window,
        }
    }

    pub fn max_failures(&self) -> usize {
        self.max_failures
    }

    pub fn failure_window(&self) -> Duration {
        self.failure_window
    }

    /// Whether verification for `email` is locked out
    pub async fn is_locked(&self, email: &str) -> bool {
        let cutoff = Utc::now() - self.failure_window;
        let mut failures = self.failures.write().await;
        match failures.get_mut(email) {
            Some(times) => {
                times.retain(|at| *at > cutoff);
                times.len() >= self.max_failures
            }
            None => false,
        }
    }

    /// Count a wrong code, returning the failures now inside the window
    pub async fn record_failure(&self, email: &str) -> usize {
        let now = Utc::now();
        let cutoff = now - self.failure_window;
        let mut failures = self.failures.write().await;
        let times = failures.entry(email.to_string()).or_default();
        times.retain(|at| *at > cutoff);
        times.push(now);
        times.len()
    }

    /// Forget failures after a successful sign-in
    pub async fn clear(&self, email: &str) {
        self.failures.write().await.remove(email);
    }

    /// Count a request from `ip`, returning false once it is over the limit
    pub async fn allow_request(&self, ip: IpAddr) -> bool {
        let now = Utc::now();
        let cutoff = now - Duration::minutes(1);
        let mut requests = self.requests.write().await;
        let times = requests.entry(ip).or_default();
        times.retain(|at| *at > cutoff);
        if times.len() >= IP_REQUESTS_PER_MINUTE {
            return false;
        }
        times.push(now);
        true
    }

    /// Drop entries that fell out of their windows
    pub async fn cleanup(&self) {
        let now = Utc::now();

        let failure_cutoff = now - self.failure_window;
        self.failures.write().await.retain(|_, times| {
            times.retain(|at| *at > failure_cutoff);
            !times.is_empty()
        });

        let request_cutoff = now - Duration::minutes(1);
        self.requests.write().await.retain(|_, times| {
            times.retain(|at| *at > request_cutoff);
            !times.is_empty()
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_locks_after_max_failures() {
        let limiter = SignInLimiter::new(3, Duration::minutes(15));

        assert_eq!(limiter.record_failure("desk@news.test").await, 1);
        assert_eq!(limiter.record_failure("desk@news.test").await, 2);
        assert!(!limiter.is_locked("desk@news.test").await);

        assert_eq!(limiter.record_failure("desk@news.test").await, 3);
        assert!(limiter.is_locked("desk@news.test").await);
        assert!(!limiter.is_locked("other@news.test").await);

        limiter.clear("desk@news.test").await;
        assert!(!limiter.is_locked("desk@news.test").await);
    }

    #[tokio::test]
    async fn test_failures_expire_with_window() {
        let limiter = SignInLimiter::new(1, Duration::minutes(15));
        limiter
            .failures
            .write()
            .await
            .insert("desk@news.test".to_string(), vec![Utc::now() - Duration::minutes(16)]);

        assert!(!limiter.is_locked("desk@news.test").await);
        limiter.cleanup().await;
        assert!(limiter.failures.read().await.is_empty());
    }

    #[tokio::test]
    async fn test_ip_limit() {
        let limiter = SignInLimiter::new(5, Duration::minutes(15));
        let ip: IpAddr = "203.0.113.7".parse().unwrap();
        let other: IpAddr = "203.0.113.8".parse().unwrap();

        for _ in 0..IP_REQUESTS_PER_MINUTE {
            assert!(limiter.allow_request(ip).await);
        }
        assert!(!limiter.allow_request(ip).await);
        assert!(limiter.allow_request(other).await);
    }
}
