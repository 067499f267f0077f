// Per-tenant sliding-window request counter.
//
// The bucket map is the only mutable shared state in this crate. It is an
// explicit injected object (not module-level state) so a distributed store
// can replace it without touching call sites. The write lock doubles as the
// per-key guard the increment-then-compare sequence needs on a
// multi-threaded runtime.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;

use crate::config::RateLimitPolicyConfig;

/// One counting window for a key. Replaced, not mutated, when the window
/// rolls over.
#[derive(Debug, Clone, Copy)]
pub struct RateLimitBucket {
    pub count: u32,
    pub reset_at: DateTime<Utc>,
}

/// Outcome of a single check, carrying everything the response layer needs
/// for the `X-RateLimit-*` headers and the 429 body.
#[derive(Debug, Clone, Copy)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,
    pub reset_at: DateTime<Utc>,
    pub retry_after_secs: u64,
    pub window: Duration,
}

/// Policy-agnostic per-key limiter. Key is the tenant id by convention.
pub struct TenantRateLimiter {
    max_requests: u32,
    window: Duration,
    buckets: Arc<RwLock<HashMap<String, RateLimitBucket>>>,
}

impl TenantRateLimiter {
    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            max_requests,
            window,
            buckets: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn from_policy(policy: &RateLimitPolicyConfig) -> Self {
        Self::new(policy.max_requests, policy.window())
    }

    pub fn limit(&self) -> u32 {
        self.max_requests
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Count one request against the key.
    pub async fn check(&self, key: &str) -> RateLimitDecision {
        self.check_at(key, Utc::now()).await
    }

    /// Clock-injected variant; `check` delegates here.
    pub async fn check_at(&self, key: &str, now: DateTime<Utc>) -> RateLimitDecision {
        let window_chrono = ChronoDuration::from_std(self.window)
            .unwrap_or_else(|_| ChronoDuration::seconds(60));

        let mut buckets = self.buckets.write().await;

        let bucket = match buckets.get(key).copied() {
            Some(b) if now < b.reset_at => {
                let replaced = RateLimitBucket { count: b.count + 1, reset_at: b.reset_at };
                buckets.insert(key.to_string(), replaced);
                replaced
            }
            // No bucket yet, or the window has passed: start a fresh one
            _ => {
                let fresh = RateLimitBucket { count: 1, reset_at: now + window_chrono };
                buckets.insert(key.to_string(), fresh);
                fresh
            }
        };

        let allowed = bucket.count <= self.max_requests;
        let remaining = self.max_requests.saturating_sub(bucket.count);
        let retry_after_secs = if allowed {
            0
        } else {
            // Round up so clients never retry inside the closed window
            let millis = (bucket.reset_at - now).num_milliseconds().max(0) as u64;
            millis.div_ceil(1000)
        };

        if !allowed {
            tracing::warn!(
                "Rate limit exceeded for key '{}': {}/{} in window",
                key,
                bucket.count,
                self.max_requests
            );
        }

        RateLimitDecision {
            allowed,
            limit: self.max_requests,
            remaining,
            reset_at: bucket.reset_at,
            retry_after_secs,
            window: self.window,
        }
    }

    /// Drop buckets whose window has passed, bounding memory.
    pub async fn sweep(&self) -> usize {
        self.sweep_at(Utc::now()).await
    }

    pub async fn sweep_at(&self, now: DateTime<Utc>) -> usize {
        let mut buckets = self.buckets.write().await;
        let before = buckets.len();
        buckets.retain(|_, b| b.reset_at > now);
        before - buckets.len()
    }

    /// Number of live buckets; used by tests and ops introspection.
    pub async fn bucket_count(&self) -> usize {
        self.buckets.read().await.len()
    }
}

/// Spawn the periodic bucket eviction task. The sweep only deletes buckets
/// that are already semantically expired, so it needs no coordination with
/// in-flight requests.
pub fn spawn_sweeper(limiter: Arc<TenantRateLimiter>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            interval.tick().await;
            let evicted = limiter.sweep().await;
            if evicted > 0 {
                tracing::debug!("Rate limit sweep evicted {} expired buckets", evicted);
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter(max: u32, window_secs: u64) -> TenantRateLimiter {
        TenantRateLimiter::new(max, Duration::from_secs(window_secs))
    }

    #[tokio::test]
    async fn allows_until_limit_then_denies() {
        let rl = limiter(3, 60);
        let now = Utc::now();

        for i in 0..3 {
            let d = rl.check_at("tenant-a", now).await;
            assert!(d.allowed, "request {} should pass", i + 1);
        }
        let d = rl.check_at("tenant-a", now).await;
        assert!(!d.allowed);
        assert_eq!(d.remaining, 0);
        assert!(d.retry_after_secs > 0 && d.retry_after_secs <= 60);
    }

    #[tokio::test]
    async fn window_reset_reopens_the_key() {
        let rl = limiter(2, 60);
        let now = Utc::now();

        rl.check_at("t", now).await;
        rl.check_at("t", now).await;
        assert!(!rl.check_at("t", now).await.allowed);

        // Move past the window boundary: bucket is replaced, not carried over
        let later = now + ChronoDuration::seconds(61);
        let d = rl.check_at("t", later).await;
        assert!(d.allowed);
        assert_eq!(d.remaining, rl.limit() - 1);
    }

    #[tokio::test]
    async fn keys_are_independent() {
        let rl = limiter(1, 60);
        let now = Utc::now();

        assert!(rl.check_at("a", now).await.allowed);
        assert!(!rl.check_at("a", now).await.allowed);
        assert!(rl.check_at("b", now).await.allowed);
    }

    #[tokio::test]
    async fn retry_after_rounds_up() {
        let rl = limiter(1, 30);
        let now = Utc::now();
        rl.check_at("t", now).await;

        let half_second_later = now + ChronoDuration::milliseconds(500);
        let d = rl.check_at("t", half_second_later).await;
        assert!(!d.allowed);
        // 29.5s left in window rounds to 30, never 29
        assert_eq!(d.retry_after_secs, 30);
    }

    #[tokio::test]
    async fn sweep_evicts_only_expired_buckets() {
        let rl = limiter(5, 60);
        let now = Utc::now();
        rl.check_at("old", now).await;
        rl.check_at("fresh", now + ChronoDuration::seconds(30)).await;
        assert_eq!(rl.bucket_count().await, 2);

        let evicted = rl.sweep_at(now + ChronoDuration::seconds(61)).await;
        assert_eq!(evicted, 1);
        assert_eq!(rl.bucket_count().await, 1);
    }
}
