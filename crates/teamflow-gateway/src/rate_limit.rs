use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::debug;

struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

/// Token bucket rate limiter keyed by client (accepted API key or peer
/// address).
pub struct RateLimiter {
    max_tokens: f64,
    refill_rate: f64, // tokens per second
    buckets: Mutex<HashMap<String, Bucket>>,
}

impl RateLimiter {
    /// - `max_tokens`: burst size
    /// - `refill_rate`: tokens added per second
    pub fn new(max_tokens: f64, refill_rate: f64) -> Self {
        Self {
            max_tokens,
            refill_rate,
            buckets: Mutex::new(HashMap::new()),
        }
    }

    /// Try to take one token for `client`. `false` means rate limited.
    pub async fn check(&self, client: &str) -> bool {
        let mut buckets = self.buckets.lock().await;
        let now = Instant::now();

        let bucket = buckets.entry(client.to_string()).or_insert(Bucket {
            tokens: self.max_tokens,
            last_refill: now,
        });

        let elapsed = now.duration_since(bucket.last_refill);
        bucket.tokens =
            (bucket.tokens + elapsed.as_secs_f64() * self.refill_rate).min(self.max_tokens);
        bucket.last_refill = now;

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Drop buckets idle for at least `max_idle`.
    pub async fn cleanup(&self, max_idle: Duration) -> usize {
        let mut buckets = self.buckets.lock().await;
        let before = buckets.len();
        let now = Instant::now();
        buckets.retain(|_, b| now.duration_since(b.last_refill) < max_idle);
        before - buckets.len()
    }

    /// Run [`cleanup`](Self::cleanup) every `every`, dropping buckets idle
    /// for `max_idle`.
    pub fn spawn_cleanup(self: &Arc<Self>, every: Duration, max_idle: Duration) -> JoinHandle<()> {
        let limiter = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let dropped = limiter.cleanup(max_idle).await;
                if dropped > 0 {
                    debug!(dropped, "Dropped idle rate limit buckets");
                }
            }
        })
    }

    /// Number of live buckets.
    pub async fn bucket_count(&self) -> usize {
        self.buckets.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_rate_limiter_allows_burst() {
        let limiter = RateLimiter::new(5.0, 1.0);
        for _ in 0..5 {
            assert!(limiter.check("key-a").await);
        }
    }

    #[tokio::test]
    async fn test_rate_limiter_blocks_per_client() {
        let limiter = RateLimiter::new(2.0, 0.1);
        assert!(limiter.check("key-a").await);
        assert!(limiter.check("key-a").await);
        assert!(!limiter.check("key-a").await);
        // other clients have their own bucket
        assert!(limiter.check("key-b").await);
    }

    #[tokio::test]
    async fn test_cleanup_drops_idle_buckets() {
        let limiter = RateLimiter::new(2.0, 1.0);
        limiter.check("key-a").await;
        assert_eq!(limiter.cleanup(Duration::from_secs(60)).await, 0);
        assert_eq!(limiter.cleanup(Duration::ZERO).await, 1);
    }

    #[tokio::test]
    async fn test_spawned_cleanup_bounds_buckets() {
        let limiter = Arc::new(RateLimiter::new(2.0, 1.0));
        for i in 0..20 {
            limiter.check(&format!("ip:10.0.0.{i}")).await;
        }
        assert_eq!(limiter.bucket_count().await, 20);

        let handle = limiter.spawn_cleanup(Duration::from_millis(10), Duration::ZERO);
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(limiter.bucket_count().await, 0);
        handle.abort();
    }
}
