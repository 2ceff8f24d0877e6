//! Per-client request throttling

use std::collections::HashMap;
use std::hash::Hash;
use std::time::{Duration, Instant};

use crate::ClientId;

/// Token bucket with continuous refill, one bucket per key.
///
/// Each key may burst up to `capacity` requests; tokens come back at
/// `capacity` per `period`.
#[derive(Debug)]
pub struct RateLimiter<K = ClientId> {
    capacity: f64,
    tokens_per_sec: f64,
    buckets: HashMap<K, Bucket>,
}

#[derive(Debug)]
struct Bucket {
    tokens: f64,
    updated: Instant,
}

impl<K: Eq + Hash + Clone> RateLimiter<K> {
    pub fn new(capacity: u32, period: Duration) -> Self {
        let capacity = f64::from(capacity.max(1));
        let secs = period.as_secs_f64().max(f64::EPSILON);
        Self {
            capacity,
            tokens_per_sec: capacity / secs,
            buckets: HashMap::new(),
        }
    }

    /// Consume one token for `key`. Returns `false` when the bucket is empty.
    pub fn check(&mut self, key: &K) -> bool {
        self.check_at(key, Instant::now())
    }

    fn check_at(&mut self, key: &K, now: Instant) -> bool {
        let capacity = self.capacity;
        let bucket = self.buckets.entry(key.clone()).or_insert(Bucket {
            tokens: capacity,
            updated: now,
        });

        let elapsed = now.saturating_duration_since(bucket.updated).as_secs_f64();
        bucket.tokens = (bucket.tokens + elapsed * self.tokens_per_sec).min(capacity);
        bucket.updated = now;

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Forget a key, e.g. when its client disconnects
    pub fn remove(&mut self, key: &K) {
        self.buckets.remove(key);
    }

    /// Drop buckets untouched for longer than `stale_after`
    pub fn cleanup(&mut self, stale_after: Duration) {
        let now = Instant::now();
        self.buckets
            .retain(|_, bucket| now.saturating_duration_since(bucket.updated) < stale_after);
    }

    pub fn tracked(&self) -> usize {
        self.buckets.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn burst_then_deny() {
        let mut limiter = RateLimiter::new(5, Duration::from_secs(1));
        let client = ClientId::new();
        let t0 = Instant::now();

        for _ in 0..5 {
            assert!(limiter.check_at(&client, t0));
        }
        assert!(!limiter.check_at(&client, t0));
    }

    #[test]
    fn tokens_refill_over_time() {
        let mut limiter: RateLimiter<u32> = RateLimiter::new(2, Duration::from_secs(1));
        let t0 = Instant::now();
        assert!(limiter.check_at(&1, t0));
        assert!(limiter.check_at(&1, t0));
        assert!(!limiter.check_at(&1, t0));

        // half a period returns one token
        let t1 = t0 + Duration::from_millis(500);
        assert!(limiter.check_at(&1, t1));
        assert!(!limiter.check_at(&1, t1));
    }

    #[test]
    fn keys_are_independent() {
        let mut limiter = RateLimiter::new(1, Duration::from_secs(60));
        let a = ClientId::new();
        let b = ClientId::new();
        assert!(limiter.check(&a));
        assert!(!limiter.check(&a));
        assert!(limiter.check(&b));

        limiter.remove(&a);
        assert_eq!(limiter.tracked(), 1);
        assert!(limiter.check(&a));
    }
}
