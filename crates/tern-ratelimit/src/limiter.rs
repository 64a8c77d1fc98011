//! Keyed rate limiter.

use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;

use crate::bucket::Bucket;
use crate::config::RateLimitConfig;
use crate::lru::LruCache;

/// A global bucket in front of an LRU-bounded set of per-key buckets.
///
/// All state sits behind one lock; `check` is cheap and never awaits.
#[derive(Debug)]
pub struct RateLimiter {
    state: Mutex<LimiterState>,
}

#[derive(Debug)]
struct LimiterState {
    global: Bucket,
    keys: LruCache<Bucket>,
    key_max_tokens: u64,
    key_ms_per_token: u64,
}

impl RateLimiter {
    /// Creates a limiter from configuration.
    pub fn new(config: &RateLimitConfig) -> Self {
        Self::with_limits(
            config.cache_size,
            (config.global_max_tokens, config.global_ms_per_token),
            (config.target_max_tokens, config.target_ms_per_token),
        )
    }

    /// Creates a limiter from `(max_tokens, ms_per_token)` pairs.
    pub fn with_limits(cache_size: usize, global: (u64, u64), per_key: (u64, u64)) -> Self {
        Self {
            state: Mutex::new(LimiterState {
                global: Bucket::new(global.0, global.1),
                keys: LruCache::new(cache_size),
                key_max_tokens: per_key.0,
                key_ms_per_token: per_key.1,
            }),
        }
    }

    /// Returns `true` if an action for `key` is admitted now.
    pub fn check(&self, key: &str) -> bool {
        self.check_at(key, Instant::now())
    }

    /// Returns `true` if an action for `key` is admitted at `now`.
    ///
    /// A global refusal wins without touching the per-key cache. Otherwise
    /// the key's bucket is looked up (or created full) and becomes the most
    /// recently used entry.
    pub fn check_at(&self, key: &str, now: Instant) -> bool {
        let mut state = self.state.lock();
        if !state.global.admit_at(now) {
            return false;
        }

        let (max, ms) = (state.key_max_tokens, state.key_ms_per_token);
        state
            .keys
            .get_or_insert_with(key, || Bucket::new_at(max, ms, now))
            .admit_at(now)
    }

    /// Returns how long until both the global bucket and `key`'s bucket hold a token.
    ///
    /// Does not change the key's recency.
    pub fn retry_after(&self, key: &str) -> Duration {
        let now = Instant::now();
        let mut state = self.state.lock();
        let global = state.global.wait_time_at(now);
        let keyed = match state.keys.peek(key) {
            Some(bucket) => bucket.clone().wait_time_at(now),
            None => Duration::ZERO,
        };
        global.max(keyed)
    }

    /// Returns `false` when a zero-capacity bucket refuses every action.
    pub fn can_admit(&self) -> bool {
        let state = self.state.lock();
        state.global.max_tokens() > 0 && state.key_max_tokens > 0
    }

    /// Number of keys currently tracked.
    pub fn tracked_keys(&self) -> usize {
        self.state.lock().keys.len()
    }

    /// Returns `true` if `key` currently has a bucket.
    pub fn is_tracked(&self, key: &str) -> bool {
        self.state.lock().keys.contains(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_per_key_limits_are_independent() {
        let limiter = RateLimiter::with_limits(8, (100, 1), (1, 1000));
        let now = Instant::now();

        assert!(limiter.check_at("#a", now));
        assert!(!limiter.check_at("#a", now));
        assert!(limiter.check_at("#b", now));
        assert_eq!(limiter.tracked_keys(), 2);
    }

    #[test]
    fn test_global_refusal_short_circuits() {
        let limiter = RateLimiter::with_limits(8, (1, 1000), (10, 1));
        let now = Instant::now();

        assert!(limiter.check_at("#a", now));
        assert!(!limiter.check_at("#b", now));
        // The refused key never reached the cache.
        assert!(!limiter.is_tracked("#b"));
    }

    #[test]
    fn test_cache_capacity_evicts_lru_key() {
        let limiter = RateLimiter::with_limits(2, (100, 1), (1, 60_000));
        let now = Instant::now();

        assert!(limiter.check_at("a", now));
        assert!(limiter.check_at("b", now));
        assert!(limiter.check_at("c", now));
        assert!(!limiter.is_tracked("a"));

        // "a" comes back with a fresh, full bucket.
        assert!(limiter.check_at("a", now));
        assert_eq!(limiter.tracked_keys(), 2);
    }

    #[test]
    fn test_zero_capacity_never_admits() {
        assert!(RateLimiter::with_limits(8, (1, 1), (1, 1)).can_admit());

        let limiter = RateLimiter::with_limits(8, (100, 1), (0, 1));
        assert!(!limiter.can_admit());
        assert!(!limiter.check("#a"));
        assert!(!RateLimiter::with_limits(8, (0, 1), (1, 1)).can_admit());
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_after_reflects_refill() {
        let limiter = RateLimiter::with_limits(4, (100, 1), (1, 500));
        assert!(limiter.check("#a"));
        assert!(!limiter.check("#a"));
        assert_eq!(limiter.retry_after("#a"), Duration::from_millis(500));

        tokio::time::advance(Duration::from_millis(500)).await;
        assert_eq!(limiter.retry_after("#a"), Duration::ZERO);
        assert!(limiter.check("#a"));
    }
}
