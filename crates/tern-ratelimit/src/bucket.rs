//! Token bucket.

use std::time::Duration;

use tokio::time::Instant;

/// A token bucket refilling one token every `ms_per_token` milliseconds.
///
/// Refill is computed lazily on admission. Only whole tokens are added and
/// the refill reference advances by exactly the time those tokens account
/// for, so partial intervals carry over to the next call.
#[derive(Debug, Clone)]
pub struct Bucket {
    max_tokens: u64,
    ms_per_token: u64,
    last_refill: Instant,
    tokens: u64,
}

impl Bucket {
    /// Creates a full bucket.
    ///
    /// A zero `ms_per_token` is treated as one millisecond.
    pub fn new(max_tokens: u64, ms_per_token: u64) -> Self {
        Self::new_at(max_tokens, ms_per_token, Instant::now())
    }

    /// Creates a full bucket whose refill clock starts at `now`.
    pub fn new_at(max_tokens: u64, ms_per_token: u64, now: Instant) -> Self {
        Self {
            max_tokens,
            ms_per_token: ms_per_token.max(1),
            last_refill: now,
            tokens: max_tokens,
        }
    }

    /// Takes a token if one is available.
    pub fn admit(&mut self) -> bool {
        self.admit_at(Instant::now())
    }

    /// Takes a token if one is available at `now`.
    pub fn admit_at(&mut self, now: Instant) -> bool {
        self.refill(now);
        if self.tokens > 0 {
            self.tokens -= 1;
            true
        } else {
            false
        }
    }

    /// Returns how long until a token is available at `now`.
    pub fn wait_time_at(&mut self, now: Instant) -> Duration {
        self.refill(now);
        if self.tokens > 0 || self.max_tokens == 0 {
            return Duration::ZERO;
        }
        let elapsed = now.saturating_duration_since(self.last_refill);
        Duration::from_millis(self.ms_per_token).saturating_sub(elapsed)
    }

    /// Tokens currently held, as of the last refill.
    pub fn tokens(&self) -> u64 {
        self.tokens
    }

    /// Bucket capacity.
    pub fn max_tokens(&self) -> u64 {
        self.max_tokens
    }

    fn refill(&mut self, now: Instant) {
        let elapsed_ms = now.saturating_duration_since(self.last_refill).as_millis();
        let increments = u64::try_from(elapsed_ms / u128::from(self.ms_per_token)).unwrap_or(u64::MAX);
        if increments == 0 {
            return;
        }

        self.tokens = self.tokens.saturating_add(increments).min(self.max_tokens);
        let consumed = increments.saturating_mul(self.ms_per_token);
        self.last_refill += Duration::from_millis(consumed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn test_starts_full_and_drains() {
        let start = Instant::now();
        let mut bucket = Bucket::new_at(2, 500, start);

        assert!(bucket.admit_at(start));
        assert!(bucket.admit_at(start));
        assert!(!bucket.admit_at(start));
        assert_eq!(bucket.tokens(), 0);
    }

    #[test]
    fn test_refills_whole_tokens_only() {
        let start = Instant::now();
        let mut bucket = Bucket::new_at(2, 500, start);
        bucket.admit_at(start);
        bucket.admit_at(start);

        assert!(!bucket.admit_at(start + ms(499)));
        assert!(bucket.admit_at(start + ms(500)));
        assert!(!bucket.admit_at(start + ms(500)));
    }

    #[test]
    fn test_fractional_remainder_carries_over() {
        let start = Instant::now();
        let mut bucket = Bucket::new_at(1, 500, start);
        assert!(bucket.admit_at(start));

        // 700ms: one token added, 200ms carried.
        assert!(bucket.admit_at(start + ms(700)));
        // 1000ms is 500ms after the advanced reference point.
        assert!(bucket.admit_at(start + ms(1000)));
        assert!(!bucket.admit_at(start + ms(1400)));
    }

    #[test]
    fn test_refill_is_capped() {
        let start = Instant::now();
        let mut bucket = Bucket::new_at(3, 100, start);
        for _ in 0..3 {
            assert!(bucket.admit_at(start));
        }

        let later = start + Duration::from_secs(3600);
        for _ in 0..3 {
            assert!(bucket.admit_at(later));
        }
        assert!(!bucket.admit_at(later));
    }

    #[test]
    fn test_wait_time() {
        let start = Instant::now();
        let mut bucket = Bucket::new_at(1, 500, start);
        assert_eq!(bucket.wait_time_at(start), Duration::ZERO);

        bucket.admit_at(start);
        assert_eq!(bucket.wait_time_at(start + ms(200)), ms(300));
        assert_eq!(bucket.wait_time_at(start + ms(500)), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_admit_with_real_clock() {
        let mut bucket = Bucket::new(2, 500);
        assert!(bucket.admit());
        assert!(bucket.admit());
        assert!(!bucket.admit());

        tokio::time::advance(ms(500)).await;
        assert!(bucket.admit());
        assert!(!bucket.admit());
    }
}
