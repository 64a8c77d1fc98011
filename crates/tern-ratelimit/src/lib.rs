//! # Tern Rate Limiting
//!
//! Admission control for outbound protocol traffic.
//!
//! - [`Bucket`]: a classic token bucket that starts full and refills one
//!   token per fixed interval.
//! - [`LruCache`]: an arena-backed, capacity-bounded map that evicts the
//!   least recently used key.
//! - [`RateLimiter`]: a global bucket gating an LRU cache of per-key
//!   buckets, shared behind a single lock.
//!
//! ```rust
//! use tern_ratelimit::{RateLimitConfig, RateLimiter};
//!
//! let limiter = RateLimiter::new(&RateLimitConfig::default());
//! assert!(limiter.check("#rust"));
//! ```

mod bucket;
mod config;
mod limiter;
mod lru;

pub use bucket::Bucket;
pub use config::{EnforcementMode, RateLimitConfig, RateLimitError};
pub use limiter::RateLimiter;
pub use lru::LruCache;
