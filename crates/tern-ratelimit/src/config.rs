//! Rate limit configuration.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// What a writer does when the limiter refuses a line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnforcementMode {
    /// Log the refusal and send anyway.
    #[default]
    Advisory,
    /// Wait until the limiter admits the line. Lines are never dropped.
    Throttle,
}

/// Limits for the global bucket and the per-key buckets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Enforcement policy.
    #[serde(default)]
    pub mode: EnforcementMode,

    /// Burst size of the global bucket.
    #[serde(default = "default_global_max_tokens")]
    pub global_max_tokens: u64,

    /// Global refill interval in milliseconds.
    #[serde(default = "default_global_ms_per_token")]
    pub global_ms_per_token: u64,

    /// Burst size of each per-key bucket.
    #[serde(default = "default_target_max_tokens")]
    pub target_max_tokens: u64,

    /// Per-key refill interval in milliseconds.
    #[serde(default = "default_target_ms_per_token")]
    pub target_ms_per_token: u64,

    /// Maximum number of per-key buckets kept.
    #[serde(default = "default_cache_size")]
    pub cache_size: usize,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            mode: EnforcementMode::default(),
            global_max_tokens: default_global_max_tokens(),
            global_ms_per_token: default_global_ms_per_token(),
            target_max_tokens: default_target_max_tokens(),
            target_ms_per_token: default_target_ms_per_token(),
            cache_size: default_cache_size(),
        }
    }
}

impl RateLimitConfig {
    /// Checks that every limit is non-zero.
    pub fn validate(&self) -> Result<(), RateLimitError> {
        let fields = [
            ("global_max_tokens", self.global_max_tokens),
            ("global_ms_per_token", self.global_ms_per_token),
            ("target_max_tokens", self.target_max_tokens),
            ("target_ms_per_token", self.target_ms_per_token),
            ("cache_size", self.cache_size as u64),
        ];
        match fields.iter().find(|(_, value)| *value == 0) {
            Some((field, _)) => Err(RateLimitError::ZeroLimit { field: *field }),
            None => Ok(()),
        }
    }
}

fn default_global_max_tokens() -> u64 {
    16
}

fn default_global_ms_per_token() -> u64 {
    400
}

fn default_target_max_tokens() -> u64 {
    4
}

fn default_target_ms_per_token() -> u64 {
    2000
}

fn default_cache_size() -> usize {
    256
}

/// Invalid rate limit configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RateLimitError {
    /// A limit that must be positive is zero.
    #[error("rate limit field '{field}' must be greater than zero")]
    ZeroLimit {
        /// Name of the offending field.
        field: &'static str,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = RateLimitConfig::default();
        assert_eq!(config.mode, EnforcementMode::Advisory);
        assert_eq!(config.global_max_tokens, 16);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_limit_rejected() {
        let config = RateLimitConfig {
            target_ms_per_token: 0,
            ..Default::default()
        };
        assert_eq!(
            config.validate(),
            Err(RateLimitError::ZeroLimit {
                field: "target_ms_per_token"
            })
        );
    }
}
