//! Client configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tern_ratelimit::RateLimitConfig;

use crate::error::{IrcError, IrcResult};

/// Default interval between keepalive pings, in seconds.
pub const DEFAULT_PING_FREQUENCY_SECS: u64 = 60;
/// Default silence after which the session is closed, in seconds.
pub const DEFAULT_PING_TIMEOUT_SECS: u64 = 120;
/// Default capacity of the outgoing and fallback incoming queues.
pub const DEFAULT_QUEUE_CAPACITY: usize = 128;

/// Settings for one IRC session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// `host:port` to connect to.
    pub address: String,

    /// Wrap the connection in TLS.
    #[serde(default)]
    pub tls: bool,

    /// Verify the server certificate against the system roots.
    #[serde(default = "default_true")]
    pub tls_verify: bool,

    /// Requested nick.
    pub nick: String,

    /// Username; defaults to the nick when empty.
    #[serde(default)]
    pub user: String,

    /// Real name; defaults to the nick when empty.
    #[serde(default)]
    pub real_name: String,

    /// Server password sent with `PASS`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,

    /// Seconds between keepalive pings.
    #[serde(default = "default_ping_frequency_secs")]
    pub ping_frequency_secs: u64,

    /// Seconds of inbound silence before the session is closed.
    #[serde(default = "default_ping_timeout_secs")]
    pub ping_timeout_secs: u64,

    /// Capacity of the outgoing line queue.
    #[serde(default = "default_queue_capacity")]
    pub outgoing_capacity: usize,

    /// Capacity of the incoming queue used when no handler is installed.
    #[serde(default = "default_queue_capacity")]
    pub incoming_capacity: usize,

    /// Outbound rate limiting.
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            address: String::new(),
            tls: false,
            tls_verify: true,
            nick: String::new(),
            user: String::new(),
            real_name: String::new(),
            password: None,
            ping_frequency_secs: DEFAULT_PING_FREQUENCY_SECS,
            ping_timeout_secs: DEFAULT_PING_TIMEOUT_SECS,
            outgoing_capacity: DEFAULT_QUEUE_CAPACITY,
            incoming_capacity: DEFAULT_QUEUE_CAPACITY,
            rate_limit: RateLimitConfig::default(),
        }
    }
}

impl ClientConfig {
    /// Creates a plaintext configuration with default timings.
    pub fn new(address: impl Into<String>, nick: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            nick: nick.into(),
            ..Default::default()
        }
    }

    /// Enables or disables TLS.
    pub fn with_tls(mut self, tls: bool) -> Self {
        self.tls = tls;
        self
    }

    /// Sets the server password.
    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    /// Replaces unset values with their defaults.
    ///
    /// Zero timings and capacities become the defaults; an empty user or
    /// real name becomes the nick.
    pub fn normalized(mut self) -> Self {
        if self.ping_frequency_secs == 0 {
            self.ping_frequency_secs = DEFAULT_PING_FREQUENCY_SECS;
        }
        if self.ping_timeout_secs == 0 {
            self.ping_timeout_secs = DEFAULT_PING_TIMEOUT_SECS;
        }
        if self.outgoing_capacity == 0 {
            self.outgoing_capacity = DEFAULT_QUEUE_CAPACITY;
        }
        if self.incoming_capacity == 0 {
            self.incoming_capacity = DEFAULT_QUEUE_CAPACITY;
        }
        if self.user.is_empty() {
            self.user = self.nick.clone();
        }
        if self.real_name.is_empty() {
            self.real_name = self.nick.clone();
        }
        self
    }

    /// Checks the values a session cannot start without.
    pub fn validate(&self) -> IrcResult<()> {
        if self.address.trim().is_empty() {
            return Err(IrcError::InvalidConfig("address must not be empty".into()));
        }
        if self.nick.is_empty() || self.nick.contains([' ', ':', '\r', '\n']) {
            return Err(IrcError::InvalidConfig(format!("invalid nick '{}'", self.nick)));
        }
        if self.ping_frequency_secs == 0 || self.ping_timeout_secs == 0 {
            return Err(IrcError::InvalidConfig("ping frequency and timeout must be positive".into()));
        }
        self.rate_limit
            .validate()
            .map_err(|e| IrcError::InvalidConfig(e.to_string()))
    }

    /// Host part of the address, used as the TLS server name.
    pub fn host(&self) -> &str {
        let address = self.address.trim();
        if let Some(bracketed) = address.strip_prefix('[') {
            return bracketed.split(']').next().unwrap_or(bracketed);
        }
        match address.rsplit_once(':') {
            Some((host, _port)) if !host.contains(':') => host,
            _ => address,
        }
    }

    /// Keepalive ping interval.
    pub fn ping_frequency(&self) -> Duration {
        Duration::from_secs(self.ping_frequency_secs)
    }

    /// Keepalive timeout.
    pub fn ping_timeout(&self) -> Duration {
        Duration::from_secs(self.ping_timeout_secs)
    }
}

fn default_true() -> bool {
    true
}

fn default_ping_frequency_secs() -> u64 {
    DEFAULT_PING_FREQUENCY_SECS
}

fn default_ping_timeout_secs() -> u64 {
    DEFAULT_PING_TIMEOUT_SECS
}

fn default_queue_capacity() -> usize {
    DEFAULT_QUEUE_CAPACITY
}
