//! Runtime configuration consumed by the core.
//!
//! The server builds these from its file configuration; tests construct
//! them directly.

use time::Duration;

/// Signing secret and lifetimes of guest and owner tokens.
#[derive(Debug, Clone)]
pub struct TokenConfig {
    pub secret: Vec<u8>,
    pub guest_ttl: Duration,
    pub owner_ttl: Duration,
}

impl TokenConfig {
    pub fn new(secret: impl Into<Vec<u8>>) -> Self {
        Self {
            secret: secret.into(),
            guest_ttl: Duration::days(365),
            owner_ttl: Duration::minutes(15),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RealtimeConfig {
    /// Page size of the log reads that replay missed events to a socket.
    pub replay_limit: usize,
    /// Capacity of each per-list broadcast channel.
    pub channel_capacity: usize,
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            replay_limit: 100,
            channel_capacity: 256,
        }
    }
}
