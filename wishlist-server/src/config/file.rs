//! TOML file configuration structures.
//!
//! These structs directly map to the `wishlist-config.toml` file format.

use serde::{Deserialize, Serialize};
use std::net::{Ipv4Addr, SocketAddr};

/// Root configuration structure as read from the TOML file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileConfig {
    #[serde(default)]
    pub server: ServerConfig,
    pub tokens: TokensConfig,
    #[serde(default)]
    pub realtime: RealtimeConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

/// Server configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// The address and port to listen on (e.g., "0.0.0.0:8080").
    #[serde(default = "default_listen_addr")]
    pub listen: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen_addr(),
        }
    }
}

fn default_listen_addr() -> SocketAddr {
    SocketAddr::from((Ipv4Addr::UNSPECIFIED, 8080))
}

/// Token signing section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokensConfig {
    /// HMAC secret shared with the auth service that mints owner tokens.
    pub secret: String,
    #[serde(default = "default_guest_ttl_days")]
    pub guest_ttl_days: i64,
    #[serde(default = "default_owner_ttl_minutes")]
    pub owner_ttl_minutes: i64,
}

fn default_guest_ttl_days() -> i64 {
    365
}

fn default_owner_ttl_minutes() -> i64 {
    15
}

/// Realtime channel section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RealtimeConfig {
    /// Page size of log reads that replay missed events to a socket.
    #[serde(default = "default_replay_limit")]
    pub replay_limit: usize,
    /// Buffer of each per-list broadcast channel.
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            replay_limit: default_replay_limit(),
            channel_capacity: default_channel_capacity(),
        }
    }
}

fn default_replay_limit() -> usize {
    100
}

fn default_channel_capacity() -> usize {
    256
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// Process memory; everything is lost on restart.
    #[default]
    Memory,
    /// PostgreSQL at `DATABASE_URL`.
    Postgres,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StorageBackend,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::default(),
            max_connections: default_max_connections(),
        }
    }
}

fn default_max_connections() -> u32 {
    10
}
