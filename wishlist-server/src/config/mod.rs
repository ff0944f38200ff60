//! Configuration module for wishlist-server.
//!
//! Handles loading configuration from TOML files, CLI arguments,
//! and environment variables.

pub mod file;

use crate::config::file::{FileConfig, StorageBackend};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use thiserror::Error;
use wishlist_core::config::{RealtimeConfig, TokenConfig};

/// Shortest accepted token secret, in bytes.
const MIN_SECRET_LEN: usize = 16;

/// Errors that can occur during configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("validation error: {0}")]
    ValidationError(String),

    #[error("DATABASE_URL environment variable not set")]
    MissingDatabaseUrl,
}

/// Validated configuration, split into the parts each component consumes.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub listen: SocketAddr,
    pub tokens: TokenConfig,
    pub realtime: RealtimeConfig,
    pub backend: StorageBackend,
    pub max_connections: u32,
}

/// Configuration loader that handles the complete loading process.
pub struct ConfigLoader {
    config_path: PathBuf,
    listen_override: Option<SocketAddr>,
}

impl ConfigLoader {
    pub fn new(config_path: impl AsRef<Path>, listen_override: Option<SocketAddr>) -> Self {
        Self {
            config_path: config_path.as_ref().to_path_buf(),
            listen_override,
        }
    }

    /// Read the TOML file, apply CLI overrides and validate.
    pub fn load(&self) -> Result<LoadedConfig, ConfigError> {
        let config_content = std::fs::read_to_string(&self.config_path)?;
        let mut file_config: FileConfig = toml::from_str(&config_content)?;

        if let Some(listen) = self.listen_override {
            file_config.server.listen = listen;
        }

        validate(&file_config)?;
        Ok(build_loaded_config(file_config))
    }
}

fn validate(config: &FileConfig) -> Result<(), ConfigError> {
    if config.tokens.secret.len() < MIN_SECRET_LEN {
        return Err(ConfigError::ValidationError(format!(
            "tokens.secret must be at least {MIN_SECRET_LEN} bytes"
        )));
    }
    if config.tokens.guest_ttl_days <= 0 {
        return Err(ConfigError::ValidationError(
            "tokens.guest_ttl_days must be positive".to_string(),
        ));
    }
    if config.tokens.owner_ttl_minutes <= 0 {
        return Err(ConfigError::ValidationError(
            "tokens.owner_ttl_minutes must be positive".to_string(),
        ));
    }
    if config.realtime.replay_limit == 0 || config.realtime.channel_capacity == 0 {
        return Err(ConfigError::ValidationError(
            "realtime.replay_limit and realtime.channel_capacity must be positive".to_string(),
        ));
    }
    if config.storage.max_connections == 0 {
        return Err(ConfigError::ValidationError(
            "storage.max_connections must be positive".to_string(),
        ));
    }
    Ok(())
}

fn build_loaded_config(file_config: FileConfig) -> LoadedConfig {
    LoadedConfig {
        listen: file_config.server.listen,
        tokens: TokenConfig {
            secret: file_config.tokens.secret.into_bytes(),
            guest_ttl: time::Duration::days(file_config.tokens.guest_ttl_days),
            owner_ttl: time::Duration::minutes(file_config.tokens.owner_ttl_minutes),
        },
        realtime: RealtimeConfig {
            replay_limit: file_config.realtime.replay_limit,
            channel_capacity: file_config.realtime.channel_capacity,
        },
        backend: file_config.storage.backend,
        max_connections: file_config.storage.max_connections,
    }
}

/// Get the database URL from the environment.
pub fn get_database_url() -> Result<String, ConfigError> {
    std::env::var("DATABASE_URL").map_err(|_| ConfigError::MissingDatabaseUrl)
}
