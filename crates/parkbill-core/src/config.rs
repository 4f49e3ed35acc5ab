//! Application configuration
//!
//! This module provides centralized configuration management using the `config` crate.
//! Configuration can be loaded from environment variables and config files.

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;

/// Main application configuration
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub redis: RedisConfig,
    pub billing: BillingConfig,
}

/// Database configuration
#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL
    pub url: String,

    /// Maximum number of connections in the pool
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Minimum number of connections in the pool
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,

    /// Connection acquire timeout in seconds
    #[serde(default = "default_acquire_timeout")]
    pub acquire_timeout_secs: u64,

    /// Idle connection timeout in seconds
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,
}

fn default_max_connections() -> u32 {
    10
}

fn default_min_connections() -> u32 {
    2
}

fn default_acquire_timeout() -> u64 {
    30
}

fn default_idle_timeout() -> u64 {
    600
}

/// Redis configuration (shared by the cache layer and the distributed lock)
#[derive(Debug, Deserialize, Clone)]
pub struct RedisConfig {
    /// Redis connection URL
    pub url: String,

    /// Default TTL for cached items in seconds
    #[serde(default = "default_cache_ttl")]
    pub default_ttl_secs: u64,
}

fn default_cache_ttl() -> u64 {
    300
}

/// Billing-specific configuration
#[derive(Debug, Deserialize, Clone)]
pub struct BillingConfig {
    /// Grace period applied when a site has no configured rule
    #[serde(default = "default_free_minutes")]
    pub default_free_minutes: i64,

    /// Settlement lock TTL in seconds
    #[serde(default = "default_lock_ttl")]
    pub settlement_lock_ttl_secs: u64,

    /// Maximum time to wait for the settlement lock in seconds
    #[serde(default = "default_lock_wait")]
    pub settlement_lock_wait_secs: u64,

    /// Wallet lock TTL in seconds
    #[serde(default = "default_wallet_lock_ttl")]
    pub wallet_lock_ttl_secs: u64,
}

fn default_free_minutes() -> i64 {
    30
}

fn default_lock_ttl() -> u64 {
    30
}

fn default_lock_wait() -> u64 {
    10
}

fn default_wallet_lock_ttl() -> u64 {
    10
}

impl AppConfig {
    /// Load configuration from environment and optional config file
    pub fn load() -> Result<Self, ConfigError> {
        // A missing .env file is fine; real deployments use the environment
        dotenvy::dotenv().ok();

        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".to_string());

        let config = Config::builder()
            // Start with default values
            .set_default("database.max_connections", 10)?
            .set_default("database.min_connections", 2)?
            .set_default("redis.default_ttl_secs", 300)?
            .set_default("billing.default_free_minutes", 30)?
            .set_default("billing.settlement_lock_ttl_secs", 30)?
            .set_default("billing.settlement_lock_wait_secs", 10)?
            .set_default("billing.wallet_lock_ttl_secs", 10)?
            // Load config file if exists
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            // Load from environment variables with PARKBILL_ prefix
            .add_source(
                Environment::with_prefix("PARKBILL")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Load configuration from a specific file
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(File::with_name(path))
            .add_source(Environment::with_prefix("PARKBILL").separator("__"))
            .build()?;

        config.try_deserialize()
    }
}

impl Default for BillingConfig {
    fn default() -> Self {
        Self {
            default_free_minutes: 30,
            settlement_lock_ttl_secs: 30,
            settlement_lock_wait_secs: 10,
            wallet_lock_ttl_secs: 10,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_billing_config() {
        let config = BillingConfig::default();
        assert_eq!(config.default_free_minutes, 30);
        assert_eq!(config.settlement_lock_ttl_secs, 30);
        assert_eq!(config.settlement_lock_wait_secs, 10);
    }
}
