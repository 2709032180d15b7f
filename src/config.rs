//! Configuration Module
//!
//! Handles loading and managing pool configuration from environment variables.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use serde::Serialize;

use crate::error::{CacheError, Result};

/// Pool configuration parameters.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Config {
    /// Bounded-tier capacity in bytes for the image pool
    pub image_capacity_bytes: usize,
    /// Bounded-tier capacity in bytes for the text pool
    pub text_capacity_bytes: usize,
    /// Budget of strongly held bytes in each secondary tier
    pub secondary_max_bytes: usize,
    /// Idle seconds after which a secondary reference is reclaimed, 0 = never
    pub secondary_max_idle_secs: u64,
    /// Time-to-live in seconds for text entries
    pub text_ttl_secs: u64,
    /// Timeout in seconds for the HTTP byte source
    pub http_timeout_secs: u64,
    /// Background reclaim task interval in seconds
    pub reclaim_interval: u64,
    /// Deduplicate concurrent misses on the same key
    pub single_flight: bool,
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `CACHE_CAPACITY_BYTES` - Capacity shared by both pools unless overridden (default: 8 MiB)
    /// - `IMAGE_CAPACITY_BYTES` - Image pool capacity (default: `CACHE_CAPACITY_BYTES`)
    /// - `TEXT_CAPACITY_BYTES` - Text pool capacity (default: `CACHE_CAPACITY_BYTES`)
    /// - `SECONDARY_MAX_BYTES` - Secondary tier strong budget (default: 4x capacity)
    /// - `SECONDARY_MAX_IDLE_SECS` - Secondary idle decay (default: 600)
    /// - `TEXT_TTL_SECS` - Text entry TTL (default: 300)
    /// - `HTTP_TIMEOUT_SECS` - HTTP timeout (default: 60)
    /// - `RECLAIM_INTERVAL` - Reclaim task frequency in seconds (default: 30)
    /// - `SINGLE_FLIGHT` - `true`/`1` to deduplicate concurrent misses (default: false)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let shared = env_or("CACHE_CAPACITY_BYTES", defaults.image_capacity_bytes);

        Self {
            image_capacity_bytes: env_or("IMAGE_CAPACITY_BYTES", shared),
            text_capacity_bytes: env_or("TEXT_CAPACITY_BYTES", shared),
            secondary_max_bytes: env_or("SECONDARY_MAX_BYTES", shared.saturating_mul(4)),
            secondary_max_idle_secs: env_or(
                "SECONDARY_MAX_IDLE_SECS",
                defaults.secondary_max_idle_secs,
            ),
            text_ttl_secs: env_or("TEXT_TTL_SECS", defaults.text_ttl_secs),
            http_timeout_secs: env_or("HTTP_TIMEOUT_SECS", defaults.http_timeout_secs),
            reclaim_interval: env_or("RECLAIM_INTERVAL", defaults.reclaim_interval),
            single_flight: env::var("SINGLE_FLIGHT")
                .ok()
                .map(|v| matches!(v.trim(), "1" | "true" | "TRUE" | "yes"))
                .unwrap_or(defaults.single_flight),
        }
    }

    // == Validate ==
    /// Rejects values that cannot build a working pool.
    pub fn validate(&self) -> Result<()> {
        if self.image_capacity_bytes == 0 || self.text_capacity_bytes == 0 {
            return Err(CacheError::InvalidConfig(
                "pool capacity must be greater than zero".to_string(),
            ));
        }
        if self.reclaim_interval == 0 {
            return Err(CacheError::InvalidConfig(
                "reclaim interval must be at least one second".to_string(),
            ));
        }
        if self.http_timeout_secs == 0 {
            return Err(CacheError::InvalidConfig(
                "http timeout must be at least one second".to_string(),
            ));
        }
        Ok(())
    }

    /// Idle decay for secondary references, `None` when disabled.
    pub fn secondary_max_idle(&self) -> Option<Duration> {
        (self.secondary_max_idle_secs > 0).then(|| Duration::from_secs(self.secondary_max_idle_secs))
    }

    pub fn text_ttl(&self) -> Duration {
        Duration::from_secs(self.text_ttl_secs)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            image_capacity_bytes: 8 * 1024 * 1024,
            text_capacity_bytes: 8 * 1024 * 1024,
            secondary_max_bytes: 32 * 1024 * 1024,
            secondary_max_idle_secs: 600,
            text_ttl_secs: 300,
            http_timeout_secs: 60,
            reclaim_interval: 30,
            single_flight: false,
        }
    }
}

fn env_or<T: FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.image_capacity_bytes, 8 * 1024 * 1024);
        assert_eq!(config.text_ttl_secs, 300);
        assert_eq!(config.http_timeout_secs, 60);
        assert!(!config.single_flight);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_from_env_defaults() {
        // Clear any existing env vars to test defaults
        for name in [
            "CACHE_CAPACITY_BYTES",
            "IMAGE_CAPACITY_BYTES",
            "TEXT_CAPACITY_BYTES",
            "SECONDARY_MAX_BYTES",
            "SECONDARY_MAX_IDLE_SECS",
            "TEXT_TTL_SECS",
            "HTTP_TIMEOUT_SECS",
            "RECLAIM_INTERVAL",
            "SINGLE_FLIGHT",
        ] {
            env::remove_var(name);
        }

        let config = Config::from_env();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_validate_rejects_zero_capacity() {
        let config = Config {
            text_capacity_bytes: 0,
            ..Config::default()
        };
        assert!(matches!(config.validate(), Err(CacheError::InvalidConfig(_))));
    }

    #[test]
    fn test_idle_decay_disabled_at_zero() {
        let config = Config {
            secondary_max_idle_secs: 0,
            ..Config::default()
        };
        assert_eq!(config.secondary_max_idle(), None);
        assert_eq!(
            Config::default().secondary_max_idle(),
            Some(Duration::from_secs(600))
        );
    }

    #[test]
    fn test_config_serializes_for_logging() {
        let json = serde_json::to_value(Config::default()).unwrap();
        assert_eq!(json["text_ttl_secs"], 300);
        assert_eq!(json["single_flight"], false);
    }
}
