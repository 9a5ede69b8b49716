//! Server configuration from the environment.

use std::net::SocketAddr;

use djt_infra::config::{ConfigError, TrackingConfig, parse_var};

pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";
pub const DEFAULT_REDIS_URL: &str = "redis://localhost:6379";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub bind_addr: SocketAddr,
    /// Redis when true, otherwise the in-process store.
    pub use_persistent_stores: bool,
    pub redis_url: String,
    pub tracking: TrackingConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            use_persistent_stores: false,
            redis_url: DEFAULT_REDIS_URL.to_string(),
            tracking: TrackingConfig::default(),
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    pub fn from_lookup<L>(lookup: L) -> Result<Self, ConfigError>
    where
        L: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        Ok(Self {
            bind_addr: parse_var(&lookup, "DJT_BIND_ADDR", defaults.bind_addr)?,
            use_persistent_stores: parse_var(&lookup, "USE_PERSISTENT_STORES", false)?,
            redis_url: lookup("REDIS_URL").unwrap_or(defaults.redis_url),
            tracking: TrackingConfig::from_lookup(&lookup)?,
        })
    }
}
