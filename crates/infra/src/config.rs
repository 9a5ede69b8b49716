//! Environment-driven configuration for the tracking engine.

use std::fmt::Display;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

pub const DEFAULT_KEY_PREFIX: &str = "djt::";
pub const DEFAULT_TTL_SECS: u64 = 43_200;
pub const POST_COMPLETE_TTL_SECS: u64 = 3_600;
pub const DEFAULT_SCAN_COUNT: usize = 500;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value for {var}: {value:?} ({reason})")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
}

/// Read `var` through `lookup` and parse it, falling back to `default` when unset.
pub fn parse_var<T, L>(lookup: &L, var: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: Display,
    L: Fn(&str) -> Option<String>,
{
    match lookup(var) {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            var,
            value: raw.clone(),
            reason: e.to_string(),
        }),
    }
}

fn positive<T: PartialOrd + Default + Display>(var: &'static str, value: T) -> Result<T, ConfigError> {
    if value <= T::default() {
        return Err(ConfigError::Invalid {
            var,
            value: value.to_string(),
            reason: "must be greater than zero".into(),
        });
    }
    Ok(value)
}

/// Key layout and retention settings shared by every engine component.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackingConfig {
    pub key_prefix: String,
    /// TTL for live runs.
    pub default_ttl: Duration,
    /// TTL once the run's job reaches a terminal status.
    pub post_complete_ttl: Duration,
    /// Page-size hint for key scans.
    pub scan_count: usize,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            key_prefix: DEFAULT_KEY_PREFIX.to_string(),
            default_ttl: Duration::from_secs(DEFAULT_TTL_SECS),
            post_complete_ttl: Duration::from_secs(POST_COMPLETE_TTL_SECS),
            scan_count: DEFAULT_SCAN_COUNT,
        }
    }
}

impl TrackingConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    pub fn from_lookup<L>(lookup: L) -> Result<Self, ConfigError>
    where
        L: Fn(&str) -> Option<String>,
    {
        let key_prefix = lookup("DJT_KEY_PREFIX").unwrap_or_else(|| DEFAULT_KEY_PREFIX.to_string());
        if key_prefix.is_empty() {
            return Err(ConfigError::Invalid {
                var: "DJT_KEY_PREFIX",
                value: key_prefix,
                reason: "must not be empty".into(),
            });
        }

        let default_ttl = positive(
            "DJT_REDIS_TTL_DEFAULT",
            parse_var(&lookup, "DJT_REDIS_TTL_DEFAULT", DEFAULT_TTL_SECS)?,
        )?;
        let post_complete_ttl = positive(
            "STATUS_POST_COMPLETE_TTL",
            parse_var(&lookup, "STATUS_POST_COMPLETE_TTL", POST_COMPLETE_TTL_SECS)?,
        )?;
        let scan_count = positive(
            "DJT_SCAN_COUNT",
            parse_var(&lookup, "DJT_SCAN_COUNT", DEFAULT_SCAN_COUNT)?,
        )?;

        Ok(Self {
            key_prefix,
            default_ttl: Duration::from_secs(default_ttl),
            post_complete_ttl: Duration::from_secs(post_complete_ttl),
            scan_count,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |var| map.get(var).cloned()
    }

    #[test]
    fn defaults_when_unset() {
        let config = TrackingConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, TrackingConfig::default());
        assert_eq!(config.default_ttl, Duration::from_secs(43_200));
        assert_eq!(config.post_complete_ttl, Duration::from_secs(3_600));
    }

    #[test]
    fn overrides_are_parsed() {
        let config = TrackingConfig::from_lookup(lookup(&[
            ("DJT_KEY_PREFIX", "test::"),
            ("DJT_REDIS_TTL_DEFAULT", "600"),
            ("STATUS_POST_COMPLETE_TTL", " 60 "),
            ("DJT_SCAN_COUNT", "10"),
        ]))
        .unwrap();
        assert_eq!(config.key_prefix, "test::");
        assert_eq!(config.default_ttl, Duration::from_secs(600));
        assert_eq!(config.post_complete_ttl, Duration::from_secs(60));
        assert_eq!(config.scan_count, 10);
    }

    #[test]
    fn bad_values_are_rejected() {
        let err = TrackingConfig::from_lookup(lookup(&[("DJT_REDIS_TTL_DEFAULT", "soon")])).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { var: "DJT_REDIS_TTL_DEFAULT", .. }));

        assert!(TrackingConfig::from_lookup(lookup(&[("STATUS_POST_COMPLETE_TTL", "0")])).is_err());
        assert!(TrackingConfig::from_lookup(lookup(&[("DJT_KEY_PREFIX", "")])).is_err());
    }
}
