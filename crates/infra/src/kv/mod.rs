//! Hash-with-TTL key-value store boundary.
//!
//! The engine only needs a handful of hash operations plus per-key expiry and
//! prefix enumeration. Two backends implement it: an in-process map for tests
//! and single-node development, and Redis behind the `redis` feature.

pub mod in_memory;
#[cfg(feature = "redis")]
pub mod redis;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use djt_core::TrackingError;

pub use in_memory::InMemoryKvStore;
#[cfg(feature = "redis")]
pub use self::redis::RedisKvStore;

/// Remaining lifetime of a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyTtl {
    Missing,
    Persistent,
    Expires(Duration),
}

#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("store command failed: {0}")]
    Command(String),

    #[error("store lock poisoned")]
    Poisoned,
}

impl From<StoreError> for TrackingError {
    fn from(err: StoreError) -> Self {
        TrackingError::unavailable(err.to_string())
    }
}

#[async_trait]
pub trait KvStore: Send + Sync {
    async fn hget(&self, key: &str, field: &str) -> Result<Option<String>, StoreError>;

    /// Set one field. An existing key keeps its TTL.
    async fn hset(&self, key: &str, field: &str, value: &str) -> Result<(), StoreError>;

    /// Every field of `key`; empty when the key is absent.
    async fn hgetall(&self, key: &str) -> Result<HashMap<String, String>, StoreError>;

    /// Returns false when the key does not exist.
    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, StoreError>;

    async fn ttl(&self, key: &str) -> Result<KeyTtl, StoreError>;

    /// Returns false when the key did not exist.
    async fn del(&self, key: &str) -> Result<bool, StoreError>;

    async fn exists(&self, key: &str) -> Result<bool, StoreError>;

    /// Live keys starting with `prefix`, each listed once.
    async fn scan_prefix(&self, prefix: &str) -> Result<Vec<String>, StoreError>;

    async fn ping(&self) -> Result<(), StoreError>;
}

#[async_trait]
impl<T: KvStore + ?Sized> KvStore for Arc<T> {
    async fn hget(&self, key: &str, field: &str) -> Result<Option<String>, StoreError> {
        (**self).hget(key, field).await
    }

    async fn hset(&self, key: &str, field: &str, value: &str) -> Result<(), StoreError> {
        (**self).hset(key, field, value).await
    }

    async fn hgetall(&self, key: &str) -> Result<HashMap<String, String>, StoreError> {
        (**self).hgetall(key).await
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, StoreError> {
        (**self).expire(key, ttl).await
    }

    async fn ttl(&self, key: &str) -> Result<KeyTtl, StoreError> {
        (**self).ttl(key).await
    }

    async fn del(&self, key: &str) -> Result<bool, StoreError> {
        (**self).del(key).await
    }

    async fn exists(&self, key: &str) -> Result<bool, StoreError> {
        (**self).exists(key).await
    }

    async fn scan_prefix(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        (**self).scan_prefix(prefix).await
    }

    async fn ping(&self) -> Result<(), StoreError> {
        (**self).ping().await
    }
}
