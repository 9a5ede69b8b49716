//! In-process hash store with lazy TTL expiry.
//!
//! Expiry is evaluated against tokio's clock on every access, so tests running
//! with paused time can `advance` past a TTL.

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use super::{KeyTtl, KvStore, StoreError};

#[derive(Debug, Clone)]
struct Entry {
    fields: HashMap<String, String>,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.is_none_or(|at| at > now)
    }
}

#[derive(Debug, Default)]
pub struct InMemoryKvStore {
    entries: RwLock<HashMap<String, Entry>>,
}

impl InMemoryKvStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read<R>(&self, f: impl FnOnce(&HashMap<String, Entry>, Instant) -> R) -> Result<R, StoreError> {
        let entries = self.entries.read().map_err(|_| StoreError::Poisoned)?;
        Ok(f(&entries, Instant::now()))
    }

    /// Run `f` with write access after dropping `key` if it has expired.
    fn write<R>(&self, key: &str, f: impl FnOnce(&mut HashMap<String, Entry>, Instant) -> R) -> Result<R, StoreError> {
        let mut entries = self.entries.write().map_err(|_| StoreError::Poisoned)?;
        let now = Instant::now();
        if entries.get(key).is_some_and(|e| !e.is_live(now)) {
            entries.remove(key);
        }
        Ok(f(&mut entries, now))
    }

    fn live<'a>(entries: &'a HashMap<String, Entry>, key: &str, now: Instant) -> Option<&'a Entry> {
        entries.get(key).filter(|e| e.is_live(now))
    }
}

#[async_trait]
impl KvStore for InMemoryKvStore {
    async fn hget(&self, key: &str, field: &str) -> Result<Option<String>, StoreError> {
        self.read(|entries, now| Self::live(entries, key, now).and_then(|e| e.fields.get(field).cloned()))
    }

    async fn hset(&self, key: &str, field: &str, value: &str) -> Result<(), StoreError> {
        self.write(key, |entries, _| {
            entries
                .entry(key.to_string())
                .or_insert_with(|| Entry {
                    fields: HashMap::new(),
                    expires_at: None,
                })
                .fields
                .insert(field.to_string(), value.to_string());
        })
    }

    async fn hgetall(&self, key: &str) -> Result<HashMap<String, String>, StoreError> {
        self.read(|entries, now| {
            Self::live(entries, key, now)
                .map(|e| e.fields.clone())
                .unwrap_or_default()
        })
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, StoreError> {
        self.write(key, |entries, now| match entries.get_mut(key) {
            Some(entry) => {
                entry.expires_at = Some(now + ttl);
                true
            }
            None => false,
        })
    }

    async fn ttl(&self, key: &str) -> Result<KeyTtl, StoreError> {
        self.read(|entries, now| match Self::live(entries, key, now) {
            None => KeyTtl::Missing,
            Some(Entry { expires_at: None, .. }) => KeyTtl::Persistent,
            Some(Entry {
                expires_at: Some(at), ..
            }) => KeyTtl::Expires(at.saturating_duration_since(now)),
        })
    }

    async fn del(&self, key: &str) -> Result<bool, StoreError> {
        self.write(key, |entries, _| entries.remove(key).is_some())
    }

    async fn exists(&self, key: &str) -> Result<bool, StoreError> {
        self.read(|entries, now| Self::live(entries, key, now).is_some())
    }

    async fn scan_prefix(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        self.read(|entries, now| {
            let mut keys: Vec<String> = entries
                .iter()
                .filter(|(key, entry)| key.starts_with(prefix) && entry.is_live(now))
                .map(|(key, _)| key.clone())
                .collect();
            keys.sort();
            keys
        })
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.read(|_, _| ())
    }
}
