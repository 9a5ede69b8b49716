//! Redis-backed store (multiplexed async connection).

use std::collections::{BTreeSet, HashMap};
use std::time::Duration;

use async_trait::async_trait;
use djt_core::{Emptiness, RetryPolicy};
use redis::aio::ConnectionManager;
use tracing::{debug, info, instrument};

use super::{KeyTtl, KvStore, StoreError};

#[derive(Clone)]
pub struct RedisKvStore {
    conn: ConnectionManager,
    scan_count: usize,
}

impl std::fmt::Debug for RedisKvStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisKvStore")
            .field("scan_count", &self.scan_count)
            .finish_non_exhaustive()
    }
}

struct Connected(ConnectionManager);

impl Emptiness for Connected {
    fn is_empty_result(&self) -> bool {
        false
    }
}

fn store_error(err: redis::RedisError) -> StoreError {
    if err.is_io_error() || err.is_connection_refusal() || err.is_connection_dropped() || err.is_timeout() {
        StoreError::Unavailable(err.to_string())
    } else {
        StoreError::Command(err.to_string())
    }
}

/// Escape glob metacharacters so a literal prefix can be used in `SCAN MATCH`.
fn glob_escape(prefix: &str) -> String {
    let mut out = String::with_capacity(prefix.len() + 1);
    for c in prefix.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('*');
    out
}

impl RedisKvStore {
    /// Connect to `redis_url`, retrying the initial connection per `retry`.
    #[instrument(skip(redis_url, retry), err)]
    pub async fn connect(redis_url: &str, scan_count: usize, retry: &RetryPolicy) -> Result<Self, StoreError> {
        let client = redis::Client::open(redis_url).map_err(|e| StoreError::Unavailable(e.to_string()))?;
        let Connected(conn) = retry
            .run("redis connect", || {
                let client = client.clone();
                async move { ConnectionManager::new(client).await.map(Connected) }
            })
            .await
            .map_err(store_error)?;
        info!("connected to redis");
        Ok(Self {
            conn,
            scan_count: scan_count.max(1),
        })
    }

    async fn query<T: redis::FromRedisValue>(&self, cmd: &redis::Cmd) -> Result<T, StoreError> {
        let mut conn = self.conn.clone();
        cmd.query_async(&mut conn).await.map_err(store_error)
    }
}

#[async_trait]
impl KvStore for RedisKvStore {
    async fn hget(&self, key: &str, field: &str) -> Result<Option<String>, StoreError> {
        self.query(redis::cmd("HGET").arg(key).arg(field)).await
    }

    async fn hset(&self, key: &str, field: &str, value: &str) -> Result<(), StoreError> {
        let _: i64 = self.query(redis::cmd("HSET").arg(key).arg(field).arg(value)).await?;
        Ok(())
    }

    async fn hgetall(&self, key: &str) -> Result<HashMap<String, String>, StoreError> {
        self.query(redis::cmd("HGETALL").arg(key)).await
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, StoreError> {
        let set: i64 = self
            .query(redis::cmd("EXPIRE").arg(key).arg(ttl.as_secs().max(1)))
            .await?;
        Ok(set == 1)
    }

    async fn ttl(&self, key: &str) -> Result<KeyTtl, StoreError> {
        let millis: i64 = self.query(redis::cmd("PTTL").arg(key)).await?;
        Ok(match millis {
            -2 => KeyTtl::Missing,
            -1 => KeyTtl::Persistent,
            ms => KeyTtl::Expires(Duration::from_millis(ms.max(0) as u64)),
        })
    }

    async fn del(&self, key: &str) -> Result<bool, StoreError> {
        let removed: i64 = self.query(redis::cmd("DEL").arg(key)).await?;
        Ok(removed > 0)
    }

    async fn exists(&self, key: &str) -> Result<bool, StoreError> {
        let found: i64 = self.query(redis::cmd("EXISTS").arg(key)).await?;
        Ok(found > 0)
    }

    async fn scan_prefix(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        let pattern = glob_escape(prefix);
        // SCAN may return a key more than once across pages.
        let mut keys = BTreeSet::new();
        let mut cursor: u64 = 0;
        loop {
            let (next, page): (u64, Vec<String>) = self
                .query(
                    redis::cmd("SCAN")
                        .arg(cursor)
                        .arg("MATCH")
                        .arg(&pattern)
                        .arg("COUNT")
                        .arg(self.scan_count),
                )
                .await?;
            keys.extend(page);
            if next == 0 {
                break;
            }
            cursor = next;
        }
        debug!(prefix, keys = keys.len(), "scan complete");
        Ok(keys.into_iter().collect())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        let _: String = self.query(&redis::cmd("PING")).await?;
        Ok(())
    }
}
