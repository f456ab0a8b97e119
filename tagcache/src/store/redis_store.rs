//! Redis store implementation.

use super::{Batch, BatchOp, KvStore};
use crate::error::CacheResult;
use async_trait::async_trait;
use redis::{AsyncCommands, aio::ConnectionManager};
use std::collections::HashSet;
use std::time::Duration;
use tagcache_redis::{RedisConfig, RedisService};

/// Redis-backed [`KvStore`].
///
/// Clones share one multiplexed, auto-reconnecting connection.
#[derive(Clone)]
pub struct RedisStore {
    connection: ConnectionManager,
}

impl RedisStore {
    /// Connect to Redis.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use tagcache::store::RedisStore;
    /// use tagcache_redis::RedisConfig;
    ///
    /// #[tokio::main]
    /// async fn main() -> Result<(), tagcache::CacheError> {
    ///     let store = RedisStore::connect(RedisConfig::new("127.0.0.1", 6379)).await?;
    ///     Ok(())
    /// }
    /// ```
    pub async fn connect(config: RedisConfig) -> CacheResult<Self> {
        let service = RedisService::connect(config).await?;
        Ok(Self::from_service(&service))
    }

    /// Use the connection of an existing service.
    pub fn from_service(service: &RedisService) -> Self {
        Self::from_connection(service.connection())
    }

    /// Wrap an existing connection.
    pub fn from_connection(connection: ConnectionManager) -> Self {
        Self { connection }
    }

    /// Get the underlying connection manager.
    pub fn connection(&self) -> &ConnectionManager {
        &self.connection
    }
}

/// `SETEX` only takes whole, positive seconds.
fn ttl_seconds(ttl: Duration) -> u64 {
    let secs = ttl.as_secs() + u64::from(ttl.subsec_nanos() > 0);
    secs.max(1)
}

#[async_trait]
impl KvStore for RedisStore {
    async fn get(&self, key: &str) -> CacheResult<Option<Vec<u8>>> {
        let mut conn = self.connection.clone();
        let value: Option<Vec<u8>> = conn.get(key).await?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> CacheResult<bool> {
        let mut conn = self.connection.clone();

        if let Some(ttl) = ttl {
            let _: () = conn.set_ex(key, value, ttl_seconds(ttl)).await?;
        } else {
            let _: () = conn.set(key, value).await?;
        }

        Ok(true)
    }

    async fn delete(&self, keys: &[String]) -> CacheResult<u64> {
        if keys.is_empty() {
            return Ok(0);
        }
        let mut conn = self.connection.clone();
        let deleted: u64 = conn.del(keys).await?;
        Ok(deleted)
    }

    async fn exists(&self, key: &str) -> CacheResult<bool> {
        let mut conn = self.connection.clone();
        let exists: bool = conn.exists(key).await?;
        Ok(exists)
    }

    async fn ttl(&self, key: &str) -> CacheResult<Option<Duration>> {
        let mut conn = self.connection.clone();

        let ttl_seconds: i64 = conn.ttl(key).await?;

        match ttl_seconds {
            -2 => Ok(None), // Key doesn't exist
            -1 => Ok(None), // Key has no expiration
            seconds if seconds > 0 => Ok(Some(Duration::from_secs(seconds as u64))),
            _ => Ok(None),
        }
    }

    async fn set_add(&self, key: &str, members: &[String]) -> CacheResult<u64> {
        if members.is_empty() {
            return Ok(0);
        }
        let mut conn = self.connection.clone();
        let added: u64 = conn.sadd(key, members).await?;
        Ok(added)
    }

    async fn set_remove(&self, key: &str, members: &[String]) -> CacheResult<u64> {
        if members.is_empty() {
            return Ok(0);
        }
        let mut conn = self.connection.clone();
        let removed: u64 = conn.srem(key, members).await?;
        Ok(removed)
    }

    async fn set_members(&self, key: &str) -> CacheResult<HashSet<String>> {
        let mut conn = self.connection.clone();
        let members: HashSet<String> = conn.smembers(key).await?;
        Ok(members)
    }

    async fn set_union(&self, keys: &[String]) -> CacheResult<HashSet<String>> {
        if keys.is_empty() {
            return Ok(HashSet::new());
        }
        let mut conn = self.connection.clone();
        let members: HashSet<String> = conn.sunion(keys).await?;
        Ok(members)
    }

    async fn set_intersect(&self, keys: &[String]) -> CacheResult<HashSet<String>> {
        if keys.is_empty() {
            return Ok(HashSet::new());
        }
        let mut conn = self.connection.clone();
        let members: HashSet<String> = conn.sinter(keys).await?;
        Ok(members)
    }

    async fn set_diff(&self, keys: &[String]) -> CacheResult<HashSet<String>> {
        if keys.is_empty() {
            return Ok(HashSet::new());
        }
        let mut conn = self.connection.clone();
        let members: HashSet<String> = conn.sdiff(keys).await?;
        Ok(members)
    }

    async fn flush_all(&self) -> CacheResult<bool> {
        let mut conn = self.connection.clone();
        let _: () = redis::cmd("FLUSHDB").query_async(&mut conn).await?;
        Ok(true)
    }

    async fn exec(&self, batch: Batch) -> CacheResult<()> {
        if batch.is_empty() {
            return Ok(());
        }

        // MULTI ... EXEC
        let mut pipe = redis::pipe();
        pipe.atomic();
        for op in batch {
            match op {
                BatchOp::Delete(keys) => {
                    pipe.del(keys).ignore();
                }
                BatchOp::SetAdd { key, members } => {
                    pipe.sadd(key, members).ignore();
                }
                BatchOp::SetRemove { key, members } => {
                    pipe.srem(key, members).ignore();
                }
            }
        }

        let mut conn = self.connection.clone();
        let _: () = pipe.query_async(&mut conn).await?;
        Ok(())
    }
}
