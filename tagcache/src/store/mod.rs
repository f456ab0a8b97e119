//! Key-value store seam.
//!
//! The cache never talks to a server directly. Everything goes through
//! [`KvStore`], which exposes plain keys with optional expiry plus named sets
//! with union/intersection/difference. Each method is one store round-trip
//! and is atomic on its own; [`KvStore::exec`] is the only way to make several
//! changes land together.

use crate::error::CacheResult;
use async_trait::async_trait;
use std::collections::HashSet;
use std::time::Duration;

mod memory;
#[cfg(feature = "redis")]
mod redis_store;

pub use memory::MemoryStore;
#[cfg(feature = "redis")]
pub use redis_store::RedisStore;

/// Store operations the tag index and entry store are built on.
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Get the raw bytes stored under `key`.
    ///
    /// Returns `Ok(None)` if the key does not exist or has expired.
    async fn get(&self, key: &str) -> CacheResult<Option<Vec<u8>>>;

    /// Store `value` under `key`, with an expiry when `ttl` is given.
    ///
    /// Returns the write-success flag reported by the store.
    async fn set(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> CacheResult<bool>;

    /// Delete keys. Missing keys are ignored.
    ///
    /// Returns the number of keys that existed.
    async fn delete(&self, keys: &[String]) -> CacheResult<u64>;

    /// Check if a key exists.
    async fn exists(&self, key: &str) -> CacheResult<bool>;

    /// Remaining time-to-live of a key.
    ///
    /// Returns `Ok(None)` if the key is missing or has no expiry.
    async fn ttl(&self, key: &str) -> CacheResult<Option<Duration>>;

    /// Add members to the set at `key`, creating it if needed.
    async fn set_add(&self, key: &str, members: &[String]) -> CacheResult<u64>;

    /// Remove members from the set at `key`.
    async fn set_remove(&self, key: &str, members: &[String]) -> CacheResult<u64>;

    /// All members of the set at `key`; empty if the key is missing.
    async fn set_members(&self, key: &str) -> CacheResult<HashSet<String>>;

    /// Union of the sets at `keys`.
    async fn set_union(&self, keys: &[String]) -> CacheResult<HashSet<String>>;

    /// Intersection of the sets at `keys`.
    async fn set_intersect(&self, keys: &[String]) -> CacheResult<HashSet<String>>;

    /// Members of the first set that are in none of the others.
    async fn set_diff(&self, keys: &[String]) -> CacheResult<HashSet<String>>;

    /// Remove every key in the store.
    ///
    /// **Warning:** this is not scoped to cache keys.
    async fn flush_all(&self) -> CacheResult<bool>;

    /// Apply a batch as a single transaction.
    ///
    /// Operations run in order with no other command in between, so
    /// concurrent readers never observe a partially applied batch. There is
    /// no rollback: if one operation fails at run time (for example a set
    /// operation on a plain value), the others are still applied.
    /// [`MemoryStore`] checks value types up front and rejects such a batch
    /// before applying anything.
    async fn exec(&self, batch: Batch) -> CacheResult<()>;
}

/// One write inside a [`Batch`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchOp {
    /// Delete keys
    Delete(Vec<String>),
    /// Add members to a set
    SetAdd { key: String, members: Vec<String> },
    /// Remove members from a set
    SetRemove { key: String, members: Vec<String> },
}

/// Ordered writes applied by [`KvStore::exec`] as one transaction.
///
/// Operations with nothing to do (no keys, no members) are dropped when they
/// are added, since some stores reject them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Batch {
    ops: Vec<BatchOp>,
}

impl Batch {
    /// Create an empty batch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a delete of `keys`.
    pub fn delete(mut self, keys: Vec<String>) -> Self {
        if !keys.is_empty() {
            self.ops.push(BatchOp::Delete(keys));
        }
        self
    }

    /// Queue adding `members` to the set at `key`.
    pub fn set_add(mut self, key: impl Into<String>, members: Vec<String>) -> Self {
        if !members.is_empty() {
            self.ops.push(BatchOp::SetAdd {
                key: key.into(),
                members,
            });
        }
        self
    }

    /// Queue removing `members` from the set at `key`.
    pub fn set_remove(mut self, key: impl Into<String>, members: Vec<String>) -> Self {
        if !members.is_empty() {
            self.ops.push(BatchOp::SetRemove {
                key: key.into(),
                members,
            });
        }
        self
    }

    /// Queue every operation of `other` after the ones already queued.
    pub fn append(mut self, other: Batch) -> Self {
        self.ops.extend(other.ops);
        self
    }

    /// Queued operations, in order.
    pub fn ops(&self) -> &[BatchOp] {
        &self.ops
    }

    /// Number of queued operations.
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    /// Whether nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

impl IntoIterator for Batch {
    type Item = BatchOp;
    type IntoIter = std::vec::IntoIter<BatchOp>;

    fn into_iter(self) -> Self::IntoIter {
        self.ops.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_skips_empty_operations() {
        let batch = Batch::new()
            .delete(vec![])
            .set_remove("jg:all_ids", vec![])
            .set_add("jg:all_tags", vec![]);
        assert!(batch.is_empty());
    }

    #[test]
    fn test_batch_keeps_order() {
        let batch = Batch::new()
            .delete(vec!["jg:k:a".into()])
            .set_remove("jg:all_ids", vec!["a".into()]);

        assert_eq!(batch.len(), 2);
        assert_eq!(batch.ops()[0], BatchOp::Delete(vec!["jg:k:a".into()]));
        assert_eq!(
            batch.ops()[1],
            BatchOp::SetRemove {
                key: "jg:all_ids".into(),
                members: vec!["a".into()],
            }
        );
    }
}
