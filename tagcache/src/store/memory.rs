//! In-process store.

use super::{Batch, BatchOp, KvStore};
use crate::error::{CacheError, CacheResult};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;

/// In-memory [`KvStore`] with Redis-like semantics.
///
/// Expired values are treated as absent on read and dropped on the next
/// write that touches them. Sets are deleted once their last member is
/// removed. Clones share the same data.
#[derive(Clone, Default)]
pub struct MemoryStore {
    data: Arc<RwLock<HashMap<String, Value>>>,
}

#[derive(Debug, Clone)]
enum Value {
    Bytes {
        data: Vec<u8>,
        expires_at: Option<Instant>,
    },
    Set(HashSet<String>),
}

impl Value {
    fn is_live(&self, now: Instant) -> bool {
        match self {
            Value::Bytes {
                expires_at: Some(exp),
                ..
            } => *exp > now,
            _ => true,
        }
    }
}

fn wrong_type(key: &str) -> CacheError {
    CacheError::Store(format!(
        "WRONGTYPE operation against key '{}' holding the wrong kind of value",
        key
    ))
}

fn live<'a>(data: &'a HashMap<String, Value>, key: &str, now: Instant) -> Option<&'a Value> {
    data.get(key).filter(|v| v.is_live(now))
}

fn read_set(data: &HashMap<String, Value>, key: &str, now: Instant) -> CacheResult<HashSet<String>> {
    match live(data, key, now) {
        Some(Value::Set(members)) => Ok(members.clone()),
        Some(Value::Bytes { .. }) => Err(wrong_type(key)),
        None => Ok(HashSet::new()),
    }
}

fn delete_keys(data: &mut HashMap<String, Value>, keys: &[String], now: Instant) -> u64 {
    keys.iter()
        .filter_map(|k| data.remove(k))
        .filter(|v| v.is_live(now))
        .count() as u64
}

fn add_members(
    data: &mut HashMap<String, Value>,
    key: &str,
    members: &[String],
    now: Instant,
) -> CacheResult<u64> {
    if data.get(key).is_some_and(|v| !v.is_live(now)) {
        data.remove(key);
    }
    let entry = data
        .entry(key.to_string())
        .or_insert_with(|| Value::Set(HashSet::new()));
    match entry {
        Value::Set(set) => Ok(members.iter().filter(|m| set.insert((*m).clone())).count() as u64),
        Value::Bytes { .. } => Err(wrong_type(key)),
    }
}

fn remove_members(
    data: &mut HashMap<String, Value>,
    key: &str,
    members: &[String],
) -> CacheResult<u64> {
    let (removed, emptied) = match data.get_mut(key) {
        Some(Value::Set(set)) => {
            let removed = members.iter().filter(|m| set.remove(*m)).count() as u64;
            (removed, set.is_empty())
        }
        Some(Value::Bytes { .. }) => return Err(wrong_type(key)),
        None => (0, false),
    };
    if emptied {
        data.remove(key);
    }
    Ok(removed)
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live keys.
    pub async fn len(&self) -> usize {
        let now = Instant::now();
        self.data.read().await.values().filter(|v| v.is_live(now)).count()
    }

    /// Whether the store holds no live keys.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Drop expired values.
    pub async fn purge_expired(&self) {
        let now = Instant::now();
        self.data.write().await.retain(|_, v| v.is_live(now));
    }
}

#[async_trait]
impl KvStore for MemoryStore {
    async fn get(&self, key: &str) -> CacheResult<Option<Vec<u8>>> {
        let data = self.data.read().await;
        match live(&data, key, Instant::now()) {
            Some(Value::Bytes { data, .. }) => Ok(Some(data.clone())),
            Some(Value::Set(_)) => Err(wrong_type(key)),
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> CacheResult<bool> {
        let expires_at = ttl.map(|ttl| Instant::now() + ttl);
        self.data.write().await.insert(
            key.to_string(),
            Value::Bytes {
                data: value,
                expires_at,
            },
        );
        Ok(true)
    }

    async fn delete(&self, keys: &[String]) -> CacheResult<u64> {
        let mut data = self.data.write().await;
        Ok(delete_keys(&mut data, keys, Instant::now()))
    }

    async fn exists(&self, key: &str) -> CacheResult<bool> {
        let data = self.data.read().await;
        Ok(live(&data, key, Instant::now()).is_some())
    }

    async fn ttl(&self, key: &str) -> CacheResult<Option<Duration>> {
        let data = self.data.read().await;
        let now = Instant::now();
        match live(&data, key, now) {
            Some(Value::Bytes {
                expires_at: Some(exp),
                ..
            }) => Ok(Some(exp.saturating_duration_since(now))),
            _ => Ok(None),
        }
    }

    async fn set_add(&self, key: &str, members: &[String]) -> CacheResult<u64> {
        let mut data = self.data.write().await;
        add_members(&mut data, key, members, Instant::now())
    }

    async fn set_remove(&self, key: &str, members: &[String]) -> CacheResult<u64> {
        let mut data = self.data.write().await;
        remove_members(&mut data, key, members)
    }

    async fn set_members(&self, key: &str) -> CacheResult<HashSet<String>> {
        let data = self.data.read().await;
        read_set(&data, key, Instant::now())
    }

    async fn set_union(&self, keys: &[String]) -> CacheResult<HashSet<String>> {
        let data = self.data.read().await;
        let now = Instant::now();
        let mut result = HashSet::new();
        for key in keys {
            result.extend(read_set(&data, key, now)?);
        }
        Ok(result)
    }

    async fn set_intersect(&self, keys: &[String]) -> CacheResult<HashSet<String>> {
        let data = self.data.read().await;
        let now = Instant::now();
        let mut iter = keys.iter();
        let Some(first) = iter.next() else {
            return Ok(HashSet::new());
        };
        let mut result = read_set(&data, first, now)?;
        for key in iter {
            let other = read_set(&data, key, now)?;
            result.retain(|m| other.contains(m));
        }
        Ok(result)
    }

    async fn set_diff(&self, keys: &[String]) -> CacheResult<HashSet<String>> {
        let data = self.data.read().await;
        let now = Instant::now();
        let mut iter = keys.iter();
        let Some(first) = iter.next() else {
            return Ok(HashSet::new());
        };
        let mut result = read_set(&data, first, now)?;
        for key in iter {
            for member in read_set(&data, key, now)? {
                result.remove(&member);
            }
        }
        Ok(result)
    }

    async fn flush_all(&self) -> CacheResult<bool> {
        self.data.write().await.clear();
        Ok(true)
    }

    async fn exec(&self, batch: Batch) -> CacheResult<()> {
        let mut data = self.data.write().await;
        let now = Instant::now();

        // Check types up front so a failing batch leaves nothing behind.
        for op in batch.ops() {
            if let BatchOp::SetAdd { key, .. } | BatchOp::SetRemove { key, .. } = op
                && matches!(live(&data, key, now), Some(Value::Bytes { .. }))
            {
                return Err(wrong_type(key));
            }
        }

        for op in batch {
            match op {
                BatchOp::Delete(keys) => {
                    delete_keys(&mut data, &keys, now);
                }
                BatchOp::SetAdd { key, members } => {
                    add_members(&mut data, &key, &members, now)?;
                }
                BatchOp::SetRemove { key, members } => {
                    remove_members(&mut data, &key, &members)?;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set_of(items: &[&str]) -> HashSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn keys(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_get_set_delete() {
        let store = MemoryStore::new();
        assert_eq!(store.get("a").await.unwrap(), None);

        assert!(store.set("a", b"1".to_vec(), None).await.unwrap());
        assert_eq!(store.get("a").await.unwrap(), Some(b"1".to_vec()));
        assert!(store.exists("a").await.unwrap());

        assert_eq!(store.delete(&keys(&["a", "missing"])).await.unwrap(), 1);
        assert_eq!(store.get("a").await.unwrap(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expiry() {
        let store = MemoryStore::new();
        store
            .set("a", b"1".to_vec(), Some(Duration::from_secs(10)))
            .await
            .unwrap();

        assert_eq!(store.ttl("a").await.unwrap(), Some(Duration::from_secs(10)));

        tokio::time::advance(Duration::from_secs(4)).await;
        assert_eq!(store.ttl("a").await.unwrap(), Some(Duration::from_secs(6)));

        tokio::time::advance(Duration::from_secs(7)).await;
        assert_eq!(store.get("a").await.unwrap(), None);
        assert_eq!(store.ttl("a").await.unwrap(), None);
        assert!(!store.exists("a").await.unwrap());

        store.purge_expired().await;
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_ttl_without_expiry() {
        let store = MemoryStore::new();
        store.set("a", b"1".to_vec(), None).await.unwrap();
        assert_eq!(store.ttl("a").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_set_algebra() {
        let store = MemoryStore::new();
        store.set_add("s1", &keys(&["a", "b", "c"])).await.unwrap();
        store.set_add("s2", &keys(&["b", "c", "d"])).await.unwrap();

        let s = keys(&["s1", "s2"]);
        assert_eq!(store.set_union(&s).await.unwrap(), set_of(&["a", "b", "c", "d"]));
        assert_eq!(store.set_intersect(&s).await.unwrap(), set_of(&["b", "c"]));
        assert_eq!(store.set_diff(&s).await.unwrap(), set_of(&["a"]));

        // Missing sets behave as empty
        let with_missing = keys(&["s1", "nope"]);
        assert!(store.set_intersect(&with_missing).await.unwrap().is_empty());
        assert_eq!(store.set_diff(&with_missing).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_set_add_counts_new_members() {
        let store = MemoryStore::new();
        assert_eq!(store.set_add("s", &keys(&["a", "b"])).await.unwrap(), 2);
        assert_eq!(store.set_add("s", &keys(&["b", "c"])).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_empty_set_is_removed() {
        let store = MemoryStore::new();
        store.set_add("s", &keys(&["a"])).await.unwrap();
        assert_eq!(store.set_remove("s", &keys(&["a"])).await.unwrap(), 1);
        assert!(!store.exists("s").await.unwrap());
    }

    #[tokio::test]
    async fn test_wrong_type() {
        let store = MemoryStore::new();
        store.set("k", b"v".to_vec(), None).await.unwrap();
        assert!(store.set_add("k", &keys(&["a"])).await.is_err());
        assert!(store.set_members("k").await.is_err());
    }

    #[tokio::test]
    async fn test_exec_applies_all() {
        let store = MemoryStore::new();
        store.set("jg:k:a", b"1".to_vec(), None).await.unwrap();
        store.set_add("jg:all_ids", &keys(&["a", "b"])).await.unwrap();

        let batch = Batch::new()
            .delete(keys(&["jg:k:a"]))
            .set_remove("jg:all_ids", keys(&["a"]));
        store.exec(batch).await.unwrap();

        assert_eq!(store.get("jg:k:a").await.unwrap(), None);
        assert_eq!(store.set_members("jg:all_ids").await.unwrap(), set_of(&["b"]));
    }

    #[tokio::test]
    async fn test_exec_rejects_whole_batch_on_type_error() {
        let store = MemoryStore::new();
        store.set("jg:k:a", b"1".to_vec(), None).await.unwrap();

        let batch = Batch::new()
            .delete(keys(&["other"]))
            .set_add("jg:k:a", keys(&["x"]));
        assert!(store.exec(batch).await.is_err());
        assert_eq!(store.get("jg:k:a").await.unwrap(), Some(b"1".to_vec()));
    }

    #[tokio::test]
    async fn test_flush_all() {
        let store = MemoryStore::new();
        store.set("a", b"1".to_vec(), None).await.unwrap();
        store.set_add("s", &keys(&["x"])).await.unwrap();

        assert!(store.flush_all().await.unwrap());
        assert!(store.is_empty().await);
    }
}
