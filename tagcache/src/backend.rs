//! Tag-indexed cache backend.
//!
//! [`TagCacheBackend`] is what a cache manager talks to: it stores payloads
//! through [`EntryStore`] and keeps tags in [`TagIndex`], both over the same
//! [`KvStore`].
//!
//! # Atomicity
//!
//! - `save` writes the payload, then records its tags in one batch. A reader
//!   can see the payload before the tags.
//! - `remove` deletes the payload, then unlinks the id in one batch.
//! - Tag cleans read the matching ids first, then delete payloads and update
//!   the registries in one batch. The read is not part of that batch.

use crate::compression::{CompressionAlgorithm, Compressor};
use crate::config::{CacheConfig, OptionValue};
use crate::entry::EntryStore;
use crate::error::{CacheError, CacheResult};
use crate::index::TagIndex;
use crate::store::KvStore;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Cleaning modes understood by [`TagCacheBackend::clean`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CleanMode {
    /// Flush the whole store
    All,
    /// Remove expired entries (not supported)
    Old,
    /// Remove entries carrying all given tags
    MatchingTag,
    /// Remove entries carrying none of the given tags
    NotMatchingTag,
    /// Remove entries carrying any given tag, and the tags themselves
    MatchingAnyTag,
}

impl CleanMode {
    /// Name used by cache managers.
    pub fn as_str(&self) -> &'static str {
        match self {
            CleanMode::All => "all",
            CleanMode::Old => "old",
            CleanMode::MatchingTag => "matchingTag",
            CleanMode::NotMatchingTag => "notMatchingTag",
            CleanMode::MatchingAnyTag => "matchingAnyTag",
        }
    }
}

impl FromStr for CleanMode {
    type Err = CacheError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .chars()
            .filter(|c| *c != '_' && *c != '-')
            .collect::<String>()
            .to_ascii_lowercase();
        match normalized.as_str() {
            "all" => Ok(CleanMode::All),
            "old" => Ok(CleanMode::Old),
            "matchingtag" => Ok(CleanMode::MatchingTag),
            "notmatchingtag" => Ok(CleanMode::NotMatchingTag),
            "matchinganytag" => Ok(CleanMode::MatchingAnyTag),
            _ => Err(CacheError::InvalidMode(s.to_string())),
        }
    }
}

impl std::fmt::Display for CleanMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tags attached to a save or selecting a clean.
///
/// Built from a single tag or any list of tags. Duplicates are dropped,
/// first occurrence wins.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Tags(Vec<String>);

impl Tags {
    /// No tags.
    pub fn none() -> Self {
        Self::default()
    }

    /// The tags as a slice.
    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    /// Whether there are no tags.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of distinct tags.
    pub fn len(&self) -> usize {
        self.0.len()
    }
}

impl<S: Into<String>> FromIterator<S> for Tags {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let mut seen = HashSet::new();
        let mut tags = Vec::new();
        for tag in iter {
            let tag = tag.into();
            if seen.insert(tag.clone()) {
                tags.push(tag);
            }
        }
        Self(tags)
    }
}

impl From<&str> for Tags {
    fn from(tag: &str) -> Self {
        Self(vec![tag.to_string()])
    }
}

impl From<String> for Tags {
    fn from(tag: String) -> Self {
        Self(vec![tag])
    }
}

impl<S: Into<String>> From<Vec<S>> for Tags {
    fn from(tags: Vec<S>) -> Self {
        tags.into_iter().collect()
    }
}

impl<S: Into<String> + Clone> From<&[S]> for Tags {
    fn from(tags: &[S]) -> Self {
        tags.iter().cloned().collect()
    }
}

impl<S: Into<String>, const N: usize> From<[S; N]> for Tags {
    fn from(tags: [S; N]) -> Self {
        tags.into_iter().collect()
    }
}

impl<T: Into<Tags>> From<Option<T>> for Tags {
    fn from(tags: Option<T>) -> Self {
        tags.map_or_else(Tags::none, Into::into)
    }
}

/// What the backend can do, for cache managers that adapt to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Capabilities {
    /// Expired entries can be cleaned on demand
    pub automatic_cleaning: bool,
    /// Tag-based invalidation
    pub tags: bool,
    /// Expired entries can still be read
    pub expired_read: bool,
    /// Priority-based eviction
    pub priority: bool,
    /// Entries without lifetime
    pub infinite_lifetime: bool,
    /// Ids can be listed by tag
    pub get_list: bool,
}

/// Capabilities of [`TagCacheBackend`].
pub const CAPABILITIES: Capabilities = Capabilities {
    automatic_cleaning: false,
    tags: true,
    expired_read: false,
    priority: false,
    infinite_lifetime: false,
    get_list: true,
};

/// Entry metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Metadata {
    /// Time left before the entry expires
    pub expire: Duration,
    /// Tags linked to the entry, sorted
    pub tags: Vec<String>,
    /// Approximate write time
    pub mtime: DateTime<Utc>,
}

/// Tag-indexed cache backend.
pub struct TagCacheBackend<S: KvStore> {
    config: CacheConfig,
    store: Arc<S>,
    entries: EntryStore<S>,
    index: TagIndex<S>,
    custom_compressor: Option<Arc<dyn Compressor>>,
}

#[cfg(feature = "redis")]
impl TagCacheBackend<crate::store::RedisStore> {
    /// Validate `config` and connect to the Redis server it names.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use tagcache::*;
    ///
    /// #[tokio::main]
    /// async fn main() -> Result<(), CacheError> {
    ///     let backend = TagCacheBackend::connect(CacheConfig::new()).await?;
    ///     backend.save(b"<html>", "page:home", ["pages"], None).await?;
    ///     backend.clean(CleanMode::MatchingTag, "pages").await?;
    ///     Ok(())
    /// }
    /// ```
    pub async fn connect(config: CacheConfig) -> CacheResult<Self> {
        config.validate()?;
        let store = crate::store::RedisStore::connect(config.redis_config()).await?;
        tracing::info!(server = %config.server, port = config.port, "tag cache backend connected");
        Self::new(store, config)
    }
}

impl<S: KvStore> TagCacheBackend<S> {
    /// Build a backend over `store`.
    ///
    /// Fails if `config` does not validate.
    pub fn new(store: S, config: CacheConfig) -> CacheResult<Self> {
        config.validate()?;
        let store = Arc::new(store);
        let entries = Self::entry_store(&store, &config, None);
        let index = TagIndex::new(store.clone()).with_policy(config.tag_policy);

        Ok(Self {
            config,
            store,
            entries,
            index,
            custom_compressor: None,
        })
    }

    /// Entry store for `config`, using `custom` over the built-in codec when
    /// compression is on.
    fn entry_store(
        store: &Arc<S>,
        config: &CacheConfig,
        custom: Option<&Arc<dyn Compressor>>,
    ) -> EntryStore<S> {
        let entries = EntryStore::new(store.clone());
        if !config.compress {
            return entries;
        }
        match custom {
            Some(compressor) => entries.with_compressor(compressor.clone()),
            None => entries.with_compressor(Arc::new(CompressionAlgorithm::preferred())),
        }
    }

    /// Compress payloads with a custom compressor instead of the built-in one.
    ///
    /// Also switches the `compress` option on. The compressor stays in use
    /// across [`TagCacheBackend::set_option`] calls for as long as `compress`
    /// is on.
    pub fn with_compressor(mut self, compressor: Arc<dyn Compressor>) -> Self {
        self.config.compress = true;
        self.custom_compressor = Some(compressor);
        self.entries =
            Self::entry_store(&self.store, &self.config, self.custom_compressor.as_ref());
        self
    }

    /// The active configuration.
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Current options as name/value pairs.
    pub fn options(&self) -> BTreeMap<&'static str, OptionValue> {
        self.config.options()
    }

    /// Change an option at runtime.
    ///
    /// `compress` and `tag_policy` take effect on the next call. `server`,
    /// `port` and `database` only matter for the next connection. A rejected
    /// value leaves the backend unchanged.
    pub fn set_option(&mut self, name: &str, value: impl Into<OptionValue>) -> CacheResult<()> {
        self.config.set_option(name, value)?;
        self.entries =
            Self::entry_store(&self.store, &self.config, self.custom_compressor.as_ref());
        self.index = TagIndex::new(self.store.clone()).with_policy(self.config.tag_policy);
        Ok(())
    }

    /// The underlying store.
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// The tag index.
    pub fn index(&self) -> &TagIndex<S> {
        &self.index
    }

    /// Load a payload.
    ///
    /// Always reads the payload key, so ids still listed under a tag after
    /// their payload was deleted or expired are reported as absent.
    pub async fn load(&self, id: &str) -> CacheResult<Option<Vec<u8>>> {
        self.entries.get(id).await
    }

    /// Check whether an entry exists without reading its payload.
    pub async fn test(&self, id: &str) -> CacheResult<bool> {
        self.entries.exists(id).await
    }

    /// Save a payload under `id` with `tags`.
    ///
    /// `lifetime` overrides the configured lifetime; `Some(Duration::ZERO)`
    /// stores without expiry. Returns the store's write-success flag.
    pub async fn save(
        &self,
        payload: &[u8],
        id: &str,
        tags: impl Into<Tags>,
        lifetime: Option<Duration>,
    ) -> CacheResult<bool> {
        let tags = tags.into();
        let ttl = lifetime.or(self.config.lifetime);

        let written = self.entries.put(id, payload, ttl).await?;
        self.index.record_save(id, tags.as_slice()).await?;
        Ok(written)
    }

    /// Remove an entry and unlink it from its tags.
    pub async fn remove(&self, id: &str) -> CacheResult<bool> {
        self.entries.delete(id).await?;
        self.index.record_remove(id).await?;
        Ok(true)
    }

    /// Clean entries.
    ///
    /// Tag modes with no tags do nothing and return `false`. [`CleanMode::Old`]
    /// is not supported.
    pub async fn clean(&self, mode: CleanMode, tags: impl Into<Tags>) -> CacheResult<bool> {
        let tags = tags.into();

        let removed = match mode {
            CleanMode::All => {
                debug!(mode = %mode, "flushing store");
                return self.store.flush_all().await;
            }
            CleanMode::Old => return Err(CacheError::Unsupported("cleaning of old entries")),
            _ if tags.is_empty() => return Ok(false),
            CleanMode::MatchingTag => self.index.remove_matching_all(tags.as_slice()).await?,
            CleanMode::NotMatchingTag => self.index.remove_not_matching(tags.as_slice()).await?,
            CleanMode::MatchingAnyTag => self.index.remove_matching_any(tags.as_slice()).await?,
        };
        debug!(mode = %mode, tags = ?tags.as_slice(), removed, "cleaned by tags");
        Ok(true)
    }

    /// Ids carrying every given tag, sorted.
    pub async fn ids_matching_tags(&self, tags: impl Into<Tags>) -> CacheResult<Vec<String>> {
        let tags = tags.into();
        Ok(sorted(self.index.ids_matching_all(tags.as_slice()).await?))
    }

    /// Ids carrying none of the given tags, sorted.
    pub async fn ids_not_matching_tags(&self, tags: impl Into<Tags>) -> CacheResult<Vec<String>> {
        let tags = tags.into();
        Ok(sorted(self.index.ids_not_matching_any(tags.as_slice()).await?))
    }

    /// Ids carrying any given tag, sorted.
    pub async fn ids_matching_any_tags(&self, tags: impl Into<Tags>) -> CacheResult<Vec<String>> {
        let tags = tags.into();
        Ok(sorted(self.index.ids_matching_any(tags.as_slice()).await?))
    }

    /// Metadata of an entry.
    ///
    /// `None` when the entry is missing or has no expiry. The write time is
    /// derived from the configured lifetime and is only accurate for entries
    /// saved without a lifetime override.
    pub async fn metadata(&self, id: &str) -> CacheResult<Option<Metadata>> {
        let Some(remaining) = self.entries.remaining_ttl(id).await? else {
            return Ok(None);
        };

        let elapsed = self
            .config
            .lifetime
            .map(|lifetime| lifetime.saturating_sub(remaining))
            .unwrap_or_default();
        let mtime = Utc::now()
            - chrono::Duration::from_std(elapsed)
                .map_err(|e| CacheError::Store(e.to_string()))?;

        Ok(Some(Metadata {
            expire: remaining,
            tags: sorted(self.index.tags_of(id).await?),
            mtime,
        }))
    }

    /// What this backend supports.
    pub fn capabilities(&self) -> Capabilities {
        CAPABILITIES
    }

    /// Not supported: the id registry is not pruned on expiry, so it cannot
    /// answer this truthfully.
    pub async fn list_all_ids(&self) -> CacheResult<Vec<String>> {
        Err(CacheError::Unsupported("listing all ids"))
    }

    /// Not supported.
    pub async fn list_all_tags(&self) -> CacheResult<Vec<String>> {
        Err(CacheError::Unsupported("listing all tags"))
    }

    /// Not supported.
    pub async fn touch(&self, _id: &str, _extra_lifetime: Duration) -> CacheResult<bool> {
        Err(CacheError::Unsupported("touch"))
    }

    /// Not supported.
    pub async fn fill_ratio(&self) -> CacheResult<u8> {
        Err(CacheError::Unsupported("filling percentage"))
    }
}

impl<S: KvStore> Clone for TagCacheBackend<S> {
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
            store: self.store.clone(),
            entries: self.entries.clone(),
            index: self.index.clone(),
            custom_compressor: self.custom_compressor.clone(),
        }
    }
}

fn sorted(ids: HashSet<String>) -> Vec<String> {
    let mut ids: Vec<String> = ids.into_iter().collect();
    ids.sort();
    ids
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn backend() -> TagCacheBackend<MemoryStore> {
        TagCacheBackend::new(MemoryStore::new(), CacheConfig::new()).unwrap()
    }

    #[test]
    fn test_clean_mode_from_str() {
        assert_eq!("all".parse::<CleanMode>().unwrap(), CleanMode::All);
        assert_eq!("matchingTag".parse::<CleanMode>().unwrap(), CleanMode::MatchingTag);
        assert_eq!(
            "not_matching_tag".parse::<CleanMode>().unwrap(),
            CleanMode::NotMatchingTag
        );
        assert_eq!(
            "matchingAnyTag".parse::<CleanMode>().unwrap(),
            CleanMode::MatchingAnyTag
        );

        let err = "sometimes".parse::<CleanMode>().unwrap_err();
        assert!(matches!(err, CacheError::InvalidMode(_)));
        assert!(err.is_unsupported());
    }

    #[test]
    fn test_clean_mode_display_roundtrip() {
        for mode in [
            CleanMode::All,
            CleanMode::Old,
            CleanMode::MatchingTag,
            CleanMode::NotMatchingTag,
            CleanMode::MatchingAnyTag,
        ] {
            assert_eq!(mode.to_string().parse::<CleanMode>().unwrap(), mode);
        }
    }

    #[test]
    fn test_tags_normalization() {
        assert_eq!(Tags::from("one").as_slice(), ["one".to_string()]);
        assert_eq!(Tags::from(vec!["a", "b", "a"]).len(), 2);
        assert_eq!(Tags::from(["x", "y"]).as_slice(), ["x".to_string(), "y".to_string()]);
        assert!(Tags::from(None::<&str>).is_empty());
        assert!(Tags::from(Vec::<String>::new()).is_empty());
    }

    #[test]
    fn test_capabilities() {
        let caps = backend().capabilities();
        assert!(caps.tags);
        assert!(caps.get_list);
        assert!(!caps.automatic_cleaning);
        assert!(!caps.priority);
        assert!(!caps.infinite_lifetime);
        assert!(!caps.expired_read);
    }

    #[test]
    fn test_new_rejects_long_lifetime() {
        let config = CacheConfig::new().with_lifetime(Some(Duration::from_secs(2_592_001)));
        let err = TagCacheBackend::new(MemoryStore::new(), config).err().unwrap();
        assert!(err.is_config());
    }

    #[tokio::test]
    async fn test_save_uses_configured_lifetime() {
        let backend = backend();
        backend.save(b"v", "k", Tags::none(), None).await.unwrap();

        let ttl = backend.entries.remaining_ttl("k").await.unwrap().unwrap();
        assert!(ttl <= Duration::from_secs(3600));
        assert!(ttl > Duration::from_secs(3590));
    }

    #[tokio::test]
    async fn test_save_with_zero_lifetime_never_expires() {
        let backend = backend();
        backend
            .save(b"v", "k", "t", Some(Duration::ZERO))
            .await
            .unwrap();
        assert_eq!(backend.entries.remaining_ttl("k").await.unwrap(), None);
        assert!(backend.metadata("k").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_unsupported_operations() {
        let backend = backend();
        assert!(backend.list_all_ids().await.unwrap_err().is_unsupported());
        assert!(backend.list_all_tags().await.unwrap_err().is_unsupported());
        assert!(
            backend
                .touch("k", Duration::from_secs(1))
                .await
                .unwrap_err()
                .is_unsupported()
        );
        assert!(backend.fill_ratio().await.unwrap_err().is_unsupported());
        assert!(
            backend
                .clean(CleanMode::Old, Tags::none())
                .await
                .unwrap_err()
                .is_unsupported()
        );
    }

    #[tokio::test]
    async fn test_set_option_switches_compression() {
        let mut backend = backend();
        assert_eq!(backend.entries.compressor_name(), None);

        backend.set_option("compress", true).unwrap();
        assert!(backend.options()["compress"] == OptionValue::Bool(true));

        let payload = b"payload payload payload payload".to_vec();
        backend.save(&payload, "k", Tags::none(), None).await.unwrap();
        assert_eq!(backend.load("k").await.unwrap(), Some(payload.clone()));

        let raw = backend.store.get("jg:k:k").await.unwrap().unwrap();
        assert_ne!(raw, payload);
        #[cfg(feature = "gzip")]
        assert_eq!(raw[..2], [0x1f, 0x8b]);

        backend.set_option("compress", false).unwrap();
        backend.save(&payload, "plain", Tags::none(), None).await.unwrap();
        assert_eq!(
            backend.store.get("jg:k:plain").await.unwrap(),
            Some(payload)
        );
    }

    /// Reverses bytes, so stored values differ from any built-in codec.
    struct Reverse;

    impl Compressor for Reverse {
        fn name(&self) -> &'static str {
            "reverse"
        }

        fn compress(&self, data: &[u8]) -> CacheResult<Vec<u8>> {
            Ok(data.iter().rev().copied().collect())
        }

        fn decompress(&self, data: &[u8]) -> CacheResult<Vec<u8>> {
            Ok(data.iter().rev().copied().collect())
        }
    }

    #[tokio::test]
    async fn test_custom_compressor_survives_set_option() {
        let mut backend = backend().with_compressor(Arc::new(Reverse));
        backend.save(b"payload", "k", "t", None).await.unwrap();
        assert_eq!(
            backend.store.get("jg:k:k").await.unwrap(),
            Some(b"daolyap".to_vec())
        );

        backend.set_option("port", 6380i64).unwrap();
        backend.set_option("tag_policy", "union").unwrap();
        assert_eq!(backend.entries.compressor_name(), Some("reverse"));
        assert_eq!(backend.load("k").await.unwrap(), Some(b"payload".to_vec()));

        backend.set_option("compress", false).unwrap();
        assert_eq!(backend.entries.compressor_name(), None);

        backend.set_option("compress", true).unwrap();
        assert_eq!(backend.entries.compressor_name(), Some("reverse"));
        assert_eq!(backend.load("k").await.unwrap(), Some(b"payload".to_vec()));
    }

    #[tokio::test]
    async fn test_set_option_rejects_empty_server() {
        let mut backend = backend();
        assert!(backend.set_option("server", "").unwrap_err().is_config());
        assert_eq!(backend.config().server, "127.0.0.1");
    }

    #[tokio::test(start_paused = true)]
    async fn test_metadata_write_time() {
        let backend = backend();
        backend.save(b"v", "k", ["b", "a"], None).await.unwrap();

        tokio::time::advance(Duration::from_secs(600)).await;

        let meta = backend.metadata("k").await.unwrap().unwrap();
        assert_eq!(meta.expire, Duration::from_secs(3000));
        assert_eq!(meta.tags, vec!["a".to_string(), "b".to_string()]);

        // Wall clock does not move with paused tokio time.
        let age = Utc::now() - meta.mtime;
        assert!(age >= chrono::Duration::seconds(599));
        assert!(age <= chrono::Duration::seconds(601));
    }
}
