//! Tag-indexed cache backend over a key-value store with set operations.
//!
//! Every cache entry is a payload plus a set of tags. Entries can be cleaned
//! in bulk by tag: those carrying all given tags, any given tag, or none of
//! them. The tag index lives in the same store as the payloads, as plain sets:
//!
//! | Key               | Holds                                   |
//! |-------------------|-----------------------------------------|
//! | `jg:all_ids`      | every id ever saved and not removed     |
//! | `jg:all_tags`     | every tag ever used and not cleaned     |
//! | `jg:k:<id>`       | the payload, with its expiry            |
//! | `jg:ti:<tag>`     | ids carrying the tag                    |
//! | `jg:id_tags:<id>` | tags carried by the id                  |
//!
//! # Features
//!
//! - `redis` - Redis store (enabled by default)
//! - `gzip` - gzip payload compression (enabled by default)
//! - `zstd` - zstd payload compression
//!
//! # Examples
//!
//! ## Redis
//!
//! ```no_run
//! use tagcache::*;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), CacheError> {
//!     let config = CacheConfig::new()
//!         .with_server("localhost")
//!         .with_lifetime(Some(Duration::from_secs(600)));
//!     let backend = TagCacheBackend::connect(config).await?;
//!
//!     backend.save(b"{\"name\":\"Alice\"}", "user:123", ["users", "active"], None).await?;
//!     let ids = backend.ids_matching_tags("users").await?;
//!     assert_eq!(ids, vec!["user:123".to_string()]);
//!
//!     backend.clean(CleanMode::MatchingAnyTag, "users").await?;
//!     Ok(())
//! }
//! ```
//!
//! ## In-memory store
//!
//! ```
//! use tagcache::*;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), CacheError> {
//! let backend = TagCacheBackend::new(MemoryStore::new(), CacheConfig::new())?;
//!
//! backend.save(b"a", "k1", ["t1", "t2"], None).await?;
//! backend.save(b"b", "k2", "t2", None).await?;
//!
//! backend.clean(CleanMode::MatchingTag, ["t1", "t2"]).await?;
//! assert_eq!(backend.load("k1").await?, None);
//! assert_eq!(backend.load("k2").await?, Some(b"b".to_vec()));
//! # Ok(())
//! # }
//! ```

pub mod backend;
pub mod compression;
pub mod config;
pub mod entry;
pub mod error;
pub mod index;
pub mod keys;
pub mod store;

pub use backend::{Capabilities, CleanMode, Metadata, TagCacheBackend, Tags, CAPABILITIES};
pub use compression::{CompressionAlgorithm, Compressor};
pub use config::{CacheConfig, OptionValue, TagPolicy, DEFAULT_LIFETIME, MAX_LIFETIME};
pub use entry::EntryStore;
pub use error::{CacheError, CacheResult};
pub use index::TagIndex;
pub use store::{Batch, BatchOp, KvStore, MemoryStore};

#[cfg(feature = "redis")]
pub use store::RedisStore;

/// Prelude for common imports.
///
/// ```
/// use tagcache::prelude::*;
/// ```
pub mod prelude {
    pub use crate::backend::{CleanMode, TagCacheBackend, Tags};
    pub use crate::config::{CacheConfig, TagPolicy};
    pub use crate::error::{CacheError, CacheResult};
    pub use crate::store::{KvStore, MemoryStore};

    #[cfg(feature = "redis")]
    pub use crate::store::RedisStore;
}
