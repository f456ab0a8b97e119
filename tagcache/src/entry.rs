//! Entry payload storage.

use crate::compression::Compressor;
use crate::error::CacheResult;
use crate::keys;
use crate::store::KvStore;
use std::sync::Arc;
use std::time::Duration;
use tracing::trace;

/// Reads and writes entry payloads under `jg:k:<id>`.
///
/// Payloads go through the compressor, when one is set, on the way in and
/// out. Payload keys carry the only expiry in the system; index sets never
/// expire.
pub struct EntryStore<S: KvStore> {
    store: Arc<S>,
    compressor: Option<Arc<dyn Compressor>>,
}

impl<S: KvStore> EntryStore<S> {
    /// Create an entry store without compression.
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            compressor: None,
        }
    }

    /// Compress payloads with `compressor`.
    pub fn with_compressor(mut self, compressor: Arc<dyn Compressor>) -> Self {
        self.compressor = Some(compressor);
        self
    }

    /// Name of the active compressor, if any.
    pub fn compressor_name(&self) -> Option<&'static str> {
        self.compressor.as_ref().map(|c| c.name())
    }

    /// Get a payload.
    ///
    /// A missing key is `Ok(None)`; store and decompression failures are
    /// errors.
    pub async fn get(&self, id: &str) -> CacheResult<Option<Vec<u8>>> {
        let Some(raw) = self.store.get(&keys::entry_key(id)).await? else {
            return Ok(None);
        };

        match &self.compressor {
            Some(compressor) => compressor.decompress(&raw).map(Some),
            None => Ok(Some(raw)),
        }
    }

    /// Write a payload. A zero or absent `ttl` writes without expiry.
    ///
    /// Returns the store's write-success flag.
    pub async fn put(&self, id: &str, payload: &[u8], ttl: Option<Duration>) -> CacheResult<bool> {
        let value = match &self.compressor {
            Some(compressor) => compressor.compress(payload)?,
            None => payload.to_vec(),
        };
        let ttl = ttl.filter(|t| !t.is_zero());

        trace!(id, bytes = value.len(), ttl_secs = ?ttl.map(|t| t.as_secs()), "put entry");
        self.store.set(&keys::entry_key(id), value, ttl).await
    }

    /// Delete a payload. Deleting a missing id is not an error.
    ///
    /// Returns whether a payload existed.
    pub async fn delete(&self, id: &str) -> CacheResult<bool> {
        let deleted = self.store.delete(&[keys::entry_key(id)]).await?;
        Ok(deleted > 0)
    }

    /// Whether a payload exists, without reading it.
    pub async fn exists(&self, id: &str) -> CacheResult<bool> {
        self.store.exists(&keys::entry_key(id)).await
    }

    /// Remaining lifetime of a payload.
    ///
    /// `Ok(None)` means the entry is missing or has no expiry.
    pub async fn remaining_ttl(&self, id: &str) -> CacheResult<Option<Duration>> {
        let ttl = self.store.ttl(&keys::entry_key(id)).await?;
        Ok(ttl.filter(|t| !t.is_zero()))
    }
}

impl<S: KvStore> Clone for EntryStore<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            compressor: self.compressor.clone(),
        }
    }
}
