//! Tag-based cache invalidation.
//!
//! The index lives entirely in the store as plain sets of names:
//!
//! - `jg:all_ids` / `jg:all_tags`: every id and tag ever recorded
//! - `jg:ti:<tag>`: ids carrying the tag (reverse index)
//! - `jg:id_tags:<id>`: tags carried by the id (forward index)
//!
//! The two index families only refer to each other by name, and every
//! traversal is an explicit lookup. Removal always goes through the forward
//! index: the tags of an id are read from `jg:id_tags:<id>`.
//!
//! Bulk removals do not clean the reverse index of the ids they delete, so tag
//! queries may list ids whose payload is gone. The payload key is the
//! authority on whether an entry exists.

use crate::config::TagPolicy;
use crate::error::CacheResult;
use crate::keys::{self, ALL_IDS, ALL_TAGS, KeyRole};
use crate::store::{Batch, KvStore};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;

/// Forward/reverse tag index over a [`KvStore`].
pub struct TagIndex<S: KvStore> {
    store: Arc<S>,
    policy: TagPolicy,
}

fn owned<T: AsRef<str>>(items: &[T]) -> Vec<String> {
    items.iter().map(|t| t.as_ref().to_string()).collect()
}

impl<S: KvStore> TagIndex<S> {
    /// Create a tag index using [`TagPolicy::Replace`].
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            policy: TagPolicy::default(),
        }
    }

    /// Set the policy applied by [`TagIndex::record_save`].
    pub fn with_policy(mut self, policy: TagPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// The active tag policy.
    pub fn policy(&self) -> TagPolicy {
        self.policy
    }

    /// Register `id` and link it with `tags`.
    ///
    /// Under [`TagPolicy::Replace`] the id is first unlinked from tags it had
    /// but no longer has. The forward index is read before the batch is
    /// applied, so a concurrent save of the same id can leave the union of
    /// both tag sets behind.
    ///
    /// All writes go out as one batch.
    pub async fn record_save<T: AsRef<str> + Sync>(&self, id: &str, tags: &[T]) -> CacheResult<()> {
        let tags = owned(tags);
        let mut batch = Batch::new();

        if self.policy == TagPolicy::Replace {
            let previous = self.store.set_members(&keys::id_tags_key(id)).await?;
            let dropped: Vec<String> = previous
                .into_iter()
                .filter(|t| !tags.contains(t))
                .collect();

            for tag in &dropped {
                batch = batch.set_remove(keys::tag_members_key(tag), vec![id.to_string()]);
            }
            batch = batch.set_remove(keys::id_tags_key(id), dropped);
        }

        batch = batch.set_add(ALL_TAGS, tags.clone());
        for tag in &tags {
            batch = batch.set_add(keys::tag_members_key(tag), vec![id.to_string()]);
        }
        batch = batch
            .set_add(keys::id_tags_key(id), tags.clone())
            .set_add(ALL_IDS, vec![id.to_string()]);

        debug!(id, ?tags, policy = %self.policy, "record save");
        self.store.exec(batch).await
    }

    /// Unregister `id` and unlink it from every tag it carries.
    ///
    /// Tags left without members stay in the tag registry.
    pub async fn record_remove(&self, id: &str) -> CacheResult<()> {
        let tags = self.tags_of(id).await?;

        let mut batch = Batch::new().set_remove(ALL_IDS, vec![id.to_string()]);
        for tag in &tags {
            batch = batch.set_remove(keys::tag_members_key(tag), vec![id.to_string()]);
        }
        batch = batch.delete(vec![keys::id_tags_key(id)]);

        debug!(id, ?tags, "record remove");
        self.store.exec(batch).await
    }

    /// Tags currently linked to `id`.
    pub async fn tags_of(&self, id: &str) -> CacheResult<HashSet<String>> {
        self.store.set_members(&keys::id_tags_key(id)).await
    }

    /// Ids currently linked to `tag`.
    pub async fn ids_of(&self, tag: &str) -> CacheResult<HashSet<String>> {
        self.store.set_members(&keys::tag_members_key(tag)).await
    }

    /// Ids carrying every tag in `tags`. No tags means no ids.
    pub async fn ids_matching_all<T: AsRef<str> + Sync>(
        &self,
        tags: &[T],
    ) -> CacheResult<HashSet<String>> {
        if tags.is_empty() {
            return Ok(HashSet::new());
        }
        self.store
            .set_intersect(&KeyRole::TagMembers.keys(tags))
            .await
    }

    /// Ids carrying at least one tag in `tags`. No tags means no ids.
    pub async fn ids_matching_any<T: AsRef<str> + Sync>(
        &self,
        tags: &[T],
    ) -> CacheResult<HashSet<String>> {
        if tags.is_empty() {
            return Ok(HashSet::new());
        }
        self.store.set_union(&KeyRole::TagMembers.keys(tags)).await
    }

    /// Registered ids carrying none of `tags`. No tags means every id.
    pub async fn ids_not_matching_any<T: AsRef<str> + Sync>(
        &self,
        tags: &[T],
    ) -> CacheResult<HashSet<String>> {
        let mut sets = Vec::with_capacity(tags.len() + 1);
        sets.push(ALL_IDS.to_string());
        sets.extend(KeyRole::TagMembers.keys(tags));
        self.store.set_diff(&sets).await
    }

    /// Delete every entry carrying all of `tags`.
    ///
    /// Returns the number of ids removed.
    pub async fn remove_matching_all<T: AsRef<str> + Sync>(&self, tags: &[T]) -> CacheResult<usize> {
        let ids = self.ids_matching_all(tags).await?;
        self.remove_ids("matching all", ids, Batch::new()).await
    }

    /// Delete every registered entry carrying none of `tags`.
    ///
    /// Returns the number of ids removed.
    pub async fn remove_not_matching<T: AsRef<str> + Sync>(&self, tags: &[T]) -> CacheResult<usize> {
        let ids = self.ids_not_matching_any(tags).await?;
        self.remove_ids("not matching", ids, Batch::new()).await
    }

    /// Delete every entry carrying any of `tags`, then drop the tags
    /// themselves: their member sets are deleted and they leave the tag
    /// registry.
    ///
    /// Returns the number of ids removed.
    pub async fn remove_matching_any<T: AsRef<str> + Sync>(&self, tags: &[T]) -> CacheResult<usize> {
        let ids = self.ids_matching_any(tags).await?;
        let drop_tags = Batch::new()
            .delete(KeyRole::TagMembers.keys(tags))
            .set_remove(ALL_TAGS, owned(tags));
        self.remove_ids("matching any", ids, drop_tags).await
    }

    /// Delete the payloads of `ids` and unregister them, together with
    /// `extra`, in one transaction.
    ///
    /// The ids were computed by an earlier read outside the transaction; an
    /// entry saved in between can be deleted even if it no longer matches,
    /// or survive even though it now does.
    async fn remove_ids(&self, mode: &str, ids: HashSet<String>, extra: Batch) -> CacheResult<usize> {
        let count = ids.len();
        let ids: Vec<String> = ids.into_iter().collect();

        let batch = Batch::new()
            .delete(KeyRole::Entry.keys(&ids))
            .set_remove(ALL_IDS, ids)
            .append(extra);

        if !batch.is_empty() {
            self.store.exec(batch).await?;
        }
        debug!(mode, count, "removed entries by tag");
        Ok(count)
    }
}

impl<S: KvStore> Clone for TagIndex<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            policy: self.policy,
        }
    }
}
