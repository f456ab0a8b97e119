//! Physical key layout.
//!
//! Every logical name is mapped into its own prefixed key space so payloads,
//! tag member sets, id tag sets and the two registries never collide:
//!
//! | Role | Key |
//! |---|---|
//! | id registry | `jg:all_ids` |
//! | tag registry | `jg:all_tags` |
//! | entry payload | `jg:k:<id>` |
//! | tag member ids | `jg:ti:<tag>` |
//! | id member tags | `jg:id_tags:<id>` |

/// Set of every id ever saved.
pub const ALL_IDS: &str = "jg:all_ids";

/// Set of every tag ever used.
pub const ALL_TAGS: &str = "jg:all_tags";

const PREFIX_ENTRY: &str = "jg:k:";
const PREFIX_TAG_IDS: &str = "jg:ti:";
const PREFIX_ID_TAGS: &str = "jg:id_tags:";

/// What a physical key holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyRole {
    /// Entry payload
    Entry,
    /// Member ids of a tag (reverse index)
    TagMembers,
    /// Member tags of an id (forward index)
    IdTags,
}

impl KeyRole {
    /// Prefix prepended to logical names of this role.
    pub const fn prefix(self) -> &'static str {
        match self {
            KeyRole::Entry => PREFIX_ENTRY,
            KeyRole::TagMembers => PREFIX_TAG_IDS,
            KeyRole::IdTags => PREFIX_ID_TAGS,
        }
    }

    /// Physical key for `name` in this role.
    pub fn key(self, name: &str) -> String {
        let prefix = self.prefix();
        let mut key = String::with_capacity(prefix.len() + name.len());
        key.push_str(prefix);
        key.push_str(name);
        key
    }

    /// Physical keys for many names in this role.
    pub fn keys<I, S>(self, names: I) -> Vec<String>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        names.into_iter().map(|n| self.key(n.as_ref())).collect()
    }
}

/// Key of an entry payload.
#[inline]
pub fn entry_key(id: &str) -> String {
    KeyRole::Entry.key(id)
}

/// Key of a tag's member-id set.
#[inline]
pub fn tag_members_key(tag: &str) -> String {
    KeyRole::TagMembers.key(tag)
}

/// Key of an id's member-tag set.
#[inline]
pub fn id_tags_key(id: &str) -> String {
    KeyRole::IdTags.key(id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout() {
        assert_eq!(entry_key("user:1"), "jg:k:user:1");
        assert_eq!(tag_members_key("users"), "jg:ti:users");
        assert_eq!(id_tags_key("user:1"), "jg:id_tags:user:1");
        assert_eq!(ALL_IDS, "jg:all_ids");
        assert_eq!(ALL_TAGS, "jg:all_tags");
    }

    #[test]
    fn test_roles_do_not_collide() {
        let name = "same";
        let keys = [
            KeyRole::Entry.key(name),
            KeyRole::TagMembers.key(name),
            KeyRole::IdTags.key(name),
        ];
        assert_ne!(keys[0], keys[1]);
        assert_ne!(keys[1], keys[2]);
        assert_ne!(keys[0], keys[2]);
        assert!(!keys.iter().any(|k| k == ALL_IDS || k == ALL_TAGS));
    }

    #[test]
    fn test_injective_within_role() {
        assert_ne!(entry_key("a"), entry_key("b"));
        assert_ne!(entry_key("ab"), entry_key("a"));
    }

    #[test]
    fn test_keys_batch() {
        let keys = KeyRole::TagMembers.keys(["a", "b"]);
        assert_eq!(keys, vec!["jg:ti:a".to_string(), "jg:ti:b".to_string()]);
    }
}
