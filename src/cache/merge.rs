//! Collision policies for [`ObjectCache::merge`](super::ObjectCache::merge).

use std::sync::Arc;

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::cache::resource_cache::CacheKey;
use crate::errors::EmberError;

/// How a single key collision is settled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution<K> {
    /// Keep the destination's object; the incoming one is dropped.
    KeepExisting,
    /// Replace the destination's object with the incoming one.
    KeepIncoming,
    /// Insert the incoming object under another key.
    RenameIncoming(K),
    /// Leave the collision unresolved; the key is skipped.
    Decline,
}

/// A key present on both sides of a merge.
pub struct Collision<'a, K, T> {
    pub key: &'a K,
    pub existing: &'a Arc<T>,
    pub incoming: &'a Arc<T>,
    entries: &'a FxHashMap<K, Arc<T>>,
}

impl<'a, K: CacheKey, T> Collision<'a, K, T> {
    pub(crate) fn new(
        key: &'a K,
        existing: &'a Arc<T>,
        incoming: &'a Arc<T>,
        entries: &'a FxHashMap<K, Arc<T>>,
    ) -> Self {
        Self {
            key,
            existing,
            incoming,
            entries,
        }
    }

    /// Whether `key` is already used in the destination cache.
    #[must_use]
    pub fn is_taken(&self, key: &K) -> bool {
        self.entries.contains_key(key)
    }
}

type ResolveFn<K, T> = dyn Fn(&Collision<'_, K, T>) -> Resolution<K> + Send + Sync;

/// Caller-supplied merger deciding each collision.
///
/// The policy runs while the destination cache is locked and must not call
/// back into it.
pub struct MergePolicy<K, T> {
    resolve: Box<ResolveFn<K, T>>,
}

impl<K: CacheKey, T> MergePolicy<K, T> {
    pub fn new(resolve: impl Fn(&Collision<'_, K, T>) -> Resolution<K> + Send + Sync + 'static) -> Self {
        Self {
            resolve: Box::new(resolve),
        }
    }

    #[must_use]
    pub fn keep_existing() -> Self {
        Self::new(|_| Resolution::KeepExisting)
    }

    #[must_use]
    pub fn keep_incoming() -> Self {
        Self::new(|_| Resolution::KeepIncoming)
    }

    #[must_use]
    pub fn decline() -> Self {
        Self::new(|_| Resolution::Decline)
    }

    pub(crate) fn resolve(&self, collision: &Collision<'_, K, T>) -> Resolution<K> {
        (self.resolve)(collision)
    }
}

impl<T> MergePolicy<String, T> {
    /// Renames the incoming object to `{prefix}_{key}`, repeating the prefix
    /// until the key is free.
    #[must_use]
    pub fn rename_with_prefix(prefix: impl Into<String>) -> Self {
        let prefix = prefix.into();
        Self::new(move |collision| {
            let mut renamed = format!("{prefix}_{}", collision.key);
            while collision.is_taken(&renamed) {
                renamed = format!("{prefix}_{renamed}");
            }
            Resolution::RenameIncoming(renamed)
        })
    }

    /// Builds the policy described by an engine-level default. `source` is
    /// the name of whatever the incoming objects come from (usually a scene).
    #[must_use]
    pub fn from_default(default: &MergeDefault, source: &str) -> Self {
        match default {
            MergeDefault::KeepExisting => Self::keep_existing(),
            MergeDefault::KeepIncoming => Self::keep_incoming(),
            MergeDefault::RenameWithPrefix(prefix) => Self::rename_with_prefix(prefix.clone()),
            MergeDefault::RenameWithSourceName => Self::rename_with_prefix(source),
        }
    }
}

/// Skipping the incoming object is the default when no policy is given.
impl<K: CacheKey, T> Default for MergePolicy<K, T> {
    fn default() -> Self {
        Self::keep_existing()
    }
}

/// Serializable choice of default merge policy for string-keyed caches.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum MergeDefault {
    #[default]
    KeepExisting,
    KeepIncoming,
    RenameWithPrefix(String),
    /// Prefix colliding keys with the name of the merged-in source.
    RenameWithSourceName,
}

/// Outcome of one cache merge.
#[derive(Debug)]
pub struct MergeReport<K> {
    /// Keys absent in the destination, moved over with their attachment.
    pub grafted: Vec<K>,
    /// Collisions settled in favour of the destination.
    pub kept_existing: Vec<K>,
    /// Collisions where the incoming object replaced the destination's.
    pub replaced: Vec<K>,
    /// Collisions settled by renaming: `(original, new)`.
    pub renamed: Vec<(K, K)>,
    /// Collisions left unresolved ([`EmberError::DuplicateKeyUnresolved`]).
    pub unresolved: Vec<EmberError>,
}

impl<K> Default for MergeReport<K> {
    fn default() -> Self {
        Self {
            grafted: Vec::new(),
            kept_existing: Vec::new(),
            replaced: Vec::new(),
            renamed: Vec::new(),
            unresolved: Vec::new(),
        }
    }
}

impl<K> MergeReport<K> {
    /// Whether every key was merged or settled.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.unresolved.is_empty()
    }
}
