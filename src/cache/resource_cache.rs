//! Named, thread-safe resource cache.
//!
//! [`ResourceCache`] maps a key to shared ownership of a resource and builds
//! missing resources lazily through a caller-supplied producer. Production
//! runs at most once per key even when many threads ask for the same absent
//! key at the same time:
//!
//! - The cache lock is only held for bounded bookkeeping (lookups, inserts,
//!   reference-count bumps), never while a producer runs.
//! - Each absent key being produced owns a *production slot*. Threads asking
//!   for the same key block on that slot and pick up the produced object
//!   when the owner finishes.
//! - A failed production retires its slot and inserts nothing, so the next
//!   `add` for the key retries.

use std::borrow::Borrow;
use std::fmt;
use std::hash::Hash;
use std::sync::Arc;

use log::{debug, warn};
use parking_lot::{Mutex, RwLock};
use rustc_hash::FxHashMap;

use crate::errors::{EmberError, Result};

/// Requirements on a cache key.
pub trait CacheKey: Eq + Hash + Clone + fmt::Display + Send + Sync + 'static {}

impl<K> CacheKey for K where K: Eq + Hash + Clone + fmt::Display + Send + Sync + 'static {}

/// Per-object hook stored on a cache instance.
pub(crate) type Hook<T> = Box<dyn Fn(&Arc<T>) + Send + Sync>;

type ChangeListener = Box<dyn Fn(u64) + Send + Sync>;
type ProductionSlot = Arc<Mutex<()>>;

struct CacheInner<K, T> {
    entries: FxHashMap<K, Arc<T>>,
    in_flight: FxHashMap<K, ProductionSlot>,
    version: u64,
}

impl<K, T> Default for CacheInner<K, T> {
    fn default() -> Self {
        Self {
            entries: FxHashMap::default(),
            in_flight: FxHashMap::default(),
            version: 0,
        }
    }
}

/// Retires a production slot when its producer unwinds.
struct RetireOnUnwind<'a, K: CacheKey, T> {
    inner: &'a Mutex<CacheInner<K, T>>,
    key: &'a K,
    slot: &'a ProductionSlot,
}

impl<K: CacheKey, T> Drop for RetireOnUnwind<'_, K, T> {
    fn drop(&mut self) {
        if !std::thread::panicking() {
            return;
        }
        let mut inner = self.inner.lock();
        if inner
            .in_flight
            .get(self.key)
            .is_some_and(|current| Arc::ptr_eq(current, self.slot))
        {
            inner.in_flight.remove(self.key);
        }
    }
}

/// Thread-safe `Key → Arc<T>` cache with at-most-once production per key.
pub struct ResourceCache<T, K = String> {
    kind: &'static str,
    inner: Mutex<CacheInner<K, T>>,
    initialiser: Option<Hook<T>>,
    cleaner: Option<Hook<T>>,
    listeners: RwLock<Vec<ChangeListener>>,
}

impl<T, K: CacheKey> ResourceCache<T, K> {
    /// Creates an empty cache. `kind` is the object type name used in logs and errors.
    #[must_use]
    pub fn new(kind: &'static str) -> Self {
        Self {
            kind,
            inner: Mutex::new(CacheInner::default()),
            initialiser: None,
            cleaner: None,
            listeners: RwLock::new(Vec::new()),
        }
    }

    /// Hook run once on every freshly produced object, outside the cache lock.
    #[must_use]
    pub fn with_initialiser(mut self, initialiser: impl Fn(&Arc<T>) + Send + Sync + 'static) -> Self {
        self.initialiser = Some(Box::new(initialiser));
        self
    }

    /// Hook run on every entry by [`ResourceCache::cleanup`].
    #[must_use]
    pub fn with_cleaner(mut self, cleaner: impl Fn(&Arc<T>) + Send + Sync + 'static) -> Self {
        self.cleaner = Some(Box::new(cleaner));
        self
    }

    #[inline]
    #[must_use]
    pub fn kind(&self) -> &'static str {
        self.kind
    }

    /// Returns the object stored under `key`, producing it first if absent.
    ///
    /// The producer is not invoked when the key is already present. A
    /// producer error is reported as [`EmberError::ProductionFailed`] and
    /// leaves no entry behind. A panicking producer unwinds to the caller,
    /// also without leaving an entry, and its production slot is retired.
    pub fn add<F, E>(&self, key: K, producer: F) -> Result<Arc<T>>
    where
        F: FnOnce(&K) -> std::result::Result<T, E>,
        E: fmt::Display,
    {
        let mut first_attempt = true;

        loop {
            let slot = {
                let mut inner = self.inner.lock();
                if let Some(existing) = inner.entries.get(&key) {
                    if first_attempt {
                        warn!("Duplicate {}: {}, returning the existing object", self.kind, key);
                    }
                    return Ok(Arc::clone(existing));
                }
                Arc::clone(inner.in_flight.entry(key.clone()).or_default())
            };
            first_attempt = false;

            let _production = slot.lock();
            {
                let inner = self.inner.lock();
                if let Some(existing) = inner.entries.get(&key) {
                    return Ok(Arc::clone(existing));
                }
                let still_registered = inner
                    .in_flight
                    .get(&key)
                    .is_some_and(|current| Arc::ptr_eq(current, &slot));
                if !still_registered {
                    // Retired by a failed production: register a fresh slot.
                    continue;
                }
            }

            let _retire = RetireOnUnwind {
                inner: &self.inner,
                key: &key,
                slot: &slot,
            };
            let produced = producer(&key);

            let object = {
                let mut inner = self.inner.lock();
                // Only the holder of the registered slot removes it.
                inner.in_flight.remove(&key);
                match produced {
                    Ok(value) => {
                        let object = Arc::new(value);
                        inner.entries.insert(key.clone(), Arc::clone(&object));
                        inner.version = inner.version.wrapping_add(1);
                        object
                    }
                    Err(err) => {
                        warn!("Failed to produce {} '{}': {}", self.kind, key, err);
                        return Err(EmberError::production_failed(self.kind, &key, &err));
                    }
                }
            };

            debug!("Created {}: {}", self.kind, key);
            if let Some(initialiser) = &self.initialiser {
                initialiser(&object);
            }
            self.notify();
            return Ok(object);
        }
    }

    /// Non-blocking lookup. Never invokes a producer.
    pub fn find<Q>(&self, key: &Q) -> Option<Arc<T>>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.inner.lock().entries.get(key).cloned()
    }

    pub fn contains<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.inner.lock().entries.contains_key(key)
    }

    /// Releases the cache's ownership of `key`. Returns `false` if absent.
    ///
    /// Outstanding `Arc`s held elsewhere keep the object alive.
    pub fn remove<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.take(key).is_some()
    }

    /// Like [`ResourceCache::remove`] but hands the removed object back.
    pub fn take<Q>(&self, key: &Q) -> Option<Arc<T>>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let removed = {
            let mut inner = self.inner.lock();
            let removed = inner.entries.remove(key);
            if removed.is_some() {
                inner.version = inner.version.wrapping_add(1);
            }
            removed
        };

        if removed.is_some() {
            debug!("Removed {} from cache", self.kind);
            self.notify();
        }
        removed
    }

    /// Visits a snapshot of the entries.
    ///
    /// The lock is released before the visitor runs, so the visitor may call
    /// back into the cache. It may therefore observe a state one step stale.
    pub fn for_each(&self, mut visitor: impl FnMut(&K, &Arc<T>)) {
        for (key, object) in &self.snapshot() {
            visitor(key, object);
        }
    }

    /// Copies the current entries out under the lock.
    #[must_use]
    pub fn snapshot(&self) -> Vec<(K, Arc<T>)> {
        self.inner
            .lock()
            .entries
            .iter()
            .map(|(key, object)| (key.clone(), Arc::clone(object)))
            .collect()
    }

    #[must_use]
    pub fn keys(&self) -> Vec<K> {
        self.inner.lock().entries.keys().cloned().collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.lock().entries.is_empty()
    }

    /// Incremented on every insert, removal, clear and merge.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.inner.lock().version
    }

    /// Registers a listener called with the new version after every change.
    ///
    /// Listeners run outside the cache lock, on the thread that made the change.
    pub fn on_changed(&self, listener: impl Fn(u64) + Send + Sync + 'static) {
        self.listeners.write().push(Box::new(listener));
    }

    /// Runs the cleaner hook on every entry without removing anything.
    pub fn cleanup(&self) {
        if let Some(cleaner) = &self.cleaner {
            for (_, object) in &self.snapshot() {
                cleaner(object);
            }
        }
    }

    /// Empties the cache.
    pub fn clear(&self) {
        let cleared = {
            let mut inner = self.inner.lock();
            let count = inner.entries.len();
            inner.entries.clear();
            inner.version = inner.version.wrapping_add(1);
            count
        };
        debug!("Cleared {} {} entries", cleared, self.kind);
        self.notify();
    }

    /// Runs `f` on the entry map under the lock and records a change.
    ///
    /// `f` must not call back into this cache.
    pub(crate) fn with_entries<R>(&self, f: impl FnOnce(&mut FxHashMap<K, Arc<T>>) -> R) -> R {
        let result = {
            let mut inner = self.inner.lock();
            let result = f(&mut inner.entries);
            inner.version = inner.version.wrapping_add(1);
            result
        };
        self.notify();
        result
    }

    /// Runs `f` on the entry map under the lock without recording a change.
    ///
    /// `f` must not call back into this cache.
    pub(crate) fn read_entries<R>(&self, f: impl FnOnce(&FxHashMap<K, Arc<T>>) -> R) -> R {
        f(&self.inner.lock().entries)
    }

    /// Removes and returns every entry.
    pub(crate) fn drain(&self) -> Vec<(K, Arc<T>)> {
        let drained: Vec<_> = {
            let mut inner = self.inner.lock();
            inner.version = inner.version.wrapping_add(1);
            inner.entries.drain().collect()
        };
        self.notify();
        drained
    }

    fn notify(&self) {
        let listeners = self.listeners.read();
        if listeners.is_empty() {
            return;
        }
        let version = self.version();
        for listener in listeners.iter() {
            listener(version);
        }
    }
}
