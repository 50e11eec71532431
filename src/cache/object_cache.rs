//! Scene object cache.
//!
//! [`ObjectCache`] is a [`ResourceCache`] whose objects are also attached to
//! a node of a [`SceneGraph`](crate::scene::SceneGraph). The attachment is a
//! non-owning back-reference (`key → NodeHandle`); an object is attached to
//! at most one node at a time and must be detached before it can move.
//!
//! Lock order: the entry lock (inside [`ResourceCache`]) is always taken
//! before the attachment lock.

use std::borrow::Borrow;
use std::fmt;
use std::hash::Hash;
use std::sync::Arc;

use log::{debug, warn};
use parking_lot::Mutex;
use rustc_hash::{FxHashMap, FxHashSet};

use crate::cache::merge::{Collision, MergePolicy, MergeReport, Resolution};
use crate::cache::resource_cache::{CacheKey, ResourceCache};
use crate::errors::{EmberError, Result};
use crate::scene::NodeHandle;

type AttachHook<T> = Box<dyn Fn(&Arc<T>, NodeHandle) + Send + Sync>;

/// A live object together with its current scene attachment.
pub struct AttachedObject<K, T> {
    pub key: K,
    pub object: Arc<T>,
    pub parent: Option<NodeHandle>,
}

/// [`ResourceCache`] plus scene-node attachment and merge semantics.
pub struct ObjectCache<T, K = String> {
    objects: ResourceCache<T, K>,
    attachments: Mutex<FxHashMap<K, NodeHandle>>,
    attacher: Option<AttachHook<T>>,
    detacher: Option<AttachHook<T>>,
    merger: MergePolicy<K, T>,
}

impl<T, K: CacheKey> ObjectCache<T, K> {
    #[must_use]
    pub fn new(kind: &'static str) -> Self {
        Self {
            objects: ResourceCache::new(kind),
            attachments: Mutex::new(FxHashMap::default()),
            attacher: None,
            detacher: None,
            merger: MergePolicy::default(),
        }
    }

    #[must_use]
    pub fn with_initialiser(mut self, initialiser: impl Fn(&Arc<T>) + Send + Sync + 'static) -> Self {
        self.objects = self.objects.with_initialiser(initialiser);
        self
    }

    #[must_use]
    pub fn with_cleaner(mut self, cleaner: impl Fn(&Arc<T>) + Send + Sync + 'static) -> Self {
        self.objects = self.objects.with_cleaner(cleaner);
        self
    }

    /// Hook run after an object is attached to a node.
    #[must_use]
    pub fn with_attacher(mut self, attacher: impl Fn(&Arc<T>, NodeHandle) + Send + Sync + 'static) -> Self {
        self.attacher = Some(Box::new(attacher));
        self
    }

    /// Hook run after an object is detached from a node.
    #[must_use]
    pub fn with_detacher(mut self, detacher: impl Fn(&Arc<T>, NodeHandle) + Send + Sync + 'static) -> Self {
        self.detacher = Some(Box::new(detacher));
        self
    }

    /// Merger used by [`ObjectCache::merge`].
    #[must_use]
    pub fn with_merger(mut self, merger: MergePolicy<K, T>) -> Self {
        self.merger = merger;
        self
    }

    #[inline]
    #[must_use]
    pub fn kind(&self) -> &'static str {
        self.objects.kind()
    }

    /// Returns the object under `key`, producing it if absent, attached to `node`.
    ///
    /// Fails with [`EmberError::AlreadyAttached`] when the object exists and
    /// is attached to a different node.
    pub fn create<F, E>(&self, key: K, node: NodeHandle, producer: F) -> Result<Arc<T>>
    where
        F: FnOnce(&K) -> std::result::Result<T, E>,
        E: fmt::Display,
    {
        if let Some(parent) = self.parent_of(&key)
            && parent != node
        {
            return Err(self.already_attached(&key));
        }

        let object = self.objects.add(key.clone(), producer)?;
        self.attach_object(&key, &object, node)?;
        Ok(object)
    }

    /// Attaches an existing object to `node`.
    ///
    /// Attaching to the node it already hangs from is a no-op.
    pub fn attach(&self, key: &K, node: NodeHandle) -> Result<()> {
        let Some(object) = self.objects.find(key) else {
            return Err(EmberError::StaleReference {
                kind: self.kind(),
                key: key.to_string(),
            });
        };
        self.attach_object(key, &object, node)
    }

    /// Detaches the object from its node, returning the former parent.
    pub fn detach<Q>(&self, key: &Q) -> Option<NodeHandle>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let parent = self.attachments.lock().remove(key)?;
        if let (Some(detacher), Some(object)) = (&self.detacher, self.objects.find(key)) {
            detacher(&object, parent);
        }
        Some(parent)
    }

    /// Detaches every object hanging from one of `nodes`. Returns the detached keys.
    pub fn detach_from_nodes(&self, nodes: &FxHashSet<NodeHandle>) -> Vec<K> {
        let detached: Vec<(K, NodeHandle)> = {
            let mut attachments = self.attachments.lock();
            let keys: Vec<K> = attachments
                .iter()
                .filter(|(_, parent)| nodes.contains(parent))
                .map(|(key, _)| key.clone())
                .collect();
            keys.into_iter()
                .filter_map(|key| attachments.remove(&key).map(|parent| (key, parent)))
                .collect()
        };

        if let Some(detacher) = &self.detacher {
            for (key, parent) in &detached {
                if let Some(object) = self.objects.find(key) {
                    detacher(&object, *parent);
                }
            }
        }
        detached.into_iter().map(|(key, _)| key).collect()
    }

    #[must_use]
    pub fn parent_of<Q>(&self, key: &Q) -> Option<NodeHandle>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.attachments.lock().get(key).copied()
    }

    /// Keys of the objects attached to `node`.
    #[must_use]
    pub fn attached_to(&self, node: NodeHandle) -> Vec<K> {
        self.attachments
            .lock()
            .iter()
            .filter(|(_, parent)| **parent == node)
            .map(|(key, _)| key.clone())
            .collect()
    }

    pub fn find<Q>(&self, key: &Q) -> Option<Arc<T>>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.objects.find(key)
    }

    pub fn contains<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.objects.contains(key)
    }

    /// Detaches and removes the object. Returns `false` if absent.
    pub fn remove<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.detach(key);
        self.objects.remove(key)
    }

    pub fn for_each(&self, visitor: impl FnMut(&K, &Arc<T>)) {
        self.objects.for_each(visitor);
    }

    /// Snapshot of every object with its attachment, taken while holding the
    /// entry lock and then the attachment lock.
    #[must_use]
    pub fn snapshot_attached(&self) -> Vec<AttachedObject<K, T>> {
        self.objects.read_entries(|entries| {
            let attachments = self.attachments.lock();
            entries
                .iter()
                .map(|(key, object)| AttachedObject {
                    key: key.clone(),
                    object: Arc::clone(object),
                    parent: attachments.get(key).copied(),
                })
                .collect()
        })
    }

    #[must_use]
    pub fn keys(&self) -> Vec<K> {
        self.objects.keys()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    #[must_use]
    pub fn version(&self) -> u64 {
        self.objects.version()
    }

    pub fn on_changed(&self, listener: impl Fn(u64) + Send + Sync + 'static) {
        self.objects.on_changed(listener);
    }

    /// Detaches every object and runs the cleaner on each, keeping the entries.
    pub fn cleanup(&self) {
        self.detach_all();
        self.objects.cleanup();
    }

    /// Detaches and removes every object.
    pub fn clear(&self) {
        self.detach_all();
        self.objects.clear();
    }

    /// Moves every object of `other` into this cache using the stored merger.
    pub fn merge(&self, other: &ObjectCache<T, K>) -> MergeReport<K> {
        self.merge_remapped(other, &self.merger, Some)
    }

    /// Moves every object of `other` into this cache using `policy`.
    pub fn merge_with(&self, other: &ObjectCache<T, K>, policy: &MergePolicy<K, T>) -> MergeReport<K> {
        self.merge_remapped(other, policy, Some)
    }

    /// Merge where incoming attachments are translated by `remap`.
    ///
    /// Used when `other` belongs to another scene graph whose nodes were
    /// grafted into this one. `other` is left empty. A collision the policy
    /// declines, or whose rename target is taken, is reported as
    /// [`EmberError::DuplicateKeyUnresolved`]; the remaining keys still merge.
    pub fn merge_remapped(
        &self,
        other: &ObjectCache<T, K>,
        policy: &MergePolicy<K, T>,
        remap: impl Fn(NodeHandle) -> Option<NodeHandle>,
    ) -> MergeReport<K> {
        let incoming = other.objects.drain();
        let incoming_parents: FxHashMap<K, NodeHandle> = std::mem::take(&mut *other.attachments.lock());

        let mut report = MergeReport::default();
        let mut attached: Vec<(Arc<T>, NodeHandle)> = Vec::new();
        let mut detached: Vec<(Arc<T>, NodeHandle)> = Vec::new();
        let kind = self.kind();

        self.objects.with_entries(|entries| {
            let mut attachments = self.attachments.lock();

            for (key, object) in incoming {
                let parent = incoming_parents.get(&key).copied().and_then(&remap);

                let Some(existing) = entries.get(&key) else {
                    if let Some(parent) = parent {
                        attachments.insert(key.clone(), parent);
                        attached.push((Arc::clone(&object), parent));
                    }
                    entries.insert(key.clone(), object);
                    report.grafted.push(key);
                    continue;
                };

                let resolution = policy.resolve(&Collision::new(&key, existing, &object, entries));
                match resolution {
                    Resolution::KeepExisting => {
                        if let Some(parent) = parent {
                            detached.push((object, parent));
                        }
                        report.kept_existing.push(key);
                    }
                    Resolution::KeepIncoming => {
                        if let Some(previous) = entries.insert(key.clone(), Arc::clone(&object))
                            && let Some(old_parent) = attachments.remove(&key)
                        {
                            detached.push((previous, old_parent));
                        }
                        if let Some(parent) = parent {
                            attachments.insert(key.clone(), parent);
                            attached.push((object, parent));
                        }
                        report.replaced.push(key);
                    }
                    Resolution::RenameIncoming(renamed) if !entries.contains_key(&renamed) => {
                        if let Some(parent) = parent {
                            attachments.insert(renamed.clone(), parent);
                            attached.push((Arc::clone(&object), parent));
                        }
                        entries.insert(renamed.clone(), object);
                        report.renamed.push((key, renamed));
                    }
                    Resolution::RenameIncoming(_) | Resolution::Decline => {
                        warn!("Unresolved duplicate {kind} '{key}' skipped during merge");
                        if let Some(parent) = parent {
                            detached.push((object, parent));
                        }
                        report.unresolved.push(EmberError::DuplicateKeyUnresolved {
                            kind,
                            key: key.to_string(),
                        });
                    }
                }
            }
        });

        if let Some(attacher) = &self.attacher {
            for (object, parent) in &attached {
                attacher(object, *parent);
            }
        }
        if let Some(detacher) = &self.detacher {
            for (object, parent) in &detached {
                detacher(object, *parent);
            }
        }

        debug!(
            "Merged {kind}: {} grafted, {} kept, {} replaced, {} renamed, {} unresolved",
            report.grafted.len(),
            report.kept_existing.len(),
            report.replaced.len(),
            report.renamed.len(),
            report.unresolved.len()
        );
        report
    }

    fn attach_object(&self, key: &K, object: &Arc<T>, node: NodeHandle) -> Result<()> {
        {
            let mut attachments = self.attachments.lock();
            match attachments.get(key) {
                Some(parent) if *parent == node => return Ok(()),
                Some(_) => return Err(self.already_attached(key)),
                None => {
                    attachments.insert(key.clone(), node);
                }
            }
        }
        if let Some(attacher) = &self.attacher {
            attacher(object, node);
        }
        Ok(())
    }

    fn detach_all(&self) {
        let detached: Vec<(K, NodeHandle)> = self.attachments.lock().drain().collect();
        if let Some(detacher) = &self.detacher {
            for (key, parent) in &detached {
                if let Some(object) = self.objects.find(key) {
                    detacher(&object, *parent);
                }
            }
        }
    }

    fn already_attached(&self, key: &K) -> EmberError {
        EmberError::AlreadyAttached {
            kind: self.kind(),
            key: key.to_string(),
        }
    }
}
