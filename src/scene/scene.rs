//! Scene container.
//!
//! A [`Scene`] owns its [`SceneGraph`] and one [`ObjectCache`] per kind of
//! scene object. Everything is reachable through `&Scene`, so a scene can be
//! shared across threads behind an `Arc`.
//!
//! # Frame boundary
//!
//! Structural changes that must not race a cull are queued with
//! [`Scene::post_change`] and applied by [`Scene::flush_changes`], which the
//! engine calls at the start of each frame.

use std::convert::Infallible;
use std::sync::Arc;

use log::{debug, error, info};
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use rustc_hash::FxHashSet;
use uuid::Uuid;

use crate::cache::merge::{MergeDefault, MergePolicy, MergeReport};
use crate::cache::object_cache::ObjectCache;
use crate::cache::scheduler::GpuInitScheduler;
use crate::errors::{EmberError, Result};
use crate::resources::material::Material;
use crate::resources::mesh::Mesh;
use crate::scene::NodeHandle;
use crate::scene::billboard::BillboardList;
use crate::scene::camera::{Camera, Frustum, Projection};
use crate::scene::geometry::Geometry;
use crate::scene::graph::SceneGraph;
use crate::scene::light::Light;

type SceneChange = Box<dyn FnOnce(&Scene) + Send>;

/// Per-cache outcome of [`Scene::merge`].
#[derive(Debug, Default)]
pub struct SceneMergeReport {
    /// Nodes moved into this scene's graph.
    pub nodes: usize,
    pub cameras: MergeReport<String>,
    pub lights: MergeReport<String>,
    pub geometries: MergeReport<String>,
    pub billboards: MergeReport<String>,
}

impl SceneMergeReport {
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.cameras.is_complete()
            && self.lights.is_complete()
            && self.geometries.is_complete()
            && self.billboards.is_complete()
    }
}

pub struct Scene {
    id: Uuid,
    name: String,
    graph: RwLock<SceneGraph>,

    cameras: ObjectCache<Camera>,
    lights: ObjectCache<Light>,
    geometries: ObjectCache<Geometry>,
    billboards: ObjectCache<BillboardList>,

    active_camera: RwLock<Option<String>>,
    merge_default: MergeDefault,

    changes_tx: flume::Sender<SceneChange>,
    changes_rx: flume::Receiver<SceneChange>,
}

impl Scene {
    /// Scene without GPU scheduling: billboard lists stay `Unloaded` unless
    /// scheduled by hand.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self::build(name.into(), None, MergeDefault::default())
    }

    /// Scene whose GPU-backed objects are scheduled on `scheduler` when
    /// created and released from it on [`Scene::cleanup`].
    #[must_use]
    pub fn with_scheduler(
        name: impl Into<String>,
        scheduler: Arc<GpuInitScheduler>,
        merge_default: MergeDefault,
    ) -> Self {
        Self::build(name.into(), Some(scheduler), merge_default)
    }

    fn build(name: String, scheduler: Option<Arc<GpuInitScheduler>>, merge_default: MergeDefault) -> Self {
        let mut billboards = ObjectCache::new("BillboardList");
        if let Some(scheduler) = scheduler {
            let init = Arc::clone(&scheduler);
            billboards = billboards
                .with_initialiser(move |list: &Arc<BillboardList>| {
                    init.schedule_init(list.clone());
                })
                .with_cleaner(move |list: &Arc<BillboardList>| {
                    scheduler.schedule_cleanup(list.clone());
                });
        }

        let (changes_tx, changes_rx) = flume::unbounded();
        debug!("Created scene '{name}'");
        Self {
            id: Uuid::new_v4(),
            name,
            graph: RwLock::new(SceneGraph::new()),
            cameras: ObjectCache::new("Camera"),
            lights: ObjectCache::new("Light"),
            geometries: ObjectCache::new("Geometry"),
            billboards,
            active_camera: RwLock::new(None),
            merge_default,
            changes_tx,
            changes_rx,
        }
    }

    #[inline]
    #[must_use]
    pub fn id(&self) -> Uuid {
        self.id
    }

    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    // ========================================================================
    // Graph
    // ========================================================================

    pub fn graph(&self) -> RwLockReadGuard<'_, SceneGraph> {
        self.graph.read()
    }

    /// Direct graph access. Prefer [`Scene::post_change`] while frames are
    /// being culled.
    pub fn graph_mut(&self) -> RwLockWriteGuard<'_, SceneGraph> {
        self.graph.write()
    }

    #[must_use]
    pub fn root_node(&self) -> NodeHandle {
        self.graph.read().root()
    }

    /// Creates a node under the root.
    pub fn create_node(&self, name: impl Into<String>) -> NodeHandle {
        self.graph.write().create_node(name)
    }

    pub fn create_child(&self, name: impl Into<String>, parent: NodeHandle) -> Result<NodeHandle> {
        self.graph.write().create_child(name, parent)
    }

    /// Removes a node with its subtree and detaches every object hanging
    /// from it. The objects stay in their caches. Returns how many objects
    /// were detached.
    pub fn remove_node(&self, handle: NodeHandle) -> Result<usize> {
        let removed: FxHashSet<NodeHandle> = self.graph.write().remove_subtree(handle)?.into_iter().collect();

        let detached = self.cameras.detach_from_nodes(&removed).len()
            + self.lights.detach_from_nodes(&removed).len()
            + self.geometries.detach_from_nodes(&removed).len()
            + self.billboards.detach_from_nodes(&removed).len();
        debug!(
            "Scene '{}': removed {} nodes, detached {} objects",
            self.name,
            removed.len(),
            detached
        );
        Ok(detached)
    }

    /// Brings world matrices and node flags up to date.
    pub fn update(&self) {
        if self.graph.read().is_dirty() {
            self.graph.write().update_transforms();
        }
    }

    // ========================================================================
    // Object caches
    // ========================================================================

    #[inline]
    #[must_use]
    pub fn cameras(&self) -> &ObjectCache<Camera> {
        &self.cameras
    }

    #[inline]
    #[must_use]
    pub fn lights(&self) -> &ObjectCache<Light> {
        &self.lights
    }

    #[inline]
    #[must_use]
    pub fn geometries(&self) -> &ObjectCache<Geometry> {
        &self.geometries
    }

    #[inline]
    #[must_use]
    pub fn billboards(&self) -> &ObjectCache<BillboardList> {
        &self.billboards
    }

    pub fn create_camera(&self, name: impl Into<String>, node: NodeHandle, projection: Projection) -> Result<Arc<Camera>> {
        self.cameras
            .create(name.into(), node, |key| Ok::<_, Infallible>(Camera::new(key.clone(), projection)))
    }

    pub fn create_light(&self, light: Light, node: NodeHandle) -> Result<Arc<Light>> {
        self.lights
            .create(light.name.clone(), node, move |_| Ok::<_, Infallible>(light))
    }

    /// Creates a geometry of `mesh` with `material` in every submesh slot.
    pub fn create_geometry(
        &self,
        name: impl Into<String>,
        node: NodeHandle,
        mesh: Arc<Mesh>,
        material: Option<&Arc<Material>>,
    ) -> Result<Arc<Geometry>> {
        self.geometries.create(name.into(), node, |key| {
            Ok::<_, Infallible>(match material {
                Some(material) => Geometry::with_material(key.clone(), mesh, material),
                None => Geometry::new(key.clone(), mesh),
            })
        })
    }

    pub fn create_billboards(&self, list: BillboardList, node: NodeHandle) -> Result<Arc<BillboardList>> {
        self.billboards
            .create(list.name().to_string(), node, move |_| Ok::<_, Infallible>(list))
    }

    // ========================================================================
    // Cameras
    // ========================================================================

    pub fn set_active_camera(&self, name: &str) -> Result<()> {
        if !self.cameras.contains(name) {
            return Err(EmberError::CameraNotFound(name.to_string()));
        }
        *self.active_camera.write() = Some(name.to_string());
        Ok(())
    }

    #[must_use]
    pub fn active_camera(&self) -> Option<String> {
        self.active_camera.read().clone()
    }

    /// World-space frustum of the named camera.
    pub fn camera_frustum(&self, name: &str) -> Result<Frustum> {
        let camera = self
            .cameras
            .find(name)
            .ok_or_else(|| EmberError::CameraNotFound(name.to_string()))?;
        let node = self.cameras.parent_of(name).ok_or(EmberError::NodeNotFound)?;

        self.update();
        let graph = self.graph.read();
        let world = graph.node(node).ok_or(EmberError::NodeNotFound)?.world_matrix();
        Ok(camera.frustum(world))
    }

    pub fn active_frustum(&self) -> Result<Frustum> {
        let name = self
            .active_camera()
            .ok_or_else(|| EmberError::CameraNotFound("<no active camera>".to_string()))?;
        self.camera_frustum(&name)
    }

    // ========================================================================
    // Deferred changes
    // ========================================================================

    /// Queues `change` to run at the next [`Scene::flush_changes`].
    pub fn post_change(&self, change: impl FnOnce(&Scene) + Send + 'static) {
        if let Err(e) = self.changes_tx.send(Box::new(change)) {
            error!("Failed to queue scene change: {e}");
        }
    }

    /// Applies the queued changes in posting order. Changes posted while
    /// flushing wait for the next flush. Returns how many ran.
    pub fn flush_changes(&self) -> usize {
        let count = self.changes_rx.len();
        let mut applied = 0;
        for _ in 0..count {
            let Ok(change) = self.changes_rx.try_recv() else {
                break;
            };
            change(self);
            applied += 1;
        }
        applied
    }

    #[must_use]
    pub fn pending_changes(&self) -> usize {
        self.changes_rx.len()
    }

    // ========================================================================
    // Merge & teardown
    // ========================================================================

    /// Moves `other`'s nodes under this scene's root and merges every object
    /// cache, settling key collisions with this scene's merge default.
    /// `other` ends empty.
    pub fn merge(&self, other: &Scene) -> Result<SceneMergeReport> {
        if std::ptr::eq(self, other) {
            return Ok(SceneMergeReport::default());
        }

        let remap = {
            // Graph locks are taken in scene id order so that opposite
            // merges running at once cannot deadlock.
            let (mut graph, mut incoming) = if self.id < other.id {
                let graph = self.graph.write();
                (graph, other.graph.write())
            } else {
                let incoming = other.graph.write();
                (self.graph.write(), incoming)
            };
            let root = graph.root();
            graph.graft(&mut incoming, root)?
        };
        let remap_node = |handle: NodeHandle| remap.get(&handle).copied();

        let report = SceneMergeReport {
            nodes: remap.len().saturating_sub(1),
            cameras: self
                .cameras
                .merge_remapped(&other.cameras, &self.merge_policy(other), remap_node),
            lights: self
                .lights
                .merge_remapped(&other.lights, &self.merge_policy(other), remap_node),
            geometries: self
                .geometries
                .merge_remapped(&other.geometries, &self.merge_policy(other), remap_node),
            billboards: self
                .billboards
                .merge_remapped(&other.billboards, &self.merge_policy(other), remap_node),
        };
        *other.active_camera.write() = None;

        info!(
            "Merged scene '{}' into '{}' ({} nodes)",
            other.name, self.name, report.nodes
        );
        Ok(report)
    }

    /// Detaches every object and runs each cache's cleaner.
    pub fn cleanup(&self) {
        self.cameras.cleanup();
        self.lights.cleanup();
        self.geometries.cleanup();
        self.billboards.cleanup();
    }

    /// Empties every object cache and resets the graph.
    pub fn clear(&self) {
        self.cameras.clear();
        self.lights.clear();
        self.geometries.clear();
        self.billboards.clear();
        *self.active_camera.write() = None;
        *self.graph.write() = SceneGraph::new();
    }

    fn merge_policy<T>(&self, other: &Scene) -> MergePolicy<String, T> {
        MergePolicy::from_default(&self.merge_default, &other.name)
    }
}

impl std::fmt::Debug for Scene {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scene")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("nodes", &self.graph.read().len())
            .field("cameras", &self.cameras.len())
            .field("lights", &self.lights.len())
            .field("geometries", &self.geometries.len())
            .field("billboards", &self.billboards.len())
            .finish_non_exhaustive()
    }
}
