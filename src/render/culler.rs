//! Per-frame scene culler.
//!
//! Each cycle runs three steps:
//!
//! 1. **Collect**: walk the scene's geometries and billboard lists and build
//!    one render node per (instance, pass). Only objects attached to a
//!    displayable, visible node whose mesh and material are `Ready` are
//!    collected. Nodes go to the `all_*` lists, bucketed by
//!    {opaque, transparent} × {submesh, billboard}.
//! 2. **Visibility**: an instanced node always passes; any other node passes
//!    when its world bounds intersect the frustum. A node whose referents
//!    died since Collect is dropped.
//! 3. **Emit**: the `culled_*` lists hold this cycle's survivors.
//!
//! Every list is cleared at the start of a cycle; nothing carries over
//! between frames. The [`CullerKind::InstantiatedDummy`] variant skips the
//! visibility step and copies `all_*` into `culled_*` unchanged.

use std::sync::{Arc, Weak};

use log::trace;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::cache::gpu::GpuResource;
use crate::errors::Result;
use crate::render::node::{BillboardRenderNode, RenderNodeBase, SubmeshKind, SubmeshRenderNode};
use crate::scene::Scene;
use crate::scene::camera::Frustum;
use crate::scene::geometry::GeometryAnimation;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CullerKind {
    /// Per-instance frustum test.
    #[default]
    Frustum,
    /// Every collected node is visible.
    InstantiatedDummy,
}

/// Sizes of the four render node lists.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ListCounts {
    pub opaque_submeshes: usize,
    pub transparent_submeshes: usize,
    pub opaque_billboards: usize,
    pub transparent_billboards: usize,
}

impl ListCounts {
    #[must_use]
    pub fn total(&self) -> usize {
        self.opaque_submeshes + self.transparent_submeshes + self.opaque_billboards + self.transparent_billboards
    }
}

/// Outcome of one cull cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CullStats {
    pub frame: u64,
    pub collected: ListCounts,
    pub visible: ListCounts,
    /// Collected submesh nodes drawn through instancing.
    pub instanced: usize,
    /// Nodes whose referents died between Collect and Visibility.
    pub dropped: usize,
}

/// Instancing groups are keyed by (mesh, submesh index, pass) identity.
type InstanceKey = (usize, usize, usize);

trait Cullable: Clone {
    fn base(&self) -> &RenderNodeBase;
    fn is_live(&self) -> bool;
}

impl Cullable for SubmeshRenderNode {
    fn base(&self) -> &RenderNodeBase {
        &self.base
    }

    fn is_live(&self) -> bool {
        SubmeshRenderNode::is_live(self)
    }
}

impl Cullable for BillboardRenderNode {
    fn base(&self) -> &RenderNodeBase {
        &self.base
    }

    fn is_live(&self) -> bool {
        BillboardRenderNode::is_live(self)
    }
}

pub struct SceneCuller {
    kind: CullerKind,
    frame: u64,

    all_opaque_submeshes: Vec<SubmeshRenderNode>,
    all_transparent_submeshes: Vec<SubmeshRenderNode>,
    all_opaque_billboards: Vec<BillboardRenderNode>,
    all_transparent_billboards: Vec<BillboardRenderNode>,

    culled_opaque_submeshes: Vec<SubmeshRenderNode>,
    culled_transparent_submeshes: Vec<SubmeshRenderNode>,
    culled_opaque_billboards: Vec<BillboardRenderNode>,
    culled_transparent_billboards: Vec<BillboardRenderNode>,

    instance_counts: FxHashMap<InstanceKey, u32>,
    stats: CullStats,
}

impl SceneCuller {
    #[must_use]
    pub fn new(kind: CullerKind) -> Self {
        Self {
            kind,
            frame: 0,
            all_opaque_submeshes: Vec::new(),
            all_transparent_submeshes: Vec::new(),
            all_opaque_billboards: Vec::new(),
            all_transparent_billboards: Vec::new(),
            culled_opaque_submeshes: Vec::new(),
            culled_transparent_submeshes: Vec::new(),
            culled_opaque_billboards: Vec::new(),
            culled_transparent_billboards: Vec::new(),
            instance_counts: FxHashMap::default(),
            stats: CullStats::default(),
        }
    }

    #[inline]
    #[must_use]
    pub fn kind(&self) -> CullerKind {
        self.kind
    }

    /// Number of completed cycles.
    #[inline]
    #[must_use]
    pub fn frame(&self) -> u64 {
        self.frame
    }

    #[inline]
    #[must_use]
    pub fn stats(&self) -> &CullStats {
        &self.stats
    }

    /// Runs one cycle against `frustum`. The dummy variant ignores it.
    pub fn cull(&mut self, scene: &Scene, frustum: &Frustum) -> &CullStats {
        self.frame += 1;
        scene.update();
        self.collect(scene);

        match self.kind {
            CullerKind::Frustum => self.test_visibility(frustum),
            CullerKind::InstantiatedDummy => self.copy_all(),
        }

        self.stats.frame = self.frame;
        self.stats.collected = self.all_counts();
        self.stats.visible = self.culled_counts();
        trace!(
            "Cull frame {}: {} collected, {} visible, {} dropped",
            self.frame,
            self.stats.collected.total(),
            self.stats.visible.total(),
            self.stats.dropped
        );
        &self.stats
    }

    /// Runs one cycle with the scene's active camera.
    ///
    /// The frustum variant fails with
    /// [`EmberError::CameraNotFound`](crate::errors::EmberError::CameraNotFound)
    /// when the scene has no usable active camera; the dummy variant does not
    /// need one.
    pub fn cull_active_camera(&mut self, scene: &Scene) -> Result<&CullStats> {
        let frustum = match self.kind {
            CullerKind::Frustum => scene.active_frustum()?,
            CullerKind::InstantiatedDummy => scene.active_frustum().unwrap_or_default(),
        };
        Ok(self.cull(scene, &frustum))
    }

    // ========================================================================
    // Output
    // ========================================================================

    #[must_use]
    pub fn all_opaque_submeshes(&self) -> &[SubmeshRenderNode] {
        &self.all_opaque_submeshes
    }

    #[must_use]
    pub fn all_transparent_submeshes(&self) -> &[SubmeshRenderNode] {
        &self.all_transparent_submeshes
    }

    #[must_use]
    pub fn all_opaque_billboards(&self) -> &[BillboardRenderNode] {
        &self.all_opaque_billboards
    }

    #[must_use]
    pub fn all_transparent_billboards(&self) -> &[BillboardRenderNode] {
        &self.all_transparent_billboards
    }

    #[must_use]
    pub fn culled_opaque_submeshes(&self) -> &[SubmeshRenderNode] {
        &self.culled_opaque_submeshes
    }

    #[must_use]
    pub fn culled_transparent_submeshes(&self) -> &[SubmeshRenderNode] {
        &self.culled_transparent_submeshes
    }

    #[must_use]
    pub fn culled_opaque_billboards(&self) -> &[BillboardRenderNode] {
        &self.culled_opaque_billboards
    }

    #[must_use]
    pub fn culled_transparent_billboards(&self) -> &[BillboardRenderNode] {
        &self.culled_transparent_billboards
    }

    // ========================================================================
    // Cycle steps
    // ========================================================================

    fn clear(&mut self) {
        self.all_opaque_submeshes.clear();
        self.all_transparent_submeshes.clear();
        self.all_opaque_billboards.clear();
        self.all_transparent_billboards.clear();
        self.culled_opaque_submeshes.clear();
        self.culled_transparent_submeshes.clear();
        self.culled_opaque_billboards.clear();
        self.culled_transparent_billboards.clear();
        self.instance_counts.clear();
        self.stats = CullStats::default();
    }

    fn collect(&mut self, scene: &Scene) {
        self.clear();
        let frame = self.frame;
        let graph = scene.graph();

        for entry in scene.geometries().snapshot_attached() {
            let Some(parent) = entry.parent else {
                continue;
            };
            let Some(node) = graph.node(parent) else {
                continue;
            };
            if !node.is_displayable() || !node.is_visible() {
                continue;
            }
            let geometry = &entry.object;
            let mesh = geometry.mesh();
            if !mesh.status().is_ready() {
                continue;
            }

            let world = *node.world_matrix();
            let kind = match geometry.animation() {
                GeometryAnimation::Static => SubmeshKind::Static,
                GeometryAnimation::Skinned(skeleton) => SubmeshKind::Skinned(Arc::downgrade(&skeleton)),
                GeometryAnimation::Morphing(morph) => SubmeshKind::Morphing(Arc::downgrade(&morph)),
            };

            for (index, submesh) in mesh.submeshes().iter().enumerate() {
                let Some(material) = geometry.material(index) else {
                    continue;
                };
                if !material.status().is_ready() {
                    continue;
                }
                let Some(buffers) = submesh.buffers() else {
                    continue;
                };
                let bounds = submesh.bounds().transformed(&world);

                for pass in material.passes() {
                    if kind.is_static() && pass.instancing_enabled() {
                        let key = instance_key(Arc::as_ptr(mesh), index, Arc::as_ptr(pass));
                        *self.instance_counts.entry(key).or_default() += 1;
                    }

                    let render_node = SubmeshRenderNode {
                        base: RenderNodeBase {
                            frame,
                            pass: Arc::downgrade(pass),
                            material: Arc::downgrade(&material),
                            scene_node: parent,
                            world,
                            bounds,
                            instanced: false,
                        },
                        geometry_name: entry.key.clone(),
                        geometry: Arc::downgrade(geometry),
                        mesh: Arc::downgrade(mesh),
                        submesh: index,
                        buffers,
                        kind: kind.clone(),
                    };
                    if pass.is_transparent() {
                        self.all_transparent_submeshes.push(render_node);
                    } else {
                        self.all_opaque_submeshes.push(render_node);
                    }
                }
            }
        }

        for entry in scene.billboards().snapshot_attached() {
            let Some(parent) = entry.parent else {
                continue;
            };
            let Some(node) = graph.node(parent) else {
                continue;
            };
            if !node.is_displayable() || !node.is_visible() {
                continue;
            }
            let list = &entry.object;
            if !list.status().is_ready() {
                continue;
            }
            let Some(material) = list.material() else {
                continue;
            };
            if !material.status().is_ready() {
                continue;
            }
            let Some(buffer) = list.buffer() else {
                continue;
            };

            let world = *node.world_matrix();
            let bounds = list.bounds().transformed(&world);
            for pass in material.passes() {
                let render_node = BillboardRenderNode {
                    base: RenderNodeBase {
                        frame,
                        pass: Arc::downgrade(pass),
                        material: Arc::downgrade(&material),
                        scene_node: parent,
                        world,
                        bounds,
                        instanced: false,
                    },
                    list_name: entry.key.clone(),
                    billboards: Arc::downgrade(list),
                    buffer,
                    count: list.positions().len() as u32,
                };
                if pass.is_transparent() {
                    self.all_transparent_billboards.push(render_node);
                } else {
                    self.all_opaque_billboards.push(render_node);
                }
            }
        }
        drop(graph);

        if !self.instance_counts.is_empty() {
            let counts = &self.instance_counts;
            let mut instanced = 0;
            for render_node in self
                .all_opaque_submeshes
                .iter_mut()
                .chain(self.all_transparent_submeshes.iter_mut())
            {
                let key = instance_key(
                    Weak::as_ptr(&render_node.mesh),
                    render_node.submesh,
                    Weak::as_ptr(&render_node.base.pass),
                );
                if counts.get(&key).is_some_and(|count| *count >= 2) {
                    render_node.base.instanced = true;
                    instanced += 1;
                }
            }
            self.stats.instanced = instanced;
        }
    }

    fn test_visibility(&mut self, frustum: &Frustum) {
        let mut dropped = 0;
        filter_visible(&self.all_opaque_submeshes, &mut self.culled_opaque_submeshes, frustum, &mut dropped);
        filter_visible(
            &self.all_transparent_submeshes,
            &mut self.culled_transparent_submeshes,
            frustum,
            &mut dropped,
        );
        filter_visible(&self.all_opaque_billboards, &mut self.culled_opaque_billboards, frustum, &mut dropped);
        filter_visible(
            &self.all_transparent_billboards,
            &mut self.culled_transparent_billboards,
            frustum,
            &mut dropped,
        );
        self.stats.dropped = dropped;
    }

    fn copy_all(&mut self) {
        self.culled_opaque_submeshes.clone_from(&self.all_opaque_submeshes);
        self.culled_transparent_submeshes.clone_from(&self.all_transparent_submeshes);
        self.culled_opaque_billboards.clone_from(&self.all_opaque_billboards);
        self.culled_transparent_billboards.clone_from(&self.all_transparent_billboards);
    }

    fn all_counts(&self) -> ListCounts {
        ListCounts {
            opaque_submeshes: self.all_opaque_submeshes.len(),
            transparent_submeshes: self.all_transparent_submeshes.len(),
            opaque_billboards: self.all_opaque_billboards.len(),
            transparent_billboards: self.all_transparent_billboards.len(),
        }
    }

    fn culled_counts(&self) -> ListCounts {
        ListCounts {
            opaque_submeshes: self.culled_opaque_submeshes.len(),
            transparent_submeshes: self.culled_transparent_submeshes.len(),
            opaque_billboards: self.culled_opaque_billboards.len(),
            transparent_billboards: self.culled_transparent_billboards.len(),
        }
    }
}

fn instance_key<M, P>(mesh: *const M, submesh: usize, pass: *const P) -> InstanceKey {
    (mesh as usize, submesh, pass as usize)
}

fn filter_visible<N: Cullable>(all: &[N], culled: &mut Vec<N>, frustum: &Frustum, dropped: &mut usize) {
    for render_node in all {
        if !render_node.is_live() {
            *dropped += 1;
            continue;
        }
        let base = render_node.base();
        if base.instanced || frustum.intersects(&base.bounds) {
            culled.push(render_node.clone());
        }
    }
}
