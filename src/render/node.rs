//! Render nodes: the culler's output.
//!
//! A render node is one draw instance for one material pass. It never owns
//! what it points at: materials, meshes, geometries and animation state are
//! held through `Weak` handles and must be upgraded on use. A node is only
//! meaningful for the frame recorded in [`RenderNodeBase::frame`]; the culler
//! rebuilds every list each frame.

use std::sync::{Arc, Weak};

use glam::Affine3A;

use crate::errors::{EmberError, Result};
use crate::resources::bounds::BoundingSphere;
use crate::resources::material::{Material, Pass};
use crate::resources::mesh::{Mesh, SubmeshBuffers};
use crate::cache::gpu::BufferId;
use crate::scene::NodeHandle;
use crate::scene::animation::{MorphState, SkeletonState};
use crate::scene::billboard::BillboardList;
use crate::scene::geometry::Geometry;

/// Data shared by every render node kind.
#[derive(Debug, Clone)]
pub struct RenderNodeBase {
    /// Cull cycle that produced this node.
    pub frame: u64,
    pub pass: Weak<Pass>,
    pub material: Weak<Material>,
    /// Node the drawn object is attached to.
    pub scene_node: NodeHandle,
    /// World matrix of `scene_node` at collection time.
    pub world: Affine3A,
    /// World-space bounds used by the visibility test.
    pub bounds: BoundingSphere,
    /// The pass draws this instance through GPU instancing.
    pub instanced: bool,
}

impl RenderNodeBase {
    #[must_use]
    pub fn pass(&self) -> Option<Arc<Pass>> {
        self.pass.upgrade()
    }

    #[must_use]
    pub fn material(&self) -> Option<Arc<Material>> {
        self.material.upgrade()
    }

    #[must_use]
    pub fn pass_index(&self) -> Option<usize> {
        self.pass().map(|pass| pass.index())
    }
}

/// Animation payload of a submesh node.
#[derive(Debug, Clone)]
pub enum SubmeshKind {
    Static,
    Skinned(Weak<SkeletonState>),
    Morphing(Weak<MorphState>),
}

impl SubmeshKind {
    #[inline]
    #[must_use]
    pub fn is_static(&self) -> bool {
        matches!(self, SubmeshKind::Static)
    }
}

/// One submesh of one geometry, drawn with one pass.
#[derive(Debug, Clone)]
pub struct SubmeshRenderNode {
    pub base: RenderNodeBase,
    pub geometry_name: String,
    pub geometry: Weak<Geometry>,
    pub mesh: Weak<Mesh>,
    pub submesh: usize,
    pub buffers: SubmeshBuffers,
    pub kind: SubmeshKind,
}

impl SubmeshRenderNode {
    /// The source geometry, or [`EmberError::StaleReference`] once it is gone.
    pub fn geometry(&self) -> Result<Arc<Geometry>> {
        self.geometry.upgrade().ok_or_else(|| EmberError::StaleReference {
            kind: "Geometry",
            key: self.geometry_name.clone(),
        })
    }

    pub fn mesh(&self) -> Result<Arc<Mesh>> {
        self.mesh.upgrade().ok_or_else(|| EmberError::StaleReference {
            kind: "Mesh",
            key: self.geometry_name.clone(),
        })
    }

    /// Whether every referenced object is still alive.
    #[must_use]
    pub fn is_live(&self) -> bool {
        let animation_live = match &self.kind {
            SubmeshKind::Static => true,
            SubmeshKind::Skinned(skeleton) => skeleton.strong_count() > 0,
            SubmeshKind::Morphing(morph) => morph.strong_count() > 0,
        };
        animation_live
            && self.geometry.strong_count() > 0
            && self.mesh.strong_count() > 0
            && self.base.pass.strong_count() > 0
            && self.base.material.strong_count() > 0
    }
}

/// A billboard list drawn with one pass.
#[derive(Debug, Clone)]
pub struct BillboardRenderNode {
    pub base: RenderNodeBase,
    pub list_name: String,
    pub billboards: Weak<BillboardList>,
    pub buffer: BufferId,
    pub count: u32,
}

impl BillboardRenderNode {
    pub fn billboards(&self) -> Result<Arc<BillboardList>> {
        self.billboards.upgrade().ok_or_else(|| EmberError::StaleReference {
            kind: "BillboardList",
            key: self.list_name.clone(),
        })
    }

    #[must_use]
    pub fn is_live(&self) -> bool {
        self.billboards.strong_count() > 0
            && self.base.pass.strong_count() > 0
            && self.base.material.strong_count() > 0
    }
}
