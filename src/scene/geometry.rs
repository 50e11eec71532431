use std::sync::Arc;

use parking_lot::RwLock;
use smallvec::SmallVec;

use crate::resources::material::Material;
use crate::resources::mesh::Mesh;
use crate::scene::animation::{MorphState, SkeletonState};

/// How a geometry's vertices are animated.
#[derive(Debug, Clone, Default)]
pub enum GeometryAnimation {
    #[default]
    Static,
    Skinned(Arc<SkeletonState>),
    Morphing(Arc<MorphState>),
}

type MaterialSlots = SmallVec<[Option<Arc<Material>>; 1]>;

/// A placed instance of a mesh, with one material slot per submesh.
///
/// A submesh whose slot is empty is not drawn.
#[derive(Debug)]
pub struct Geometry {
    name: String,
    mesh: Arc<Mesh>,
    materials: RwLock<MaterialSlots>,
    animation: RwLock<GeometryAnimation>,
}

impl Geometry {
    /// Geometry with every submesh slot empty.
    #[must_use]
    pub fn new(name: impl Into<String>, mesh: Arc<Mesh>) -> Self {
        let slots = smallvec::smallvec![None; mesh.submeshes().len()];
        Self {
            name: name.into(),
            mesh,
            materials: RwLock::new(slots),
            animation: RwLock::new(GeometryAnimation::Static),
        }
    }

    /// Geometry with `material` in every submesh slot.
    #[must_use]
    pub fn with_material(name: impl Into<String>, mesh: Arc<Mesh>, material: &Arc<Material>) -> Self {
        let geometry = Self::new(name, mesh);
        geometry
            .materials
            .write()
            .iter_mut()
            .for_each(|slot| *slot = Some(Arc::clone(material)));
        geometry
    }

    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    #[must_use]
    pub fn mesh(&self) -> &Arc<Mesh> {
        &self.mesh
    }

    #[must_use]
    pub fn material(&self, submesh: usize) -> Option<Arc<Material>> {
        self.materials.read().get(submesh).cloned().flatten()
    }

    /// Assigns (or clears) the material of one submesh. Returns `false` for
    /// an out-of-range index.
    pub fn set_material(&self, submesh: usize, material: Option<Arc<Material>>) -> bool {
        match self.materials.write().get_mut(submesh) {
            Some(slot) => {
                *slot = material;
                true
            }
            None => false,
        }
    }

    #[must_use]
    pub fn animation(&self) -> GeometryAnimation {
        self.animation.read().clone()
    }

    pub fn set_animation(&self, animation: GeometryAnimation) {
        *self.animation.write() = animation;
    }
}
