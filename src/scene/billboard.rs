use std::sync::Arc;

use glam::{Vec2, Vec3};
use parking_lot::{Mutex, RwLock};

use crate::cache::gpu::{BufferId, GpuDevice, GpuResource};
use crate::cache::state::GpuStatus;
use crate::errors::Result;
use crate::resources::bounds::BoundingSphere;
use crate::resources::material::Material;

/// Camera-facing quads sharing one material, drawn as a single list.
#[derive(Debug)]
pub struct BillboardList {
    name: String,
    positions: Vec<Vec3>,
    dimensions: Vec2,
    bounds: BoundingSphere,
    material: RwLock<Option<Arc<Material>>>,
    status: GpuStatus,
    buffer: Mutex<Option<BufferId>>,
}

impl BillboardList {
    #[must_use]
    pub fn new(name: impl Into<String>, positions: Vec<Vec3>, dimensions: Vec2) -> Self {
        let half_diagonal = dimensions.length() * 0.5;
        let bounds = BoundingSphere::from_points(&positions)
            .map(|sphere| BoundingSphere::new(sphere.center, sphere.radius + half_diagonal))
            .unwrap_or_default();
        Self {
            name: name.into(),
            positions,
            dimensions,
            bounds,
            material: RwLock::new(None),
            status: GpuStatus::new(),
            buffer: Mutex::new(None),
        }
    }

    #[must_use]
    pub fn with_material(self, material: Arc<Material>) -> Self {
        *self.material.write() = Some(material);
        self
    }

    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    #[must_use]
    pub fn positions(&self) -> &[Vec3] {
        &self.positions
    }

    #[inline]
    #[must_use]
    pub fn dimensions(&self) -> Vec2 {
        self.dimensions
    }

    /// Object-space bounds, quad extents included.
    #[inline]
    #[must_use]
    pub fn bounds(&self) -> BoundingSphere {
        self.bounds
    }

    #[must_use]
    pub fn material(&self) -> Option<Arc<Material>> {
        self.material.read().clone()
    }

    pub fn set_material(&self, material: Option<Arc<Material>>) {
        *self.material.write() = material;
    }

    /// Instance buffer; `None` until the list is `Ready`.
    #[must_use]
    pub fn buffer(&self) -> Option<BufferId> {
        *self.buffer.lock()
    }
}

impl GpuResource for BillboardList {
    fn label(&self) -> &str {
        &self.name
    }

    fn status(&self) -> &GpuStatus {
        &self.status
    }

    fn initialise(&self, device: &dyn GpuDevice) -> Result<()> {
        let size = (self.positions.len() * size_of::<Vec3>()) as u64;
        *self.buffer.lock() = Some(device.create_buffer(&self.name, size)?);
        Ok(())
    }

    fn cleanup(&self, device: &dyn GpuDevice) {
        if let Some(id) = self.buffer.lock().take() {
            device.destroy_buffer(id);
        }
    }
}
