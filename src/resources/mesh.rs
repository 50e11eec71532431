//! Meshes and their submeshes.
//!
//! A [`Mesh`] is a named list of [`Submesh`]es. Each submesh owns its CPU
//! geometry and, once the mesh is initialised on the render thread, a vertex
//! buffer and an optional index buffer.

use glam::Vec3;
use log::debug;
use parking_lot::Mutex;
use smallvec::SmallVec;

use crate::cache::gpu::{BufferId, GpuDevice, GpuResource};
use crate::cache::state::GpuStatus;
use crate::errors::Result;
use crate::resources::bounds::BoundingSphere;

/// Device buffers of one submesh.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubmeshBuffers {
    pub vertex: BufferId,
    pub index: Option<BufferId>,
    pub vertex_count: u32,
    pub index_count: u32,
}

#[derive(Debug)]
pub struct Submesh {
    positions: Vec<Vec3>,
    indices: Vec<u32>,
    bounds: BoundingSphere,
    buffers: Mutex<Option<SubmeshBuffers>>,
}

impl Submesh {
    #[must_use]
    pub fn new(positions: Vec<Vec3>, indices: Vec<u32>) -> Self {
        let bounds = BoundingSphere::from_points(&positions).unwrap_or_default();
        Self {
            positions,
            indices,
            bounds,
            buffers: Mutex::new(None),
        }
    }

    #[inline]
    #[must_use]
    pub fn positions(&self) -> &[Vec3] {
        &self.positions
    }

    #[inline]
    #[must_use]
    pub fn indices(&self) -> &[u32] {
        &self.indices
    }

    /// Object-space bounds.
    #[inline]
    #[must_use]
    pub fn bounds(&self) -> BoundingSphere {
        self.bounds
    }

    /// `None` until the owning mesh is `Ready`.
    #[must_use]
    pub fn buffers(&self) -> Option<SubmeshBuffers> {
        *self.buffers.lock()
    }

    fn upload(&self, device: &dyn GpuDevice, label: &str) -> Result<SubmeshBuffers> {
        let vertex_bytes = (self.positions.len() * size_of::<Vec3>()) as u64;
        let vertex = device.create_buffer(label, vertex_bytes)?;
        let index = if self.indices.is_empty() {
            None
        } else {
            let index_bytes = (self.indices.len() * size_of::<u32>()) as u64;
            match device.create_buffer(label, index_bytes) {
                Ok(id) => Some(id),
                Err(err) => {
                    device.destroy_buffer(vertex);
                    return Err(err);
                }
            }
        };
        Ok(SubmeshBuffers {
            vertex,
            index,
            vertex_count: self.positions.len() as u32,
            index_count: self.indices.len() as u32,
        })
    }

    fn release(&self, device: &dyn GpuDevice) {
        if let Some(buffers) = self.buffers.lock().take() {
            device.destroy_buffer(buffers.vertex);
            if let Some(index) = buffers.index {
                device.destroy_buffer(index);
            }
        }
    }
}

/// Named mesh. Most meshes have a single submesh.
#[derive(Debug)]
pub struct Mesh {
    label: String,
    submeshes: SmallVec<[Submesh; 1]>,
    bounds: BoundingSphere,
    status: GpuStatus,
}

impl Mesh {
    #[must_use]
    pub fn new(label: impl Into<String>, submeshes: impl IntoIterator<Item = Submesh>) -> Self {
        let submeshes: SmallVec<[Submesh; 1]> = submeshes.into_iter().collect();
        let bounds = submeshes
            .iter()
            .map(Submesh::bounds)
            .reduce(|acc, b| acc.merged(&b))
            .unwrap_or_default();
        Self {
            label: label.into(),
            submeshes,
            bounds,
            status: GpuStatus::new(),
        }
    }

    #[inline]
    #[must_use]
    pub fn submeshes(&self) -> &[Submesh] {
        &self.submeshes
    }

    #[inline]
    #[must_use]
    pub fn submesh(&self, index: usize) -> Option<&Submesh> {
        self.submeshes.get(index)
    }

    #[inline]
    #[must_use]
    pub fn bounds(&self) -> BoundingSphere {
        self.bounds
    }
}

impl GpuResource for Mesh {
    fn label(&self) -> &str {
        &self.label
    }

    fn status(&self) -> &GpuStatus {
        &self.status
    }

    fn initialise(&self, device: &dyn GpuDevice) -> Result<()> {
        let mut uploaded = Vec::with_capacity(self.submeshes.len());
        for submesh in &self.submeshes {
            match submesh.upload(device, &self.label) {
                Ok(buffers) => uploaded.push(buffers),
                Err(err) => {
                    // All or nothing: a half-uploaded mesh is never drawn.
                    for buffers in uploaded {
                        device.destroy_buffer(buffers.vertex);
                        if let Some(index) = buffers.index {
                            device.destroy_buffer(index);
                        }
                    }
                    return Err(err);
                }
            }
        }
        for (submesh, buffers) in self.submeshes.iter().zip(uploaded) {
            *submesh.buffers.lock() = Some(buffers);
        }
        debug!("Mesh '{}' uploaded ({} submeshes)", self.label, self.submeshes.len());
        Ok(())
    }

    fn cleanup(&self, device: &dyn GpuDevice) {
        for submesh in &self.submeshes {
            submesh.release(device);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::gpu::HeadlessDevice;

    fn triangle() -> Submesh {
        Submesh::new(
            vec![Vec3::ZERO, Vec3::X, Vec3::Y],
            vec![0, 1, 2],
        )
    }

    #[test]
    fn test_initialise_uploads_every_submesh() {
        let device = HeadlessDevice::new();
        let mesh = Mesh::new("tri", [triangle(), Submesh::new(vec![Vec3::Z], Vec::new())]);

        mesh.initialise(&device).unwrap();
        let first = mesh.submesh(0).unwrap().buffers().unwrap();
        assert_eq!(first.index_count, 3);
        assert!(mesh.submesh(1).unwrap().buffers().unwrap().index.is_none());
        assert_eq!(device.live_objects(), 3);

        mesh.cleanup(&device);
        assert_eq!(device.live_objects(), 0);
        assert!(mesh.submesh(0).unwrap().buffers().is_none());
    }

    #[test]
    fn test_failed_initialise_leaves_nothing_behind() {
        let device = HeadlessDevice::new();
        device.fail_on("tri");
        let mesh = Mesh::new("tri", [triangle()]);

        assert!(mesh.initialise(&device).is_err());
        assert_eq!(device.live_objects(), 0);
        assert!(mesh.submesh(0).unwrap().buffers().is_none());
    }
}
