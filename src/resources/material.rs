//! Materials and their render passes.
//!
//! A [`Material`] is an ordered list of [`Pass`]es; the culler emits one
//! render node per pass. Pass parameters are fixed at construction, so a
//! material change is expressed by assigning another material to the
//! geometry.

use std::sync::Arc;

use log::debug;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::cache::gpu::{BufferId, GpuDevice, GpuResource};
use crate::cache::state::GpuStatus;
use crate::errors::Result;

/// Size of one pass's uniform block on the device.
const PASS_UNIFORM_SIZE: u64 = 256;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BlendMode {
    #[default]
    NoBlend,
    Additive,
    Multiplicative,
    Interpolative,
}

/// Construction parameters of a [`Pass`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PassDesc {
    pub opacity: f32,
    pub blend: BlendMode,
    pub instancing: bool,
    pub two_sided: bool,
}

impl Default for PassDesc {
    fn default() -> Self {
        Self {
            opacity: 1.0,
            blend: BlendMode::NoBlend,
            instancing: false,
            two_sided: false,
        }
    }
}

impl PassDesc {
    #[must_use]
    pub fn with_opacity(mut self, opacity: f32) -> Self {
        self.opacity = opacity.clamp(0.0, 1.0);
        self
    }

    #[must_use]
    pub fn with_blend(mut self, blend: BlendMode) -> Self {
        self.blend = blend;
        self
    }

    #[must_use]
    pub fn with_instancing(mut self, instancing: bool) -> Self {
        self.instancing = instancing;
        self
    }

    #[must_use]
    pub fn with_two_sided(mut self, two_sided: bool) -> Self {
        self.two_sided = two_sided;
        self
    }
}

#[derive(Debug)]
pub struct Pass {
    index: usize,
    desc: PassDesc,
    uniforms: Mutex<Option<BufferId>>,
}

impl Pass {
    #[inline]
    #[must_use]
    pub fn index(&self) -> usize {
        self.index
    }

    #[inline]
    #[must_use]
    pub fn desc(&self) -> &PassDesc {
        &self.desc
    }

    /// Alpha-blended or not fully opaque.
    #[inline]
    #[must_use]
    pub fn is_transparent(&self) -> bool {
        self.desc.blend != BlendMode::NoBlend || self.desc.opacity < 1.0
    }

    #[inline]
    #[must_use]
    pub fn instancing_enabled(&self) -> bool {
        self.desc.instancing
    }

    /// `None` until the owning material is `Ready`.
    #[must_use]
    pub fn uniforms(&self) -> Option<BufferId> {
        *self.uniforms.lock()
    }
}

#[derive(Debug)]
pub struct Material {
    label: String,
    passes: Vec<Arc<Pass>>,
    status: GpuStatus,
}

impl Material {
    /// A material with one pass per descriptor, in order.
    #[must_use]
    pub fn new(label: impl Into<String>, passes: impl IntoIterator<Item = PassDesc>) -> Self {
        let passes = passes
            .into_iter()
            .enumerate()
            .map(|(index, desc)| {
                Arc::new(Pass {
                    index,
                    desc,
                    uniforms: Mutex::new(None),
                })
            })
            .collect();
        Self {
            label: label.into(),
            passes,
            status: GpuStatus::new(),
        }
    }

    /// Single default opaque pass.
    #[must_use]
    pub fn opaque(label: impl Into<String>) -> Self {
        Self::new(label, [PassDesc::default()])
    }

    #[inline]
    #[must_use]
    pub fn passes(&self) -> &[Arc<Pass>] {
        &self.passes
    }

    #[must_use]
    pub fn has_transparency(&self) -> bool {
        self.passes.iter().any(|pass| pass.is_transparent())
    }

    fn release(&self, device: &dyn GpuDevice) {
        for pass in &self.passes {
            if let Some(id) = pass.uniforms.lock().take() {
                device.destroy_buffer(id);
            }
        }
    }
}

impl GpuResource for Material {
    fn label(&self) -> &str {
        &self.label
    }

    fn status(&self) -> &GpuStatus {
        &self.status
    }

    fn initialise(&self, device: &dyn GpuDevice) -> Result<()> {
        for pass in &self.passes {
            match device.create_buffer(&self.label, PASS_UNIFORM_SIZE) {
                Ok(id) => *pass.uniforms.lock() = Some(id),
                Err(err) => {
                    self.release(device);
                    return Err(err);
                }
            }
        }
        debug!("Material '{}' initialised ({} passes)", self.label, self.passes.len());
        Ok(())
    }

    fn cleanup(&self, device: &dyn GpuDevice) {
        self.release(device);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::gpu::HeadlessDevice;

    #[test]
    fn test_pass_transparency() {
        let material = Material::new(
            "glass",
            [
                PassDesc::default(),
                PassDesc::default().with_opacity(0.5),
                PassDesc::default().with_blend(BlendMode::Additive),
            ],
        );
        let flags: Vec<bool> = material.passes().iter().map(|p| p.is_transparent()).collect();
        assert_eq!(flags, vec![false, true, true]);
        assert!(material.has_transparency());
        assert!(!Material::opaque("plain").has_transparency());
    }

    #[test]
    fn test_initialise_allocates_pass_uniforms() {
        let device = HeadlessDevice::new();
        let material = Material::new("two", [PassDesc::default(), PassDesc::default()]);

        material.initialise(&device).unwrap();
        assert!(material.passes().iter().all(|p| p.uniforms().is_some()));
        assert_eq!(device.live_objects(), 2);

        material.cleanup(&device);
        assert_eq!(device.live_objects(), 0);
    }
}
