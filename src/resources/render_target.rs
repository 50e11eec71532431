use parking_lot::Mutex;

use crate::cache::gpu::{GpuDevice, GpuResource, TextureId};
use crate::cache::state::GpuStatus;
use crate::errors::{EmberError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderTargetTextures {
    pub color: TextureId,
    pub depth: Option<TextureId>,
}

/// Named off-screen colour target with an optional depth attachment.
#[derive(Debug)]
pub struct RenderTarget {
    label: String,
    width: u32,
    height: u32,
    with_depth: bool,
    status: GpuStatus,
    textures: Mutex<Option<RenderTargetTextures>>,
}

impl RenderTarget {
    #[must_use]
    pub fn new(label: impl Into<String>, width: u32, height: u32, with_depth: bool) -> Self {
        Self {
            label: label.into(),
            width,
            height,
            with_depth,
            status: GpuStatus::new(),
            textures: Mutex::new(None),
        }
    }

    #[inline]
    #[must_use]
    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    #[must_use]
    pub fn textures(&self) -> Option<RenderTargetTextures> {
        *self.textures.lock()
    }
}

impl GpuResource for RenderTarget {
    fn label(&self) -> &str {
        &self.label
    }

    fn status(&self) -> &GpuStatus {
        &self.status
    }

    fn initialise(&self, device: &dyn GpuDevice) -> Result<()> {
        if self.width == 0 || self.height == 0 {
            return Err(EmberError::GpuInitFailed {
                name: self.label.clone(),
                reason: format!("zero-sized target {}x{}", self.width, self.height),
            });
        }
        let color = device.create_texture(&self.label, self.width, self.height)?;
        let depth = if self.with_depth {
            match device.create_texture(&self.label, self.width, self.height) {
                Ok(id) => Some(id),
                Err(err) => {
                    device.destroy_texture(color);
                    return Err(err);
                }
            }
        } else {
            None
        };
        *self.textures.lock() = Some(RenderTargetTextures { color, depth });
        Ok(())
    }

    fn cleanup(&self, device: &dyn GpuDevice) {
        if let Some(textures) = self.textures.lock().take() {
            device.destroy_texture(textures.color);
            if let Some(depth) = textures.depth {
                device.destroy_texture(depth);
            }
        }
    }
}
