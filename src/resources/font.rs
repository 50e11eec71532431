use parking_lot::Mutex;

use crate::cache::gpu::{GpuDevice, GpuResource, TextureId};
use crate::cache::state::GpuStatus;
use crate::errors::Result;

/// Glyphs are packed into a square atlas with this many glyphs per row.
const GLYPHS_PER_ROW: u32 = 16;

/// Named font rasterised into a glyph atlas on the device.
#[derive(Debug)]
pub struct Font {
    label: String,
    family: String,
    pixel_height: u32,
    glyphs: Vec<char>,
    status: GpuStatus,
    atlas: Mutex<Option<TextureId>>,
}

impl Font {
    /// Font covering printable ASCII.
    #[must_use]
    pub fn new(label: impl Into<String>, family: impl Into<String>, pixel_height: u32) -> Self {
        Self::with_glyphs(label, family, pixel_height, (' '..='~').collect())
    }

    #[must_use]
    pub fn with_glyphs(
        label: impl Into<String>,
        family: impl Into<String>,
        pixel_height: u32,
        glyphs: Vec<char>,
    ) -> Self {
        Self {
            label: label.into(),
            family: family.into(),
            pixel_height,
            glyphs,
            status: GpuStatus::new(),
            atlas: Mutex::new(None),
        }
    }

    #[inline]
    #[must_use]
    pub fn family(&self) -> &str {
        &self.family
    }

    #[inline]
    #[must_use]
    pub fn pixel_height(&self) -> u32 {
        self.pixel_height
    }

    #[inline]
    #[must_use]
    pub fn glyphs(&self) -> &[char] {
        &self.glyphs
    }

    #[must_use]
    pub fn atlas(&self) -> Option<TextureId> {
        *self.atlas.lock()
    }

    /// Atlas dimensions in pixels.
    #[must_use]
    pub fn atlas_size(&self) -> (u32, u32) {
        let count = self.glyphs.len() as u32;
        let rows = count.div_ceil(GLYPHS_PER_ROW).max(1);
        (GLYPHS_PER_ROW * self.pixel_height, rows * self.pixel_height)
    }
}

impl GpuResource for Font {
    fn label(&self) -> &str {
        &self.label
    }

    fn status(&self) -> &GpuStatus {
        &self.status
    }

    fn initialise(&self, device: &dyn GpuDevice) -> Result<()> {
        let (width, height) = self.atlas_size();
        *self.atlas.lock() = Some(device.create_texture(&self.label, width, height)?);
        Ok(())
    }

    fn cleanup(&self, device: &dyn GpuDevice) {
        if let Some(id) = self.atlas.lock().take() {
            device.destroy_texture(id);
        }
    }
}
