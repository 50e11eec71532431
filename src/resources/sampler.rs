use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::cache::gpu::{GpuDevice, GpuResource, SamplerId};
use crate::cache::state::GpuStatus;
use crate::errors::Result;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FilterMode {
    Nearest,
    #[default]
    Linear,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WrapMode {
    #[default]
    Repeat,
    ClampToEdge,
    MirroredRepeat,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SamplerDesc {
    pub min_filter: FilterMode,
    pub mag_filter: FilterMode,
    pub wrap: WrapMode,
}

/// Named texture sampler.
#[derive(Debug)]
pub struct Sampler {
    label: String,
    desc: SamplerDesc,
    status: GpuStatus,
    handle: Mutex<Option<SamplerId>>,
}

impl Sampler {
    #[must_use]
    pub fn new(label: impl Into<String>, desc: SamplerDesc) -> Self {
        Self {
            label: label.into(),
            desc,
            status: GpuStatus::new(),
            handle: Mutex::new(None),
        }
    }

    #[inline]
    #[must_use]
    pub fn desc(&self) -> &SamplerDesc {
        &self.desc
    }

    #[must_use]
    pub fn handle(&self) -> Option<SamplerId> {
        *self.handle.lock()
    }
}

impl GpuResource for Sampler {
    fn label(&self) -> &str {
        &self.label
    }

    fn status(&self) -> &GpuStatus {
        &self.status
    }

    fn initialise(&self, device: &dyn GpuDevice) -> Result<()> {
        *self.handle.lock() = Some(device.create_sampler(&self.label)?);
        Ok(())
    }

    fn cleanup(&self, device: &dyn GpuDevice) {
        if let Some(id) = self.handle.lock().take() {
            device.destroy_sampler(id);
        }
    }
}
