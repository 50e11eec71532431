//! Graphics backend seam.
//!
//! The caches never talk to a graphics API directly. GPU-backed resources
//! implement [`GpuResource`] and receive a [`GpuDevice`] when the scheduler
//! drains on the render thread.

use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use rustc_hash::FxHashSet;

use crate::cache::state::GpuStatus;
use crate::errors::{EmberError, Result};

/// Opaque id of a device buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferId(pub u64);

/// Opaque id of a device texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureId(pub u64);

/// Opaque id of a device sampler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SamplerId(pub u64);

/// Minimal device surface used by resource initialisers.
///
/// Implementations are only ever called from the render thread.
pub trait GpuDevice: Send + Sync {
    fn create_buffer(&self, label: &str, size: u64) -> Result<BufferId>;
    fn create_texture(&self, label: &str, width: u32, height: u32) -> Result<TextureId>;
    fn create_sampler(&self, label: &str) -> Result<SamplerId>;
    fn destroy_buffer(&self, id: BufferId);
    fn destroy_texture(&self, id: TextureId);
    fn destroy_sampler(&self, id: SamplerId);
}

/// A resource with a GPU side.
pub trait GpuResource: Send + Sync {
    /// Label used in logs and device debug names.
    fn label(&self) -> &str;

    fn status(&self) -> &GpuStatus;

    /// Creates the GPU-side objects. Called once per scheduling, on the render thread.
    fn initialise(&self, device: &dyn GpuDevice) -> Result<()>;

    /// Releases the GPU-side objects. Called on the render thread.
    fn cleanup(&self, device: &dyn GpuDevice);
}

/// Device without a graphics API behind it.
///
/// Hands out monotonically increasing ids and tracks which ones are alive.
/// Labels registered with [`HeadlessDevice::fail_on`] make every allocation
/// carrying that label fail, which is how tests exercise the `Failed` path.
#[derive(Debug, Default)]
pub struct HeadlessDevice {
    next_id: AtomicU64,
    live: Mutex<FxHashSet<u64>>,
    failing_labels: Mutex<FxHashSet<String>>,
}

impl HeadlessDevice {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes allocations for `label` fail until [`HeadlessDevice::heal`] is called.
    pub fn fail_on(&self, label: impl Into<String>) {
        self.failing_labels.lock().insert(label.into());
    }

    pub fn heal(&self, label: &str) {
        self.failing_labels.lock().remove(label);
    }

    /// Number of device objects currently alive.
    #[must_use]
    pub fn live_objects(&self) -> usize {
        self.live.lock().len()
    }

    fn allocate(&self, label: &str, what: &str) -> Result<u64> {
        if self.failing_labels.lock().contains(label) {
            return Err(EmberError::GpuInitFailed {
                name: label.to_string(),
                reason: format!("device refused {what} allocation"),
            });
        }
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        self.live.lock().insert(id);
        Ok(id)
    }

    fn release(&self, id: u64) {
        self.live.lock().remove(&id);
    }
}

impl GpuDevice for HeadlessDevice {
    fn create_buffer(&self, label: &str, _size: u64) -> Result<BufferId> {
        self.allocate(label, "buffer").map(BufferId)
    }

    fn create_texture(&self, label: &str, _width: u32, _height: u32) -> Result<TextureId> {
        self.allocate(label, "texture").map(TextureId)
    }

    fn create_sampler(&self, label: &str) -> Result<SamplerId> {
        self.allocate(label, "sampler").map(SamplerId)
    }

    fn destroy_buffer(&self, id: BufferId) {
        self.release(id.0);
    }

    fn destroy_texture(&self, id: TextureId) {
        self.release(id.0);
    }

    fn destroy_sampler(&self, id: SamplerId) {
        self.release(id.0);
    }
}
