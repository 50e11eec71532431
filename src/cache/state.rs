//! Resource lifecycle state.
//!
//! Every GPU-backed resource embeds a [`GpuStatus`]. Producer threads only
//! ever move it from `Unloaded` to `Initialising` (by scheduling); the
//! `Initialising → Ready | Failed` transition happens on the render thread
//! inside [`GpuInitScheduler::drain`](super::GpuInitScheduler::drain).

use std::sync::atomic::{AtomicU8, Ordering};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// Lifecycle of a named resource's GPU side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum ResourceState {
    Unloaded = 0,
    Initialising = 1,
    Ready = 2,
    Failed = 3,
}

impl ResourceState {
    #[inline]
    fn from_u8(value: u8) -> Self {
        match value {
            1 => ResourceState::Initialising,
            2 => ResourceState::Ready,
            3 => ResourceState::Failed,
            _ => ResourceState::Unloaded,
        }
    }
}

/// Atomic state cell plus the last failure message.
#[derive(Debug)]
pub struct GpuStatus {
    state: AtomicU8,
    failure: Mutex<Option<String>>,
}

impl GpuStatus {
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: AtomicU8::new(ResourceState::Unloaded as u8),
            failure: Mutex::new(None),
        }
    }

    #[inline]
    #[must_use]
    pub fn state(&self) -> ResourceState {
        ResourceState::from_u8(self.state.load(Ordering::Acquire))
    }

    #[inline]
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.state() == ResourceState::Ready
    }

    /// The message recorded by the last failed initialisation, if any.
    #[must_use]
    pub fn failure(&self) -> Option<String> {
        self.failure.lock().clone()
    }

    /// Atomically moves `from → to`. Returns `false` if the current state was not `from`.
    pub(crate) fn transition(&self, from: ResourceState, to: ResourceState) -> bool {
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub(crate) fn mark_ready(&self) {
        *self.failure.lock() = None;
        self.state.store(ResourceState::Ready as u8, Ordering::Release);
    }

    pub(crate) fn mark_failed(&self, reason: String) {
        *self.failure.lock() = Some(reason);
        self.state.store(ResourceState::Failed as u8, Ordering::Release);
    }

    pub(crate) fn reset(&self) {
        self.state
            .store(ResourceState::Unloaded as u8, Ordering::Release);
    }
}

impl Default for GpuStatus {
    fn default() -> Self {
        Self::new()
    }
}
