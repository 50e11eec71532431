//! Animation state shared between geometries and render nodes.
//!
//! The animation system writes these every frame; render nodes only keep weak
//! handles to them.

use glam::Mat4;
use parking_lot::RwLock;

/// Current bone palette of a skinned geometry.
#[derive(Debug)]
pub struct SkeletonState {
    name: String,
    bone_matrices: RwLock<Vec<Mat4>>,
}

impl SkeletonState {
    #[must_use]
    pub fn new(name: impl Into<String>, bone_count: usize) -> Self {
        Self {
            name: name.into(),
            bone_matrices: RwLock::new(vec![Mat4::IDENTITY; bone_count]),
        }
    }

    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn bone_count(&self) -> usize {
        self.bone_matrices.read().len()
    }

    #[must_use]
    pub fn bone_matrices(&self) -> Vec<Mat4> {
        self.bone_matrices.read().clone()
    }

    pub fn set_bone_matrices(&self, matrices: Vec<Mat4>) {
        *self.bone_matrices.write() = matrices;
    }
}

/// Current morph target weights of a morphing geometry.
#[derive(Debug)]
pub struct MorphState {
    weights: RwLock<Vec<f32>>,
}

impl MorphState {
    #[must_use]
    pub fn new(target_count: usize) -> Self {
        Self {
            weights: RwLock::new(vec![0.0; target_count]),
        }
    }

    #[must_use]
    pub fn weights(&self) -> Vec<f32> {
        self.weights.read().clone()
    }

    /// Out-of-range targets are ignored.
    pub fn set_weight(&self, target: usize, weight: f32) {
        if let Some(slot) = self.weights.write().get_mut(target) {
            *slot = weight;
        }
    }
}
