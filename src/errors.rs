//! Error Types
//!
//! This module defines the error types used by the resource caches, the GPU
//! initialisation scheduler and the scene layer.
//!
//! # Overview
//!
//! The main error type [`EmberError`] covers:
//! - Resource production failures (a producer returned an error)
//! - Scene attachment conflicts
//! - Merge collisions a policy declined to resolve
//! - Stale observer references
//! - Render-thread affinity violations
//!
//! # Usage
//!
//! All public APIs return [`Result<T>`] which is an alias for `std::result::Result<T, EmberError>`.
//!
//! ```rust,ignore
//! use ember::errors::{EmberError, Result};
//!
//! fn fetch_mesh(engine: &Engine) -> Result<()> {
//!     let mesh = engine.meshes().add("cube".into(), |_| build_cube())?;
//!     Ok(())
//! }
//! ```

use thiserror::Error;

/// The main error type for the Ember engine.
///
/// Cache-level errors are always returned synchronously to the calling
/// thread. The culler never returns per-instance errors; it drops the
/// offending instance from the frame instead.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EmberError {
    // ========================================================================
    // Cache Errors
    // ========================================================================
    /// A producer failed to build the resource. No entry was inserted.
    #[error("Failed to produce {kind} '{key}': {reason}")]
    ProductionFailed {
        /// Object type name of the cache (e.g. "Mesh")
        kind: &'static str,
        /// The requested key
        key: String,
        /// The producer's error message
        reason: String,
    },

    /// The object is attached to a different scene node; detach it first.
    #[error("{kind} '{key}' is already attached to another scene node")]
    AlreadyAttached {
        /// Object type name of the cache
        kind: &'static str,
        /// The object key
        key: String,
    },

    /// A merge collision the merge policy declined to resolve.
    #[error("Unresolved duplicate {kind} '{key}' during merge")]
    DuplicateKeyUnresolved {
        /// Object type name of the cache
        kind: &'static str,
        /// The colliding key
        key: String,
    },

    /// An observer accessed an object that has since left its cache.
    #[error("Stale reference to {kind} '{key}'")]
    StaleReference {
        /// Object type name of the cache
        kind: &'static str,
        /// The key the observer was tracking
        key: String,
    },

    // ========================================================================
    // Scene Errors
    // ========================================================================
    /// The scene node handle does not belong to the graph (or was removed).
    #[error("Scene node not found")]
    NodeNotFound,

    /// Re-parenting would make a node its own ancestor, or move the root.
    #[error("Invalid scene hierarchy: {0}")]
    InvalidHierarchy(&'static str),

    /// The camera key is not present in the scene's camera cache.
    #[error("Camera not found: {0}")]
    CameraNotFound(String),

    // ========================================================================
    // GPU Scheduling Errors
    // ========================================================================
    /// A render-thread-only operation was invoked from another thread.
    #[error("GPU work must run on the render thread")]
    NotRenderThread,

    /// Reported by a resource's GPU initialisation.
    #[error("GPU initialisation of '{name}' failed: {reason}")]
    GpuInitFailed {
        /// Resource name
        name: String,
        /// Backend-provided reason
        reason: String,
    },

    // ========================================================================
    // Producer Registry Errors
    // ========================================================================
    /// No mesh generator registered under this type name.
    #[error("Unknown mesh generator: {0}")]
    UnknownGenerator(String),
}

impl EmberError {
    /// Builds a [`EmberError::ProductionFailed`] from any displayable producer error.
    pub(crate) fn production_failed(
        kind: &'static str,
        key: &impl std::fmt::Display,
        reason: &impl std::fmt::Display,
    ) -> Self {
        EmberError::ProductionFailed {
            kind,
            key: key.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// Alias for `Result<T, EmberError>`.
pub type Result<T> = std::result::Result<T, EmberError>;
