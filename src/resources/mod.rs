//! Named engine assets
//!
//! Resources held by the engine-level caches. Every type here is GPU-backed
//! and implements [`GpuResource`](crate::cache::GpuResource):
//! - Mesh: submeshes with CPU geometry, bounds and device buffers
//! - Material: ordered render passes
//! - Sampler, RenderTarget, Font
//!
//! Also hosts the mesh generator registry and bounding volumes.

pub mod bounds;
pub mod font;
pub mod generator;
pub mod material;
pub mod mesh;
pub mod render_target;
pub mod sampler;

pub use bounds::{BoundingBox, BoundingSphere};
pub use font::Font;
pub use generator::{GeneratorRegistry, MeshGenerator, Parameters};
pub use material::{BlendMode, Material, Pass, PassDesc};
pub use mesh::{Mesh, Submesh, SubmeshBuffers};
pub use render_target::{RenderTarget, RenderTargetTextures};
pub use sampler::{FilterMode, Sampler, SamplerDesc, WrapMode};
