#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

pub mod cache;
pub mod engine;
pub mod errors;
pub mod render;
pub mod resources;
pub mod scene;

pub use cache::{
    GpuDevice, GpuInitScheduler, GpuResource, GpuStatus, HeadlessDevice, MergeDefault, MergePolicy,
    ObjectCache, ResourceCache, ResourceState,
};
pub use engine::{Engine, EngineSettings, FrameReport};
pub use errors::{EmberError, Result};
pub use render::{BillboardRenderNode, CullerKind, SceneCuller, SubmeshRenderNode};
pub use resources::{BoundingSphere, Material, Mesh, Parameters, PassDesc, Submesh};
pub use scene::{BillboardList, Camera, Geometry, Light, NodeHandle, Projection, Scene, Transform};
