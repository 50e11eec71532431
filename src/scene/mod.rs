//! Scene graph and scene objects
//!
//! - SceneGraph / SceneNode: hierarchy, TRS transforms, enabled/visible flags
//! - Camera + Frustum, Light, Geometry, BillboardList: objects attached to nodes
//! - SkeletonState / MorphState: animation state referenced by geometries
//! - Scene: owns the graph and one object cache per object kind

pub mod animation;
pub mod billboard;
pub mod camera;
pub mod geometry;
pub mod graph;
pub mod light;
pub mod node;
pub mod scene;
pub mod transform;

pub use animation::{MorphState, SkeletonState};
pub use billboard::BillboardList;
pub use camera::{Camera, Frustum, Projection};
pub use geometry::{Geometry, GeometryAnimation};
pub use graph::SceneGraph;
pub use light::{Light, LightKind};
pub use node::{NodeFlags, SceneNode};
pub use scene::{Scene, SceneMergeReport};
pub use transform::Transform;

use slotmap::new_key_type;

new_key_type! {
    /// Handle of a node inside one [`SceneGraph`].
    pub struct NodeHandle;
}
