//! Render node lists
//!
//! The culler turns a live [`Scene`](crate::scene::Scene) into per-frame
//! draw lists of [`SubmeshRenderNode`]s and [`BillboardRenderNode`]s. Drawing
//! them is the backend's job.

pub mod culler;
pub mod node;

pub use culler::{CullStats, CullerKind, ListCounts, SceneCuller};
pub use node::{BillboardRenderNode, RenderNodeBase, SubmeshKind, SubmeshRenderNode};
