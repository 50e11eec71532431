use bitflags::bitflags;
use glam::Affine3A;

use crate::scene::NodeHandle;
use crate::scene::transform::Transform;

bitflags! {
    /// Per-node switches. Both default to on.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct NodeFlags: u8 {
        /// Disabled nodes and their subtrees are not displayable.
        const ENABLED = 1 << 0;
        /// Hidden nodes and their subtrees are not drawn.
        const VISIBLE = 1 << 1;
    }
}

impl Default for NodeFlags {
    fn default() -> Self {
        NodeFlags::ENABLED | NodeFlags::VISIBLE
    }
}

/// A node of a [`SceneGraph`](super::SceneGraph).
///
/// Objects (cameras, lights, geometries, billboards) are not stored on the
/// node; each object cache records which node an object hangs from.
///
/// # Resolved state
///
/// `world_matrix`, `displayable` and `visible` are derived from the node's
/// ancestors by [`SceneGraph::update_transforms`](super::SceneGraph::update_transforms).
/// A node is displayable when it is connected to the graph root through
/// enabled nodes only.
#[derive(Debug, Clone)]
pub struct SceneNode {
    pub(crate) name: String,
    pub(crate) parent: Option<NodeHandle>,
    pub(crate) children: Vec<NodeHandle>,
    pub transform: Transform,
    pub flags: NodeFlags,

    pub(crate) world_matrix: Affine3A,
    pub(crate) displayable: bool,
    pub(crate) visible: bool,
}

impl SceneNode {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            parent: None,
            children: Vec::new(),
            transform: Transform::IDENTITY,
            flags: NodeFlags::default(),
            world_matrix: Affine3A::IDENTITY,
            displayable: false,
            visible: false,
        }
    }

    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    #[must_use]
    pub fn parent(&self) -> Option<NodeHandle> {
        self.parent
    }

    #[inline]
    #[must_use]
    pub fn children(&self) -> &[NodeHandle] {
        &self.children
    }

    #[inline]
    #[must_use]
    pub fn world_matrix(&self) -> &Affine3A {
        &self.world_matrix
    }

    #[inline]
    #[must_use]
    pub fn is_displayable(&self) -> bool {
        self.displayable
    }

    /// Visible itself and through every ancestor.
    #[inline]
    #[must_use]
    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.flags.set(NodeFlags::ENABLED, enabled);
    }

    pub fn set_visible(&mut self, visible: bool) {
        self.flags.set(NodeFlags::VISIBLE, visible);
    }
}
