//! Scene graph hierarchy.
//!
//! Nodes live in a `SlotMap` and reference each other by [`NodeHandle`].
//! Every graph has a root node that cannot be removed or re-parented. Nodes
//! outside the root's subtree (created detached, or detached later) keep
//! their own children but are never displayable.

use glam::Affine3A;
use log::debug;
use rustc_hash::FxHashMap;
use slotmap::SlotMap;

use crate::errors::{EmberError, Result};
use crate::scene::NodeHandle;
use crate::scene::node::{NodeFlags, SceneNode};

pub const ROOT_NODE_NAME: &str = "RootNode";

pub struct SceneGraph {
    nodes: SlotMap<NodeHandle, SceneNode>,
    root: NodeHandle,
    dirty: bool,
    version: u64,
}

impl Default for SceneGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl SceneGraph {
    #[must_use]
    pub fn new() -> Self {
        let mut nodes = SlotMap::with_key();
        let root = nodes.insert(SceneNode::new(ROOT_NODE_NAME));
        Self {
            nodes,
            root,
            dirty: true,
            version: 0,
        }
    }

    #[inline]
    #[must_use]
    pub fn root(&self) -> NodeHandle {
        self.root
    }

    /// Creates a node under the root.
    pub fn create_node(&mut self, name: impl Into<String>) -> NodeHandle {
        let handle = self.nodes.insert(SceneNode::new(name));
        self.link(handle, self.root);
        self.touch();
        handle
    }

    pub fn create_child(&mut self, name: impl Into<String>, parent: NodeHandle) -> Result<NodeHandle> {
        if !self.nodes.contains_key(parent) {
            return Err(EmberError::NodeNotFound);
        }
        let handle = self.nodes.insert(SceneNode::new(name));
        self.link(handle, parent);
        self.touch();
        Ok(handle)
    }

    /// Creates a node outside the root's subtree.
    pub fn create_detached(&mut self, name: impl Into<String>) -> NodeHandle {
        let handle = self.nodes.insert(SceneNode::new(name));
        self.touch();
        handle
    }

    #[inline]
    #[must_use]
    pub fn node(&self, handle: NodeHandle) -> Option<&SceneNode> {
        self.nodes.get(handle)
    }

    /// Mutable access; marks the graph for a transform update.
    pub fn node_mut(&mut self, handle: NodeHandle) -> Option<&mut SceneNode> {
        let node = self.nodes.get_mut(handle)?;
        self.dirty = true;
        self.version = self.version.wrapping_add(1);
        Some(node)
    }

    #[inline]
    #[must_use]
    pub fn contains(&self, handle: NodeHandle) -> bool {
        self.nodes.contains_key(handle)
    }

    /// Number of nodes, root included.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    #[must_use]
    pub fn find_by_name(&self, name: &str) -> Option<NodeHandle> {
        self.nodes
            .iter()
            .find(|(_, node)| node.name == name)
            .map(|(handle, _)| handle)
    }

    pub fn iter(&self) -> impl Iterator<Item = (NodeHandle, &SceneNode)> {
        self.nodes.iter()
    }

    /// Incremented on every structural or transform change.
    #[inline]
    #[must_use]
    pub fn version(&self) -> u64 {
        self.version
    }

    #[inline]
    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Moves `child` under `parent`.
    ///
    /// Fails with [`EmberError::InvalidHierarchy`] when `child` is the root or
    /// `parent` lies in `child`'s subtree.
    pub fn attach(&mut self, child: NodeHandle, parent: NodeHandle) -> Result<()> {
        if !self.nodes.contains_key(child) || !self.nodes.contains_key(parent) {
            return Err(EmberError::NodeNotFound);
        }
        if child == self.root {
            return Err(EmberError::InvalidHierarchy("the root node cannot be re-parented"));
        }
        if self.is_ancestor_or_self(child, parent) {
            return Err(EmberError::InvalidHierarchy(
                "a node cannot be attached inside its own subtree",
            ));
        }
        if self.nodes[child].parent == Some(parent) {
            return Ok(());
        }

        self.unlink(child);
        self.link(child, parent);
        self.touch();
        Ok(())
    }

    /// Cuts `child` from its parent. The subtree stays intact but is no
    /// longer displayable.
    pub fn detach(&mut self, child: NodeHandle) -> Result<()> {
        if !self.nodes.contains_key(child) {
            return Err(EmberError::NodeNotFound);
        }
        if child == self.root {
            return Err(EmberError::InvalidHierarchy("the root node cannot be detached"));
        }
        self.unlink(child);
        self.touch();
        Ok(())
    }

    /// Removes `handle` and its whole subtree. Returns the removed handles.
    pub fn remove_subtree(&mut self, handle: NodeHandle) -> Result<Vec<NodeHandle>> {
        if !self.nodes.contains_key(handle) {
            return Err(EmberError::NodeNotFound);
        }
        if handle == self.root {
            return Err(EmberError::InvalidHierarchy("the root node cannot be removed"));
        }

        self.unlink(handle);
        let removed = self.subtree(handle);
        for node in &removed {
            self.nodes.remove(*node);
        }
        self.touch();
        debug!("Removed {} scene nodes", removed.len());
        Ok(removed)
    }

    /// `handle` and every node below it, parents before children.
    #[must_use]
    pub fn subtree(&self, handle: NodeHandle) -> Vec<NodeHandle> {
        let mut out = Vec::new();
        let mut stack = vec![handle];
        while let Some(current) = stack.pop() {
            let Some(node) = self.nodes.get(current) else {
                continue;
            };
            out.push(current);
            stack.extend(node.children.iter().rev().copied());
        }
        out
    }

    /// Recomputes world matrices and the displayable/visible state of every
    /// node. No-op when nothing changed since the last update.
    pub fn update_transforms(&mut self) {
        if !self.dirty {
            return;
        }

        let tops: Vec<NodeHandle> = self
            .nodes
            .iter()
            .filter(|(_, node)| node.parent.is_none())
            .map(|(handle, _)| handle)
            .collect();

        let mut stack: Vec<(NodeHandle, Affine3A, bool, bool)> = Vec::with_capacity(self.nodes.len());
        for top in tops {
            stack.push((top, Affine3A::IDENTITY, top == self.root, true));
            while let Some((handle, parent_world, parent_displayable, parent_visible)) = stack.pop() {
                let Some(node) = self.nodes.get_mut(handle) else {
                    continue;
                };
                node.world_matrix = parent_world * node.transform.local_matrix();
                node.displayable = parent_displayable && node.flags.contains(NodeFlags::ENABLED);
                node.visible = parent_visible && node.flags.contains(NodeFlags::VISIBLE);

                let world = node.world_matrix;
                let (displayable, visible) = (node.displayable, node.visible);
                for child in &node.children {
                    stack.push((*child, world, displayable, visible));
                }
            }
        }
        self.dirty = false;
    }

    /// Moves every node of `other` into this graph. `other`'s root maps to
    /// `under`; `other` is left with a fresh root only.
    ///
    /// Returns the `old → new` handle mapping.
    pub fn graft(&mut self, other: &mut SceneGraph, under: NodeHandle) -> Result<FxHashMap<NodeHandle, NodeHandle>> {
        if !self.nodes.contains_key(under) {
            return Err(EmberError::NodeNotFound);
        }

        let mut incoming = std::mem::take(other);
        other.version = incoming.version.wrapping_add(1);

        let old_root = incoming.root;
        let mut remap = FxHashMap::default();
        remap.insert(old_root, under);

        let mut links = Vec::with_capacity(incoming.nodes.len());
        for (old, mut node) in incoming.nodes.drain() {
            let children = std::mem::take(&mut node.children);
            if old != old_root {
                node.parent = None;
                remap.insert(old, self.nodes.insert(node));
            }
            links.push((old, children));
        }

        for (old, children) in links {
            let Some(&parent) = remap.get(&old) else {
                continue;
            };
            for child in children {
                if let Some(&child) = remap.get(&child) {
                    self.link(child, parent);
                }
            }
        }

        self.touch();
        debug!("Grafted {} scene nodes", remap.len() - 1);
        Ok(remap)
    }

    fn is_ancestor_or_self(&self, ancestor: NodeHandle, mut node: NodeHandle) -> bool {
        loop {
            if node == ancestor {
                return true;
            }
            match self.nodes.get(node).and_then(|n| n.parent) {
                Some(parent) => node = parent,
                None => return false,
            }
        }
    }

    fn link(&mut self, child: NodeHandle, parent: NodeHandle) {
        if let Some(node) = self.nodes.get_mut(child) {
            node.parent = Some(parent);
        }
        if let Some(node) = self.nodes.get_mut(parent) {
            node.children.push(child);
        }
    }

    fn unlink(&mut self, child: NodeHandle) {
        let Some(parent) = self.nodes.get_mut(child).and_then(|node| node.parent.take()) else {
            return;
        };
        if let Some(node) = self.nodes.get_mut(parent) {
            node.children.retain(|c| *c != child);
        }
    }

    fn touch(&mut self) {
        self.dirty = true;
        self.version = self.version.wrapping_add(1);
    }
}
