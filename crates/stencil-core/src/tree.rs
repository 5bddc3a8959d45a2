//! Tree operations built on the scene store's public contract:
//! paint-order traversal, hit testing, duplication, search and z-order.

use crate::error::CanvasResult;
use crate::instance::InstanceData;
use crate::node::{Node, NodeId};
use crate::scene::Scene;
use kurbo::{Point, Vec2};
use std::collections::HashMap;

/// Whether locked nodes take part in hit testing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LockPolicy {
    /// Locked nodes are transparent to the pointer.
    #[default]
    SkipLocked,
    /// Locked nodes can be hit like any other.
    IncludeLocked,
}

/// Depth-first pre-order walk over the scene: the paint order.
///
/// Lazy and finite. A clone continues from the same position; call
/// [`Scene::render_order`] again for a fresh walk.
#[derive(Debug, Clone)]
pub struct RenderOrder<'a> {
    scene: &'a Scene,
    stack: Vec<&'a [NodeId]>,
}

impl<'a> Iterator for RenderOrder<'a> {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        loop {
            let top = self.stack.last_mut()?;
            match top.split_first() {
                Some((&id, rest)) => {
                    *top = rest;
                    let children = self.scene.children_of(id);
                    if !children.is_empty() {
                        self.stack.push(children);
                    }
                    return Some(id);
                }
                None => {
                    self.stack.pop();
                }
            }
        }
    }
}

impl Scene {
    /// Paint order: root children in list order, each followed by its
    /// subtree. Later entries paint on top.
    pub fn render_order(&self) -> RenderOrder<'_> {
        RenderOrder {
            scene: self,
            stack: vec![self.root_children()],
        }
    }

    /// Topmost visible node containing `point` (scene coordinates).
    pub fn hit_test(&self, point: Point, policy: LockPolicy) -> Option<NodeId> {
        self.hit_test_with(point, policy, |node| node.visible)
    }

    /// Hit test with a caller-supplied visibility rule (used to honour
    /// instance overrides).
    pub fn hit_test_with(
        &self,
        point: Point,
        policy: LockPolicy,
        is_visible: impl Fn(&Node) -> bool,
    ) -> Option<NodeId> {
        let order: Vec<NodeId> = self.render_order().collect();
        order.into_iter().rev().find(|&id| {
            self.get(id).is_some_and(|node| {
                is_visible(node)
                    && (policy == LockPolicy::IncludeLocked || !node.locked)
                    && node.contains_point(point)
            })
        })
    }

    /// All nodes whose name contains `query`, case-insensitively, in paint order.
    pub fn find_by_name(&self, query: &str) -> Vec<NodeId> {
        let needle = query.to_lowercase();
        self.render_order()
            .filter(|&id| {
                self.get(id)
                    .is_some_and(|n| n.name.to_lowercase().contains(&needle))
            })
            .collect()
    }

    /// Strict descendants of `id` in pre-order.
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut ids = self.subtree(id);
        if !ids.is_empty() {
            ids.remove(0);
        }
        ids
    }

    /// Ancestors of `id`, nearest first.
    pub fn ancestors(&self, id: NodeId) -> Vec<NodeId> {
        let mut result = Vec::new();
        let mut current = self.get(id).and_then(|n| n.parent);
        while let Some(p) = current {
            result.push(p);
            current = self.get(p).and_then(|n| n.parent);
        }
        result
    }

    /// Deep-clone the subtree rooted at `id` with fresh ids, shift every
    /// cloned node by `offset`, and place the clone right after the original
    /// in its sibling list. Returns the clone's root id.
    ///
    /// Instance bookkeeping inside the clone is rewritten to the new ids;
    /// references that point outside the cloned subtree are dropped.
    pub fn duplicate(&mut self, id: NodeId, offset: Vec2) -> CanvasResult<NodeId> {
        let original = self.node(id)?;
        let parent = original.parent;
        let index = self
            .siblings_of(id)?
            .iter()
            .position(|&s| s == id)
            .map(|i| i + 1)
            .unwrap_or(usize::MAX);

        let source: Vec<Node> = self.subtree(id).into_iter().filter_map(|i| self.get(i).cloned()).collect();
        let mut id_map: HashMap<NodeId, NodeId> = HashMap::with_capacity(source.len());
        let mut instances: Vec<(NodeId, InstanceData)> = Vec::new();

        // Pre-order guarantees each parent is cloned before its children.
        // Instance references go in once every copy has an id.
        for node in &source {
            let mut copy = node.clone();
            copy.x += offset.x;
            copy.y += offset.y;
            let data = copy.instance_data_mut().map(|d| {
                let kept = d.clone();
                d.clear_refs();
                kept
            });
            let new_id = if node.id == id {
                self.insert_at(copy, parent, index)?
            } else {
                let new_parent = node.parent.and_then(|p| id_map.get(&p).copied());
                self.insert(copy, new_parent)?
            };
            id_map.insert(node.id, new_id);
            if let Some(data) = data {
                instances.push((new_id, data));
            }
        }

        for (new_id, mut data) in instances {
            data.remap(&id_map);
            self.update(new_id, |n| {
                if let Some(d) = n.instance_data_mut() {
                    *d = data;
                }
            })?;
        }

        let root = id_map.get(&id).copied().unwrap_or(id);
        log::debug!("duplicated node {} as {} ({} nodes)", id, root, id_map.len());
        Ok(root)
    }

    /// Move a node to the top of its sibling list.
    pub fn bring_to_front(&mut self, id: NodeId) -> CanvasResult<()> {
        let last = self.siblings_of(id)?.len();
        self.reorder(id, last)
    }

    /// Move a node to the bottom of its sibling list.
    pub fn send_to_back(&mut self, id: NodeId) -> CanvasResult<()> {
        self.reorder(id, 0)
    }

    /// Move a node one step towards the front.
    /// Returns false if it was already topmost.
    pub fn bring_forward(&mut self, id: NodeId) -> CanvasResult<bool> {
        let siblings = self.siblings_of(id)?;
        let pos = siblings.iter().position(|&s| s == id).unwrap_or(0);
        if pos + 1 >= siblings.len() {
            return Ok(false);
        }
        // Index is taken after the node leaves the list.
        self.reorder(id, pos + 1)?;
        Ok(true)
    }

    /// Move a node one step towards the back.
    /// Returns false if it was already at the bottom.
    pub fn send_backward(&mut self, id: NodeId) -> CanvasResult<bool> {
        let siblings = self.siblings_of(id)?;
        let pos = siblings.iter().position(|&s| s == id).unwrap_or(0);
        if pos == 0 {
            return Ok(false);
        }
        self.reorder(id, pos - 1)?;
        Ok(true)
    }
}
