//! The scene store: every live node in a flat table keyed by id.
//!
//! Tree structure is expressed through `parent` / `children` ids only. The
//! store is the sole writer of those links, and checks the tree invariants
//! after every mutation in debug builds.

use crate::error::{CanvasError, CanvasResult};
use crate::instance::InstanceData;
use crate::node::{Node, NodeId};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Flat, serializable form of a scene.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneData {
    /// All nodes, sorted by id.
    pub nodes: Vec<Node>,
    /// Top-level nodes in paint order.
    pub root_children: Vec<NodeId>,
    /// Next id to hand out.
    pub next_id: u64,
}

/// Owns all nodes of one document.
#[derive(Debug, Clone, PartialEq)]
pub struct Scene {
    nodes: HashMap<NodeId, Node>,
    root_children: Vec<NodeId>,
    next_id: u64,
}

impl Default for Scene {
    fn default() -> Self {
        Self::new()
    }
}

impl Scene {
    /// Create an empty scene. Ids start at 1.
    pub fn new() -> Self {
        Self {
            nodes: HashMap::new(),
            root_children: Vec::new(),
            next_id: 1,
        }
    }

    /// Insert a detached node as the topmost child of `parent` (or of the root).
    ///
    /// Any id, parent or children the node carries are replaced.
    pub fn insert(&mut self, node: Node, parent: Option<NodeId>) -> CanvasResult<NodeId> {
        let index = match parent {
            Some(p) => self.node(p)?.children.len(),
            None => self.root_children.len(),
        };
        self.insert_at(node, parent, index)
    }

    /// Insert a detached node at `index` in the sibling list of `parent`.
    /// The index is clamped to the list length.
    ///
    /// A new node has no children yet, so an instance node that already
    /// refers to other nodes is rejected with `InvalidTree`.
    pub fn insert_at(&mut self, node: Node, parent: Option<NodeId>, index: usize) -> CanvasResult<NodeId> {
        if let Some(p) = parent {
            if !self.nodes.contains_key(&p) {
                return Err(CanvasError::node(p));
            }
        }
        if let Some(r) = node.instance_data().and_then(|d| d.referenced_ids().next()) {
            return Err(CanvasError::InvalidTree(format!(
                "a new instance node cannot refer to node {}",
                r
            )));
        }
        Ok(self.place(node, parent, index))
    }

    /// Insert a detached node as the topmost root node. Instance references
    /// the node carries are dropped.
    pub fn insert_root(&mut self, node: Node) -> NodeId {
        let index = self.root_children.len();
        self.place(node, None, index)
    }

    fn place(&mut self, mut node: Node, parent: Option<NodeId>, index: usize) -> NodeId {
        let id = NodeId(self.next_id);
        self.next_id += 1;
        node.id = id;
        node.parent = parent;
        node.children.clear();
        if let Some(data) = node.instance_data_mut() {
            data.clear_refs();
        }
        self.nodes.insert(id, node);
        self.attach(id, parent, index);

        log::debug!("inserted node {} under {:?}", id, parent);
        self.debug_check();
        id
    }

    /// Get a node by id.
    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(&id)
    }

    /// Get a node by id, or a `NotFound` error.
    pub fn node(&self, id: NodeId) -> CanvasResult<&Node> {
        self.nodes.get(&id).ok_or(CanvasError::node(id))
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    /// Apply field changes to a node.
    ///
    /// The id and tree links are owned by the store; changes the mutator makes
    /// to them are discarded. When the result is an instance whose references
    /// point at missing nodes or outside its own subtree, the change is
    /// refused and the node is left as it was.
    pub fn update<R>(&mut self, id: NodeId, mutator: impl FnOnce(&mut Node) -> R) -> CanvasResult<R> {
        let current = self.node(id)?;
        let mut next = current.clone();
        let result = mutator(&mut next);

        next.id = id;
        next.parent = current.parent;
        next.children.clone_from(&current.children);
        if let Some(data) = next.instance_data() {
            self.check_instance_refs(id, data)?;
        }

        self.nodes.insert(id, next);
        Ok(result)
    }

    fn check_instance_refs(&self, instance: NodeId, data: &InstanceData) -> CanvasResult<()> {
        for r in data.referenced_ids() {
            if !self.nodes.contains_key(&r) {
                return Err(CanvasError::node(r));
            }
            if r != instance && !self.is_ancestor(instance, r) {
                return Err(CanvasError::InvalidTree(format!(
                    "instance {} cannot refer to node {} outside itself",
                    instance, r
                )));
            }
        }
        Ok(())
    }

    /// Remove a node and its whole subtree.
    ///
    /// References to removed ids held by instances elsewhere in the scene
    /// (slot fills, overrides, materialization maps) are purged. Returns the
    /// removed nodes in pre-order.
    pub fn remove(&mut self, id: NodeId) -> CanvasResult<Vec<Node>> {
        let parent = self.node(id)?.parent;
        let doomed = self.subtree(id);

        self.detach(id, parent);

        let mut removed = Vec::with_capacity(doomed.len());
        for doomed_id in &doomed {
            if let Some(node) = self.nodes.remove(doomed_id) {
                removed.push(node);
            }
        }

        let doomed: HashSet<NodeId> = doomed.into_iter().collect();
        for node in self.nodes.values_mut() {
            if let Some(data) = node.instance_data_mut() {
                data.forget(&doomed);
            }
        }

        log::debug!("removed node {} ({} nodes)", id, removed.len());
        self.debug_check();
        Ok(removed)
    }

    /// Move a node to the end of `new_parent`'s children (or the root list).
    pub fn reparent(&mut self, id: NodeId, new_parent: Option<NodeId>) -> CanvasResult<()> {
        let index = match new_parent {
            Some(p) => self.node(p)?.children.len(),
            None => self.root_children.len(),
        };
        self.reparent_at(id, new_parent, index)
    }

    /// Move a node to `index` in `new_parent`'s children (or the root list).
    ///
    /// Rejected with `InvalidTree` when `new_parent` is the node itself or one
    /// of its descendants; the scene is left unchanged. Instances that no
    /// longer contain a node they referenced forget it.
    pub fn reparent_at(&mut self, id: NodeId, new_parent: Option<NodeId>, index: usize) -> CanvasResult<()> {
        let old_parent = self.node(id)?.parent;
        if let Some(p) = new_parent {
            self.node(p)?;
            if p == id {
                return Err(CanvasError::InvalidTree(format!("node {} cannot be its own parent", id)));
            }
            if self.is_ancestor(id, p) {
                return Err(CanvasError::InvalidTree(format!(
                    "moving node {} under its descendant {} would create a cycle",
                    id, p
                )));
            }
        }

        self.detach(id, old_parent);
        self.attach(id, new_parent, index);
        self.prune_instance_refs();

        log::debug!("reparented node {} from {:?} to {:?}", id, old_parent, new_parent);
        self.debug_check();
        Ok(())
    }

    /// Move a node to `index` within its current sibling list.
    pub fn reorder(&mut self, id: NodeId, index: usize) -> CanvasResult<()> {
        let parent = self.node(id)?.parent;
        self.reparent_at(id, parent, index)
    }

    /// True when `ancestor` is a strict ancestor of `node`.
    pub fn is_ancestor(&self, ancestor: NodeId, node: NodeId) -> bool {
        let mut current = self.nodes.get(&node).and_then(|n| n.parent);
        // Bounded walk: a cycle would be an invariant violation, not a hang.
        let mut steps = 0;
        while let Some(id) = current {
            if id == ancestor {
                return true;
            }
            steps += 1;
            if steps > self.nodes.len() {
                debug_assert!(false, "cycle detected above node {}", node);
                return false;
            }
            current = self.nodes.get(&id).and_then(|n| n.parent);
        }
        false
    }

    /// Ids of the subtree rooted at `id` in pre-order, including `id`.
    /// Empty when `id` does not exist.
    pub fn subtree(&self, id: NodeId) -> Vec<NodeId> {
        let mut result = Vec::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            if let Some(node) = self.nodes.get(&current) {
                result.push(current);
                stack.extend(node.children.iter().rev());
            }
        }
        result
    }

    /// Top-level nodes in paint order.
    pub fn root_children(&self) -> &[NodeId] {
        &self.root_children
    }

    /// Children of a node in paint order; empty for a missing node.
    pub fn children_of(&self, id: NodeId) -> &[NodeId] {
        self.nodes.get(&id).map(|n| n.children.as_slice()).unwrap_or(&[])
    }

    /// Sibling list a node lives in (its parent's children or the root list).
    pub fn siblings_of(&self, id: NodeId) -> CanvasResult<&[NodeId]> {
        match self.node(id)?.parent {
            Some(p) => Ok(self.children_of(p)),
            None => Ok(&self.root_children),
        }
    }

    /// Iterate over all nodes in unspecified order.
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// The id the next insert will receive.
    pub fn next_id(&self) -> u64 {
        self.next_id
    }

    /// Remove every node. The id counter keeps counting so ids are never recycled.
    pub fn clear(&mut self) {
        self.nodes.clear();
        self.root_children.clear();
    }

    /// Set position and size without touching anything else (used by layout).
    pub(crate) fn set_frame(&mut self, id: NodeId, x: f64, y: f64, width: f64, height: f64) {
        if let Some(node) = self.nodes.get_mut(&id) {
            node.x = x;
            node.y = y;
            node.width = width;
            node.height = height;
        }
    }

    /// Export the scene with nodes sorted by id.
    pub fn export(&self) -> SceneData {
        let mut nodes: Vec<Node> = self.nodes.values().cloned().collect();
        nodes.sort_by_key(|n| n.id);
        SceneData {
            nodes,
            root_children: self.root_children.clone(),
            next_id: self.next_id,
        }
    }

    /// Rebuild a scene from its flat form, validating every tree invariant.
    pub fn import(data: SceneData) -> CanvasResult<Self> {
        let mut nodes = HashMap::with_capacity(data.nodes.len());
        for node in data.nodes {
            let id = node.id;
            if nodes.insert(id, node).is_some() {
                return Err(CanvasError::InvalidSnapshot(format!("duplicate node id {}", id)));
            }
        }
        let scene = Self {
            nodes,
            root_children: data.root_children,
            next_id: data.next_id,
        };
        scene.check_invariants().map_err(CanvasError::InvalidSnapshot)?;
        Ok(scene)
    }

    /// Verify the tree invariants: every node sits in exactly one children
    /// list, parent and children links agree, there are no cycles, instances
    /// only refer to their own subtree and the id counter is ahead of every id.
    pub fn check_invariants(&self) -> Result<(), String> {
        let mut seen: HashMap<NodeId, usize> = HashMap::new();

        for &id in &self.root_children {
            let node = self
                .nodes
                .get(&id)
                .ok_or_else(|| format!("root list references missing node {}", id))?;
            if node.parent.is_some() {
                return Err(format!("root node {} has a parent", id));
            }
            *seen.entry(id).or_default() += 1;
        }

        for (&id, node) in &self.nodes {
            if node.id != id {
                return Err(format!("node stored under {} has id {}", id, node.id));
            }
            if id.0 == 0 || id.0 >= self.next_id {
                return Err(format!("node id {} outside allocated range (next {})", id, self.next_id));
            }
            if let Some(p) = node.parent {
                if !self.nodes.contains_key(&p) {
                    return Err(format!("node {} has missing parent {}", id, p));
                }
            }
            for &child in &node.children {
                let child_node = self
                    .nodes
                    .get(&child)
                    .ok_or_else(|| format!("node {} has missing child {}", id, child))?;
                if child_node.parent != Some(id) {
                    return Err(format!("child {} of {} points at parent {:?}", child, id, child_node.parent));
                }
                *seen.entry(child).or_default() += 1;
            }
        }

        for &id in self.nodes.keys() {
            match seen.get(&id) {
                Some(1) => {}
                Some(n) => return Err(format!("node {} appears in {} children lists", id, n)),
                None => return Err(format!("node {} is not attached to the tree", id)),
            }
        }

        // Every node reachable exactly once from the root list means no cycles.
        let mut reached = 0;
        let mut stack: Vec<NodeId> = self.root_children.clone();
        while let Some(id) = stack.pop() {
            reached += 1;
            if reached > self.nodes.len() {
                return Err("cycle in tree".to_string());
            }
            stack.extend(self.children_of(id).iter().copied());
        }
        if reached != self.nodes.len() {
            return Err(format!("{} nodes unreachable from the root", self.nodes.len() - reached));
        }

        // Ancestor walks are only safe once the tree is known to be acyclic.
        for (&id, node) in &self.nodes {
            if let Some(data) = node.instance_data() {
                self.check_instance_refs(id, data).map_err(|e| format!("instance {}: {}", id, e))?;
            }
        }

        Ok(())
    }

    /// Drop instance references (slot fills, overrides, materialized nodes)
    /// to nodes that are no longer inside the instance.
    fn prune_instance_refs(&mut self) {
        let stale: Vec<(NodeId, HashSet<NodeId>)> = self
            .nodes
            .values()
            .filter_map(|n| {
                let data = n.instance_data()?;
                let outside: HashSet<NodeId> = data
                    .referenced_ids()
                    .filter(|&r| r != n.id && !self.is_ancestor(n.id, r))
                    .collect();
                (!outside.is_empty()).then_some((n.id, outside))
            })
            .collect();

        for (id, outside) in stale {
            if let Some(data) = self.nodes.get_mut(&id).and_then(|n| n.instance_data_mut()) {
                log::debug!("instance {} lost {} references after a move", id, outside.len());
                data.forget(&outside);
            }
        }
    }

    fn debug_check(&self) {
        debug_assert!(
            self.check_invariants().is_ok(),
            "scene invariant violated: {:?}",
            self.check_invariants()
        );
    }

    fn sibling_list_mut(&mut self, parent: Option<NodeId>) -> Option<&mut Vec<NodeId>> {
        match parent {
            Some(p) => self.nodes.get_mut(&p).map(|n| &mut n.children),
            None => Some(&mut self.root_children),
        }
    }

    fn detach(&mut self, id: NodeId, parent: Option<NodeId>) {
        if let Some(list) = self.sibling_list_mut(parent) {
            list.retain(|&c| c != id);
        }
        if let Some(node) = self.nodes.get_mut(&id) {
            node.parent = None;
        }
    }

    fn attach(&mut self, id: NodeId, parent: Option<NodeId>, index: usize) {
        if let Some(list) = self.sibling_list_mut(parent) {
            let index = index.min(list.len());
            list.insert(index, id);
        }
        if let Some(node) = self.nodes.get_mut(&id) {
            node.parent = parent;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::{ComponentId, VariantKey};
    use crate::instance::NodeOverrides;
    use crate::node::NodeKind;

    fn rect() -> Node {
        Node::rectangle(0.0, 0.0, 10.0, 10.0)
    }

    fn instance_node(data: InstanceData) -> Node {
        Node::new(NodeKind::Instance(Box::new(data))).sized(50.0, 50.0)
    }

    #[test]
    fn test_insert_assigns_monotonic_ids() {
        let mut scene = Scene::new();
        let a = scene.insert(rect(), None).unwrap();
        let b = scene.insert(rect(), None).unwrap();
        assert_eq!(a, NodeId(1));
        assert_eq!(b, NodeId(2));
        assert_eq!(scene.root_children(), &[a, b]);
    }

    #[test]
    fn test_insert_under_missing_parent() {
        let mut scene = Scene::new();
        let result = scene.insert(rect(), Some(NodeId(42)));
        assert!(matches!(result, Err(CanvasError::NotFound(_))));
        assert!(scene.is_empty());
    }

    #[test]
    fn test_update_cannot_touch_links() {
        let mut scene = Scene::new();
        let frame = scene.insert(Node::frame(0.0, 0.0, 100.0, 100.0), None).unwrap();
        let child = scene.insert(rect(), Some(frame)).unwrap();

        scene
            .update(child, |n| {
                n.name = "Renamed".to_string();
                n.parent = None;
                n.id = NodeId(99);
            })
            .unwrap();

        let node = scene.get(child).unwrap();
        assert_eq!(node.name, "Renamed");
        assert_eq!(node.parent, Some(frame));
        assert_eq!(node.id, child);
        assert!(scene.check_invariants().is_ok());
    }

    #[test]
    fn test_remove_subtree() {
        let mut scene = Scene::new();
        let outer = scene.insert(Node::frame(0.0, 0.0, 100.0, 100.0), None).unwrap();
        let frame = scene.insert(Node::frame(0.0, 0.0, 100.0, 100.0), Some(outer)).unwrap();
        let a = scene.insert(rect(), Some(frame)).unwrap();
        let b = scene.insert(rect(), Some(frame)).unwrap();

        let removed = scene.remove(frame).unwrap();

        assert_eq!(removed.len(), 3);
        assert!(scene.get(frame).is_none());
        assert!(scene.get(a).is_none());
        assert!(scene.get(b).is_none());
        assert!(scene.children_of(outer).is_empty());
    }

    #[test]
    fn test_ids_not_recycled_after_remove() {
        let mut scene = Scene::new();
        let a = scene.insert(rect(), None).unwrap();
        scene.remove(a).unwrap();
        let b = scene.insert(rect(), None).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_reparent_rejects_cycles() {
        let mut scene = Scene::new();
        let outer = scene.insert(Node::frame(0.0, 0.0, 100.0, 100.0), None).unwrap();
        let inner = scene.insert(Node::frame(0.0, 0.0, 50.0, 50.0), Some(outer)).unwrap();

        let before = scene.export();
        assert!(matches!(scene.reparent(outer, Some(inner)), Err(CanvasError::InvalidTree(_))));
        assert!(matches!(scene.reparent(outer, Some(outer)), Err(CanvasError::InvalidTree(_))));
        assert_eq!(scene.export(), before);
    }

    #[test]
    fn test_reparent_moves_between_lists() {
        let mut scene = Scene::new();
        let frame = scene.insert(Node::frame(0.0, 0.0, 100.0, 100.0), None).unwrap();
        let a = scene.insert(rect(), None).unwrap();

        scene.reparent(a, Some(frame)).unwrap();
        assert_eq!(scene.root_children(), &[frame]);
        assert_eq!(scene.children_of(frame), &[a]);

        scene.reparent(a, None).unwrap();
        assert_eq!(scene.root_children(), &[frame, a]);
        assert!(scene.get(a).unwrap().parent.is_none());
    }

    #[test]
    fn test_subtree_pre_order() {
        let mut scene = Scene::new();
        let f = scene.insert(Node::frame(0.0, 0.0, 100.0, 100.0), None).unwrap();
        let a = scene.insert(rect(), Some(f)).unwrap();
        let a1 = scene.insert(rect(), Some(a)).unwrap();
        let b = scene.insert(rect(), Some(f)).unwrap();
        assert_eq!(scene.subtree(f), vec![f, a, a1, b]);
    }

    #[test]
    fn test_import_rejects_broken_links() {
        let mut scene = Scene::new();
        let f = scene.insert(Node::frame(0.0, 0.0, 100.0, 100.0), None).unwrap();
        scene.insert(rect(), Some(f)).unwrap();

        let mut data = scene.export();
        data.nodes[1].parent = None;
        assert!(matches!(Scene::import(data), Err(CanvasError::InvalidSnapshot(_))));

        let mut data = scene.export();
        data.next_id = 1;
        assert!(Scene::import(data).is_err());

        let mut data = scene.export();
        data.root_children.push(f);
        assert!(Scene::import(data).is_err());
    }

    #[test]
    fn test_export_import_round_trip() {
        let mut scene = Scene::new();
        let f = scene.insert(Node::frame(0.0, 0.0, 100.0, 100.0), None).unwrap();
        scene.insert(rect(), Some(f)).unwrap();
        scene.insert(Node::text(1.0, 2.0, "hi", 12.0), None).unwrap();

        let data = scene.export();
        let restored = Scene::import(data.clone()).unwrap();
        assert_eq!(restored.export(), data);
        assert_eq!(restored, scene);
    }

    #[test]
    fn test_insert_rejects_instance_with_foreign_refs() {
        let mut scene = Scene::new();
        let mut data = InstanceData::new(ComponentId(1), VariantKey::new());
        data.overrides.insert(NodeId(999), NodeOverrides::visible(false));

        let err = scene.insert(instance_node(data.clone()), None).unwrap_err();
        assert!(matches!(err, CanvasError::InvalidTree(_)));
        assert!(scene.is_empty());
        assert_eq!(scene.next_id(), 1);

        let id = scene.insert_root(instance_node(data));
        assert!(scene.get(id).unwrap().instance_data().unwrap().overrides.is_empty());
        assert!(scene.check_invariants().is_ok());
    }

    #[test]
    fn test_update_rejects_refs_outside_the_instance() {
        let mut scene = Scene::new();
        let outsider = scene.insert(rect(), None).unwrap();
        let id = scene.insert(instance_node(InstanceData::new(ComponentId(1), VariantKey::new())), None).unwrap();
        let inside = scene.insert(rect(), Some(id)).unwrap();
        let before = scene.export();

        let err = scene
            .update(id, |n| {
                if let Some(d) = n.instance_data_mut() {
                    d.overrides.insert(outsider, NodeOverrides::visible(false));
                }
            })
            .unwrap_err();
        assert!(matches!(err, CanvasError::InvalidTree(_)));

        let err = scene
            .update(id, |n| {
                if let Some(d) = n.instance_data_mut() {
                    d.slot_fills.insert("body".to_string(), vec![NodeId(999)]);
                }
            })
            .unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(scene.export(), before);

        scene
            .update(id, |n| {
                if let Some(d) = n.instance_data_mut() {
                    d.overrides.insert(inside, NodeOverrides::visible(false));
                }
            })
            .unwrap();
        assert!(scene.check_invariants().is_ok());
    }

    #[test]
    fn test_import_rejects_refs_outside_the_instance() {
        let mut scene = Scene::new();
        let outsider = scene.insert(rect(), None).unwrap();
        scene.insert(instance_node(InstanceData::new(ComponentId(1), VariantKey::new())), None).unwrap();

        let mut data = scene.export();
        if let NodeKind::Instance(d) = &mut data.nodes[1].kind {
            d.overrides.insert(outsider, NodeOverrides::text("x"));
        }
        assert!(matches!(Scene::import(data), Err(CanvasError::InvalidSnapshot(_))));
    }
}
