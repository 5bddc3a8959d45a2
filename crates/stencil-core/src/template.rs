//! Frozen component templates.
//!
//! A template is a deep copy of a live subtree taken at capture time. Its
//! nodes carry template-local ids, numbered in pre-order from 1 and scoped
//! to one [`VariantData`]; they never collide with or stand for live ids.

use crate::error::{CanvasError, CanvasResult};
use crate::instance;
use crate::node::{Node, NodeId};
use crate::scene::Scene;
use kurbo::Vec2;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;

/// Identifier of a node inside one template.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TemplateId(pub u64);

impl fmt::Display for TemplateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "t{}", self.0)
    }
}

/// One captured node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateNode {
    pub id: TemplateId,
    /// Live node this copy was captured from. Informational; it may no
    /// longer exist.
    pub source: NodeId,
    pub parent: Option<TemplateId>,
    pub children: Vec<TemplateId>,
    /// The captured fields. Its own id and tree links are cleared.
    pub node: Node,
}

/// An immutable template: a root plus every node of its subtree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariantData {
    pub root: TemplateId,
    /// Nodes in pre-order, so sorted by id.
    pub nodes: Vec<TemplateNode>,
    /// Set by the registry when the template is stored. A replacement under
    /// the same key gets a new revision, so instances can tell their
    /// template ids apart from the new ones.
    #[serde(default)]
    pub revision: u64,
}

impl VariantData {
    /// Deep-copy the live subtree rooted at `root`.
    ///
    /// Overrides of any enclosing instance are baked into the copies, and
    /// nested instances lose their live bookkeeping (slot fills, overrides,
    /// materialization map) since those ids mean nothing inside a template.
    pub fn capture(scene: &Scene, root: NodeId) -> CanvasResult<Self> {
        scene.node(root)?;
        let live = scene.subtree(root);
        let ids: BTreeMap<NodeId, TemplateId> = live
            .iter()
            .enumerate()
            .map(|(i, &id)| (id, TemplateId(i as u64 + 1)))
            .collect();

        let mut nodes = Vec::with_capacity(live.len());
        for &live_id in &live {
            let (Some(&tid), Some(mut copy)) = (ids.get(&live_id), instance::resolved_node(scene, live_id)) else {
                continue;
            };
            let parent = if live_id == root {
                None
            } else {
                copy.parent.and_then(|p| ids.get(&p).copied())
            };
            let children = copy.children.iter().filter_map(|c| ids.get(c).copied()).collect();

            copy.id = NodeId(0);
            copy.parent = None;
            copy.children.clear();
            if let Some(data) = copy.instance_data_mut() {
                data.clear_refs();
            }

            nodes.push(TemplateNode {
                id: tid,
                source: live_id,
                parent,
                children,
                node: copy,
            });
        }

        Ok(Self {
            root: TemplateId(1),
            nodes,
            revision: 0,
        })
    }

    pub fn get(&self, id: TemplateId) -> Option<&TemplateNode> {
        self.nodes
            .binary_search_by_key(&id, |n| n.id)
            .ok()
            .map(|i| &self.nodes[i])
    }

    pub fn root_node(&self) -> CanvasResult<&TemplateNode> {
        self.get(self.root)
            .ok_or_else(|| CanvasError::InvalidSnapshot(format!("template root {} missing", self.root)))
    }

    /// Template node captured from a given live node, if any.
    pub fn find_by_source(&self, source: NodeId) -> Option<&TemplateNode> {
        self.nodes.iter().find(|n| n.source == source)
    }

    /// Template ids of the subtree under `id` (excluding `id`) in pre-order.
    pub fn descendants(&self, id: TemplateId) -> Vec<TemplateId> {
        let mut result = Vec::new();
        let mut stack: Vec<TemplateId> = self
            .get(id)
            .map(|n| n.children.iter().rev().copied().collect())
            .unwrap_or_default();
        while let Some(current) = stack.pop() {
            if let Some(node) = self.get(current) {
                result.push(current);
                stack.extend(node.children.iter().rev());
            }
        }
        result
    }

    /// Clone every non-root template node into the scene under `instance`.
    ///
    /// Positions are shifted by `offset`, except for nodes whose template
    /// parent runs auto layout. `prepare` may adjust each copy before it is
    /// inserted. Returns the template-to-live map, with the root mapped to
    /// `instance`.
    pub fn materialize_into(
        &self,
        scene: &mut Scene,
        instance: NodeId,
        offset: Vec2,
        mut prepare: impl FnMut(TemplateId, &mut Node),
    ) -> CanvasResult<BTreeMap<TemplateId, NodeId>> {
        scene.node(instance)?;
        let root = self.root_node()?;

        let mut map = BTreeMap::new();
        map.insert(root.id, instance);

        for id in self.descendants(root.id) {
            let Some(template) = self.get(id) else {
                continue;
            };
            let Some(parent_tid) = template.parent else {
                continue;
            };
            let Some(&live_parent) = map.get(&parent_tid) else {
                continue;
            };
            let parent_has_layout = self
                .get(parent_tid)
                .is_some_and(|p| p.node.layout.is_active());

            let mut copy = template.node.clone();
            if !parent_has_layout {
                copy.x += offset.x;
                copy.y += offset.y;
            }
            prepare(id, &mut copy);
            let live = scene.insert(copy, Some(live_parent))?;
            map.insert(id, live);
        }
        Ok(map)
    }

    /// Check that the template is a single well-formed tree rooted at `root`.
    pub fn validate(&self) -> Result<(), String> {
        let mut prev: Option<TemplateId> = None;
        for node in &self.nodes {
            if prev.is_some_and(|p| p >= node.id) {
                return Err(format!("template nodes not sorted at {}", node.id));
            }
            prev = Some(node.id);
        }

        let root = self.get(self.root).ok_or_else(|| format!("template root {} missing", self.root))?;
        if root.parent.is_some() {
            return Err(format!("template root {} has a parent", self.root));
        }

        for node in &self.nodes {
            if node.node.instance_data().is_some_and(|d| d.referenced_ids().next().is_some()) {
                return Err(format!("template node {} holds live ids", node.id));
            }
            if let Some(p) = node.parent {
                let parent = self.get(p).ok_or_else(|| format!("template node {} has missing parent {}", node.id, p))?;
                if !parent.children.contains(&node.id) {
                    return Err(format!("template node {} missing from children of {}", node.id, p));
                }
            } else if node.id != self.root {
                return Err(format!("template node {} detached from root", node.id));
            }
            for child in &node.children {
                let c = self.get(*child).ok_or_else(|| format!("template node {} has missing child {}", node.id, child))?;
                if c.parent != Some(node.id) {
                    return Err(format!("template child {} of {} points elsewhere", child, node.id));
                }
            }
        }

        let mut seen = HashSet::new();
        seen.insert(self.root);
        for id in self.descendants(self.root) {
            if !seen.insert(id) {
                return Err(format!("template node {} reached twice", id));
            }
        }
        if seen.len() != self.nodes.len() {
            return Err("template has unreachable nodes".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> (Scene, NodeId, NodeId, NodeId) {
        let mut scene = Scene::new();
        let frame = scene.insert(Node::frame(100.0, 100.0, 200.0, 100.0), None).unwrap();
        let label = scene.insert(Node::text(110.0, 110.0, "Label", 14.0), Some(frame)).unwrap();
        let icon = scene.insert(Node::ellipse(150.0, 120.0, 20.0, 20.0), Some(frame)).unwrap();
        (scene, frame, label, icon)
    }

    #[test]
    fn test_capture_assigns_pre_order_local_ids() {
        let (scene, frame, label, icon) = sample();
        let data = VariantData::capture(&scene, frame).unwrap();

        assert_eq!(data.root, TemplateId(1));
        assert_eq!(data.nodes.len(), 3);
        assert_eq!(data.get(TemplateId(2)).unwrap().source, label);
        assert_eq!(data.get(TemplateId(3)).unwrap().source, icon);
        assert_eq!(data.root_node().unwrap().children, vec![TemplateId(2), TemplateId(3)]);
        assert!(data.nodes.iter().all(|n| n.node.id == NodeId(0) && n.node.children.is_empty()));
        assert!(data.validate().is_ok());
    }

    #[test]
    fn test_capture_is_frozen() {
        let (mut scene, frame, label, _) = sample();
        let data = VariantData::capture(&scene, frame).unwrap();

        scene.update(label, |n| n.name = "Changed".to_string()).unwrap();
        scene.remove(frame).unwrap();

        assert_eq!(data.get(TemplateId(2)).unwrap().node.name, "Label");
    }

    #[test]
    fn test_capture_missing_root() {
        let scene = Scene::new();
        assert!(VariantData::capture(&scene, NodeId(3)).unwrap_err().is_not_found());
    }

    #[test]
    fn test_materialize_offsets_and_maps() {
        let (mut scene, frame, _, _) = sample();
        let data = VariantData::capture(&scene, frame).unwrap();
        let host = scene.insert(Node::group(0.0, 0.0, 200.0, 100.0), None).unwrap();

        let map = data
            .materialize_into(&mut scene, host, Vec2::new(-100.0, -100.0), |_, _| {})
            .unwrap();

        assert_eq!(map.len(), 3);
        assert_eq!(map[&TemplateId(1)], host);
        let label = scene.get(map[&TemplateId(2)]).unwrap();
        assert_eq!((label.x, label.y), (10.0, 10.0));
        assert_eq!(label.parent, Some(host));
        assert_eq!(scene.children_of(host).len(), 2);
    }

    #[test]
    fn test_validate_rejects_detached_node() {
        let (scene, frame, _, _) = sample();
        let mut data = VariantData::capture(&scene, frame).unwrap();
        data.nodes[0].children.pop();
        data.nodes[2].parent = None;
        assert!(data.validate().is_err());
    }
}
