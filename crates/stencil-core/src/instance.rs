//! Instance materializer.
//!
//! An instance is a live Instance-kind node whose children are fresh copies
//! of one of its component's templates. [`InstanceData`] remembers which
//! template node each live copy came from, which user content fills which
//! slot, and per-node overrides that rendering applies on top of the copies.

use crate::component::{Component, ComponentId, ComponentRegistry, INSTANCE_TAG, SLOT_TAG, VariantKey};
use crate::error::{CanvasError, CanvasResult, Missing};
use crate::node::{Fill, Node, NodeId, NodeKind, SerializableColor};
use crate::scene::Scene;
use crate::template::TemplateId;
use kurbo::{Point, Vec2};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};

/// Instance-local replacements applied at render time.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct NodeOverrides {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Fill colour as hex (`#rrggbb` or `#rrggbbaa`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fill: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visible: Option<bool>,
}

impl NodeOverrides {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Self::default()
        }
    }

    pub fn fill(hex: impl Into<String>) -> Self {
        Self {
            fill: Some(hex.into()),
            ..Self::default()
        }
    }

    pub fn visible(visible: bool) -> Self {
        Self {
            visible: Some(visible),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_none() && self.fill.is_none() && self.visible.is_none()
    }

    /// Take every field `other` sets.
    pub fn merge(&mut self, other: NodeOverrides) {
        if other.text.is_some() {
            self.text = other.text;
        }
        if other.fill.is_some() {
            self.fill = other.fill;
        }
        if other.visible.is_some() {
            self.visible = other.visible;
        }
    }

    /// Apply onto a node copy. Text only affects text nodes.
    pub fn apply(&self, node: &mut Node) {
        if let (Some(text), NodeKind::Text { content, .. }) = (&self.text, &mut node.kind) {
            content.clone_from(text);
        }
        if let Some(color) = self.fill.as_deref().and_then(SerializableColor::from_hex) {
            node.fill = Some(Fill { color });
        }
        if let Some(visible) = self.visible {
            node.visible = visible;
        }
    }
}

/// Bookkeeping carried by an Instance-kind node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceData {
    pub component_id: ComponentId,
    /// Full property values of the current variant.
    pub variant_values: VariantKey,
    #[serde(default)]
    pub slot_fills: BTreeMap<String, Vec<NodeId>>,
    #[serde(default)]
    pub overrides: BTreeMap<NodeId, NodeOverrides>,
    /// Template node to live node for the current materialization. The
    /// template root maps to the instance itself.
    #[serde(default)]
    pub materialized: BTreeMap<TemplateId, NodeId>,
    /// Revision of the template the current children were cloned from.
    #[serde(default)]
    pub template_revision: u64,
}

impl InstanceData {
    pub fn new(component_id: ComponentId, variant_values: VariantKey) -> Self {
        Self {
            component_id,
            variant_values,
            slot_fills: BTreeMap::new(),
            overrides: BTreeMap::new(),
            materialized: BTreeMap::new(),
            template_revision: 0,
        }
    }

    /// Drop every live reference, keeping component and variant values.
    pub fn clear_refs(&mut self) {
        self.slot_fills.clear();
        self.overrides.clear();
        self.materialized.clear();
    }

    /// Every live id this instance refers to.
    pub fn referenced_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.slot_fills
            .values()
            .flatten()
            .copied()
            .chain(self.overrides.keys().copied())
            .chain(self.materialized.values().copied())
    }

    /// Drop every reference to the given ids.
    pub fn forget(&mut self, ids: &HashSet<NodeId>) {
        for fills in self.slot_fills.values_mut() {
            fills.retain(|id| !ids.contains(id));
        }
        self.slot_fills.retain(|_, fills| !fills.is_empty());
        self.overrides.retain(|id, _| !ids.contains(id));
        self.materialized.retain(|_, id| !ids.contains(id));
    }

    /// Rewrite references through `map`; unmapped references are dropped.
    pub fn remap(&mut self, map: &HashMap<NodeId, NodeId>) {
        for fills in self.slot_fills.values_mut() {
            *fills = fills.iter().filter_map(|id| map.get(id).copied()).collect();
        }
        self.slot_fills.retain(|_, fills| !fills.is_empty());
        self.overrides = std::mem::take(&mut self.overrides)
            .into_iter()
            .filter_map(|(id, o)| map.get(&id).map(|&new| (new, o)))
            .collect();
        self.materialized = std::mem::take(&mut self.materialized)
            .into_iter()
            .filter_map(|(t, id)| map.get(&id).map(|&new| (t, new)))
            .collect();
    }
}

fn instance_data(scene: &Scene, instance: NodeId) -> CanvasResult<&InstanceData> {
    scene
        .node(instance)?
        .instance_data()
        .ok_or(CanvasError::NotFound(Missing::Instance(instance)))
}

/// The component an instance node was made from.
pub fn instance_component<'r>(scene: &Scene, registry: &'r ComponentRegistry, instance: NodeId) -> CanvasResult<&'r Component> {
    registry.component(instance_data(scene, instance)?.component_id)
}

/// Instance nodes take size and style from the template root.
fn copy_root_style(node: &mut Node, root: &Node) {
    node.width = root.width;
    node.height = root.height;
    node.fill = root.fill.clone();
    node.stroke = root.stroke.clone();
    node.corner_radius = root.corner_radius;
    node.layout = root.layout.clone();
}

/// Slot placeholders by template id, for the component's default template only.
fn slot_marks(component: &Component, canonical: &str) -> HashMap<TemplateId, String> {
    if canonical != component.default_variant {
        return HashMap::new();
    }
    component
        .slots
        .iter()
        .map(|s| (s.placeholder, s.name.clone()))
        .collect()
}

fn mark_slot(marks: &HashMap<TemplateId, String>, id: TemplateId, node: &mut Node) {
    let Some(name) = marks.get(&id) else {
        return;
    };
    if !node.is_instance() {
        node.kind = NodeKind::Slot {
            slot_name: name.clone(),
        };
    }
    if !node.name.starts_with(SLOT_TAG) {
        node.name = format!("{}{}", SLOT_TAG, node.name);
    }
}

/// Live placeholder of `slot` inside an instance: through the
/// materialization map when the current template declares it, otherwise
/// the first Slot-kind node of that name below the instance.
fn find_placeholder(
    scene: &Scene,
    component: &Component,
    canonical: &str,
    materialized: &BTreeMap<TemplateId, NodeId>,
    instance: NodeId,
    slot: &str,
) -> Option<NodeId> {
    if canonical == component.default_variant {
        let mapped = component
            .slot(slot)
            .and_then(|def| materialized.get(&def.placeholder))
            .copied()
            .filter(|&id| scene.is_ancestor(instance, id));
        if mapped.is_some() {
            return mapped;
        }
    }
    scene.descendants(instance).into_iter().find(|&id| {
        scene
            .get(id)
            .is_some_and(|n| matches!(&n.kind, NodeKind::Slot { slot_name } if slot_name == slot))
    })
}

/// Create a top-level instance of `component_id`'s default variant with its
/// top-left corner at `at`.
pub fn create_instance(
    scene: &mut Scene,
    registry: &ComponentRegistry,
    component_id: ComponentId,
    at: Point,
) -> CanvasResult<NodeId> {
    let component = registry.component(component_id)?;
    let template = component.default_template()?;
    let root = template.root_node()?;

    let mut data = InstanceData::new(component_id, component.default_values());
    data.template_revision = template.revision;
    let mut node = Node::new(NodeKind::Instance(Box::new(data)))
        .at(at.x, at.y)
        .named(format!("{}{}", INSTANCE_TAG, component.name));
    copy_root_style(&mut node, &root.node);
    let id = scene.insert(node, None)?;

    let offset = Vec2::new(at.x - root.node.x, at.y - root.node.y);
    let marks = slot_marks(component, &component.default_variant);
    let map = template.materialize_into(scene, id, offset, |tid, n| mark_slot(&marks, tid, n))?;
    let count = map.len();
    scene.update(id, |n| {
        if let Some(data) = n.instance_data_mut() {
            data.materialized = map;
        }
    })?;

    log::debug!("instance {} of component {} ({} nodes)", id, component_id, count);
    Ok(id)
}

/// Switch an instance to the variant named by `key`, overlaid on its current
/// values.
///
/// The old materialization is deleted and the new template cloned in its
/// place. Overrides carry over only when the template is the same one: the
/// same key at the same revision.
/// Slot content is kept: it moves into the new placeholder of the same
/// name, or next to the instance when the new variant has none.
pub fn set_instance_variant(
    scene: &mut Scene,
    registry: &ComponentRegistry,
    instance: NodeId,
    key: &VariantKey,
) -> CanvasResult<()> {
    let previous = instance_data(scene, instance)?.clone();
    let component = registry.component(previous.component_id)?;

    let mut requested = previous.variant_values.clone();
    requested.overlay(key);
    let values = component.complete_key(&requested)?;
    let (canonical, template) = component.variant(&values)?;
    let root = template.root_node()?;
    let same_template = previous.template_revision == template.revision
        && component
            .canonical_key(&previous.variant_values)
            .is_ok_and(|current| current == canonical);

    // Everything below is infallible once the lookups above succeeded.
    let template_of: HashMap<NodeId, TemplateId> = previous.materialized.iter().map(|(&t, &n)| (n, t)).collect();
    let mut carried: BTreeMap<TemplateId, NodeOverrides> = BTreeMap::new();
    let mut content_overrides: BTreeMap<NodeId, NodeOverrides> = BTreeMap::new();
    for (node, overrides) in &previous.overrides {
        match template_of.get(node) {
            Some(&tid) if same_template => {
                carried.insert(tid, overrides.clone());
            }
            Some(_) => {}
            None => {
                content_overrides.insert(*node, overrides.clone());
            }
        }
    }

    // Park slot content next to the instance while the old copies go away.
    let parent = scene.node(instance)?.parent;
    let mut index = scene
        .siblings_of(instance)?
        .iter()
        .position(|&s| s == instance)
        .map_or(0, |i| i + 1);
    for fills in previous.slot_fills.values() {
        for &content in fills {
            if scene.contains(content) {
                scene.reparent_at(content, parent, index)?;
                index += 1;
            }
        }
    }

    for child in scene.children_of(instance).to_vec() {
        scene.remove(child)?;
    }

    let (x, y) = {
        let node = scene.node(instance)?;
        (node.x, node.y)
    };
    scene.update(instance, |n| copy_root_style(n, &root.node))?;
    let offset = Vec2::new(x - root.node.x, y - root.node.y);
    let marks = slot_marks(component, &canonical);
    let map = template.materialize_into(scene, instance, offset, |tid, n| mark_slot(&marks, tid, n))?;

    let mut slot_fills = BTreeMap::new();
    for (slot, fills) in previous.slot_fills {
        let fills: Vec<NodeId> = fills.into_iter().filter(|&id| scene.contains(id)).collect();
        match find_placeholder(scene, component, &canonical, &map, instance, &slot) {
            Some(placeholder) => {
                for &content in &fills {
                    scene.reparent(content, Some(placeholder))?;
                }
                slot_fills.insert(slot, fills);
            }
            None => log::warn!(
                "variant '{}' of component {} has no slot '{}'; {} nodes left beside instance {}",
                canonical,
                component.id,
                slot,
                fills.len(),
                instance
            ),
        }
    }

    let mut overrides: BTreeMap<NodeId, NodeOverrides> = carried
        .into_iter()
        .filter_map(|(tid, o)| map.get(&tid).map(|&live| (live, o)))
        .collect();
    overrides.extend(
        content_overrides
            .into_iter()
            .filter(|(node, _)| scene.is_ancestor(instance, *node)),
    );

    scene.update(instance, |n| {
        if let Some(data) = n.instance_data_mut() {
            data.variant_values = values;
            data.slot_fills = slot_fills;
            data.overrides = overrides;
            data.materialized = map;
            data.template_revision = template.revision;
        }
    })?;

    log::debug!("instance {} switched to variant '{}'", instance, canonical);
    Ok(())
}

/// Rebuild every instance of `component_id` that shows the variant
/// `canonical` from an older revision of its template. Returns the
/// rebuilt instances in id order.
pub fn refresh_instances(
    scene: &mut Scene,
    registry: &ComponentRegistry,
    component_id: ComponentId,
    canonical: &str,
) -> CanvasResult<Vec<NodeId>> {
    let component = registry.component(component_id)?;
    let Some(template) = component.variants.get(canonical) else {
        return Ok(Vec::new());
    };

    let mut stale: Vec<NodeId> = scene
        .nodes()
        .filter(|n| {
            n.instance_data().is_some_and(|d| {
                d.component_id == component_id
                    && d.template_revision != template.revision
                    && component.canonical_key(&d.variant_values).is_ok_and(|k| k == canonical)
            })
        })
        .map(|n| n.id)
        .collect();
    stale.sort();

    let mut refreshed = Vec::with_capacity(stale.len());
    for id in stale {
        // A nested copy may have gone with an outer instance's old children.
        if scene.get(id).is_some_and(Node::is_instance) {
            set_instance_variant(scene, registry, id, &VariantKey::new())?;
            refreshed.push(id);
        }
    }
    Ok(refreshed)
}

/// Move `content` into the live placeholder of `slot` and record it as a
/// slot fill.
pub fn fill_slot(
    scene: &mut Scene,
    registry: &ComponentRegistry,
    instance: NodeId,
    slot: &str,
    content: NodeId,
) -> CanvasResult<()> {
    let data = instance_data(scene, instance)?.clone();
    let component = registry.component(data.component_id)?;
    if component.slot(slot).is_none() {
        return Err(CanvasError::slot(slot));
    }
    scene.node(content)?;

    let already_filled = data.slot_fills.values().any(|fills| fills.contains(&content));
    if content == instance || (scene.is_ancestor(instance, content) && !already_filled) {
        return Err(CanvasError::InvalidTree(format!(
            "node {} belongs to instance {} and cannot fill its slot",
            content, instance
        )));
    }

    let canonical = component.canonical_key(&data.variant_values)?;
    let placeholder = find_placeholder(scene, component, &canonical, &data.materialized, instance, slot)
        .ok_or_else(|| CanvasError::slot(slot))?;

    scene.reparent(content, Some(placeholder))?;
    scene.update(instance, |n| {
        if let Some(data) = n.instance_data_mut() {
            for fills in data.slot_fills.values_mut() {
                fills.retain(|&id| id != content);
            }
            data.slot_fills.retain(|_, fills| !fills.is_empty());
            data.slot_fills.entry(slot.to_string()).or_default().push(content);
        }
    })?;

    log::debug!("node {} fills slot '{}' of instance {}", content, slot, instance);
    Ok(())
}

/// Merge `overrides` into the entry for `node`, a live descendant of `instance`.
pub fn set_instance_override(scene: &mut Scene, instance: NodeId, node: NodeId, overrides: NodeOverrides) -> CanvasResult<()> {
    instance_data(scene, instance)?;
    scene.node(node)?;
    if !scene.is_ancestor(instance, node) {
        return Err(CanvasError::NotFound(Missing::Descendant { ancestor: instance, node }));
    }
    if let Some(hex) = &overrides.fill {
        if SerializableColor::from_hex(hex).is_none() {
            return Err(CanvasError::SchemaMismatch(format!("'{}' is not a hex colour", hex)));
        }
    }

    scene.update(instance, |n| {
        if let Some(data) = n.instance_data_mut() {
            data.overrides.entry(node).or_default().merge(overrides);
        }
    })?;
    Ok(())
}

/// Apply the overrides every enclosing instance holds for `node`. Nearer
/// instances apply first, so the outermost instance wins.
pub fn apply_overrides(scene: &Scene, node: &mut Node) {
    for ancestor in scene.ancestors(node.id) {
        if let Some(overrides) = scene
            .get(ancestor)
            .and_then(Node::instance_data)
            .and_then(|d| d.overrides.get(&node.id))
        {
            overrides.apply(node);
        }
    }
}

/// A copy of `id` as it should be painted.
pub fn resolved_node(scene: &Scene, id: NodeId) -> Option<Node> {
    let mut node = scene.get(id)?.clone();
    apply_overrides(scene, &mut node);
    Some(node)
}

/// Visibility after overrides.
pub fn is_visible(scene: &Scene, node: &Node) -> bool {
    let mut visible = node.visible;
    for ancestor in scene.ancestors(node.id) {
        if let Some(v) = scene
            .get(ancestor)
            .and_then(Node::instance_data)
            .and_then(|d| d.overrides.get(&node.id))
            .and_then(|o| o.visible)
        {
            visible = v;
        }
    }
    visible
}
