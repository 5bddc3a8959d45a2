//! One open document: scene, components, history and selection.
//!
//! All edits go through here. Callers that want an edit to be undoable call
//! [`Document::push_undo`] once right before it.

use crate::component::{Component, ComponentId, ComponentRegistry, VariantKey};
use crate::config::EditorConfig;
use crate::error::{CanvasError, CanvasResult, Missing};
use crate::handles::{self, HandleKind};
use crate::history::History;
use crate::instance::{self, NodeOverrides};
use crate::layout::{self, Layout};
use crate::node::{Fill, Node, NodeId, NodeKind, Note, SerializableColor, Stroke, TextSizing};
use crate::scene::Scene;
use crate::snapshot::{DocumentSnapshot, FORMAT_VERSION};
use crate::tree::{LockPolicy, RenderOrder};
use crate::viewport::Viewport;
use kurbo::{Point, Vec2};
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_millis() as u64)
}

/// What history stores: everything that undo restores.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentState {
    pub scene: Scene,
    pub registry: ComponentRegistry,
}

/// Result of a pointer pick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pick {
    Handle { node: NodeId, handle: HandleKind },
    Node(NodeId),
}

#[derive(Debug, Clone)]
pub struct Document {
    pub id: String,
    pub name: String,
    scene: Scene,
    registry: ComponentRegistry,
    history: History<DocumentState>,
    selection: Vec<NodeId>,
    config: EditorConfig,
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Document {
    pub fn new() -> Self {
        Self::with_config(EditorConfig::default())
    }

    pub fn with_config(config: EditorConfig) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: "Untitled".to_string(),
            scene: Scene::new(),
            registry: ComponentRegistry::new(),
            history: History::new(config.history_limit, config.dedupe_history),
            selection: Vec::new(),
            config,
        }
    }

    pub fn scene(&self) -> &Scene {
        &self.scene
    }

    pub fn registry(&self) -> &ComponentRegistry {
        &self.registry
    }

    pub fn config(&self) -> &EditorConfig {
        &self.config
    }

    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.scene.get(id)
    }

    // --- Nodes ---

    pub fn add_node(&mut self, node: Node, parent: Option<NodeId>) -> CanvasResult<NodeId> {
        self.scene.insert(node, parent)
    }

    pub fn add_rectangle(&mut self, x: f64, y: f64, width: f64, height: f64) -> NodeId {
        self.add_root(Node::rectangle(x, y, width, height))
    }

    pub fn add_ellipse(&mut self, x: f64, y: f64, width: f64, height: f64) -> NodeId {
        self.add_root(Node::ellipse(x, y, width, height))
    }

    pub fn add_frame(&mut self, x: f64, y: f64, width: f64, height: f64) -> NodeId {
        self.add_root(Node::frame(x, y, width, height))
    }

    pub fn add_text(&mut self, x: f64, y: f64, content: &str, font_size: f64) -> NodeId {
        self.add_root(Node::text(x, y, content, font_size))
    }

    fn add_root(&mut self, node: Node) -> NodeId {
        self.scene.insert_root(node)
    }

    /// Remove a node and its subtree.
    pub fn remove(&mut self, id: NodeId) -> CanvasResult<()> {
        self.scene.remove(id)?;
        self.prune_selection();
        Ok(())
    }

    pub fn reparent(&mut self, id: NodeId, parent: Option<NodeId>) -> CanvasResult<()> {
        self.scene.reparent(id, parent)
    }

    pub fn reparent_at(&mut self, id: NodeId, parent: Option<NodeId>, index: usize) -> CanvasResult<()> {
        self.scene.reparent_at(id, parent, index)
    }

    /// Duplicate with the configured offset.
    pub fn duplicate(&mut self, id: NodeId) -> CanvasResult<NodeId> {
        let (dx, dy) = self.config.duplicate_offset;
        self.scene.duplicate(id, Vec2::new(dx, dy))
    }

    pub fn find_by_name(&self, query: &str) -> Vec<NodeId> {
        self.scene.find_by_name(query)
    }

    pub fn render_order(&self) -> RenderOrder<'_> {
        self.scene.render_order()
    }

    pub fn compute_layouts(&mut self) {
        layout::compute_layouts(&mut self.scene);
    }

    // --- Field setters ---

    /// Translate a node and everything under it.
    pub fn move_by(&mut self, id: NodeId, dx: f64, dy: f64) -> CanvasResult<()> {
        self.scene.node(id)?;
        for node in self.scene.subtree(id) {
            self.scene.update(node, |n| {
                n.x += dx;
                n.y += dy;
            })?;
        }
        Ok(())
    }

    /// Place a node's top-left corner at (x, y), carrying its subtree along.
    pub fn set_position(&mut self, id: NodeId, x: f64, y: f64) -> CanvasResult<()> {
        let node = self.scene.node(id)?;
        let (dx, dy) = (x - node.x, y - node.y);
        self.move_by(id, dx, dy)
    }

    /// Resize; both sides are kept at least 1. A text node given an
    /// explicit size stops fitting its content.
    pub fn resize(&mut self, id: NodeId, width: f64, height: f64) -> CanvasResult<()> {
        self.scene.update(id, |n| {
            if let NodeKind::Text { sizing, .. } = &mut n.kind {
                *sizing = TextSizing::Fixed;
            }
            n.width = width.max(1.0);
            n.height = height.max(1.0);
        })
    }

    pub fn set_rotation(&mut self, id: NodeId, radians: f64) -> CanvasResult<()> {
        self.scene.update(id, |n| n.rotation = radians)
    }

    pub fn set_fill(&mut self, id: NodeId, color: Option<SerializableColor>) -> CanvasResult<()> {
        self.scene.update(id, |n| n.fill = color.map(|color| Fill { color }))
    }

    pub fn set_stroke(&mut self, id: NodeId, stroke: Option<Stroke>) -> CanvasResult<()> {
        self.scene.update(id, |n| n.stroke = stroke)
    }

    pub fn set_corner_radius(&mut self, id: NodeId, radius: f64) -> CanvasResult<()> {
        self.scene.update(id, |n| n.corner_radius = radius.max(0.0))
    }

    /// Opacity is clamped to [0, 1].
    pub fn set_opacity(&mut self, id: NodeId, opacity: f64) -> CanvasResult<()> {
        self.scene.update(id, |n| n.opacity = opacity.clamp(0.0, 1.0))
    }

    pub fn set_name(&mut self, id: NodeId, name: &str) -> CanvasResult<()> {
        self.scene.update(id, |n| n.name = name.to_string())
    }

    pub fn set_visible(&mut self, id: NodeId, visible: bool) -> CanvasResult<()> {
        self.scene.update(id, |n| n.visible = visible)
    }

    pub fn set_locked(&mut self, id: NodeId, locked: bool) -> CanvasResult<()> {
        self.scene.update(id, |n| n.locked = locked)
    }

    pub fn set_layout(&mut self, id: NodeId, layout: Layout) -> CanvasResult<()> {
        self.scene.update(id, |n| n.layout = layout)
    }

    /// Text setters leave non-text nodes unchanged. Fitting text nodes
    /// resize to the new content.
    pub fn set_text_content(&mut self, id: NodeId, text: &str) -> CanvasResult<()> {
        self.scene.update(id, |n| {
            if let NodeKind::Text { content, .. } = &mut n.kind {
                *content = text.to_string();
            }
            n.fit_text();
        })
    }

    pub fn set_font_size(&mut self, id: NodeId, size: f64) -> CanvasResult<()> {
        self.scene.update(id, |n| {
            if let NodeKind::Text { font_size, .. } = &mut n.kind {
                *font_size = size.max(1.0);
            }
            n.fit_text();
        })
    }

    /// Switching back to `Fit` resizes the node to its content right away.
    pub fn set_text_sizing(&mut self, id: NodeId, mode: TextSizing) -> CanvasResult<()> {
        self.scene.update(id, |n| {
            if let NodeKind::Text { sizing, .. } = &mut n.kind {
                *sizing = mode;
            }
            n.fit_text();
        })
    }

    pub fn set_font_family(&mut self, id: NodeId, family: &str) -> CanvasResult<()> {
        self.scene.update(id, |n| {
            if let NodeKind::Text { font_family, .. } = &mut n.kind {
                *font_family = family.to_string();
            }
        })
    }

    // --- Notes ---

    /// Attach a note to a node. Returns its index.
    pub fn add_note(&mut self, id: NodeId, content: &str, tags: Vec<String>) -> CanvasResult<usize> {
        let note = Note {
            content: content.to_string(),
            tags,
            updated_at: now_millis(),
        };
        self.scene.update(id, |n| {
            n.notes.push(note);
            n.notes.len() - 1
        })
    }

    /// Replace the text of a note, keeping its tags.
    pub fn update_note(&mut self, id: NodeId, index: usize, content: &str) -> CanvasResult<()> {
        self.note_index(id, index)?;
        let updated_at = now_millis();
        self.scene.update(id, |n| {
            if let Some(note) = n.notes.get_mut(index) {
                note.content = content.to_string();
                note.updated_at = updated_at;
            }
        })
    }

    pub fn remove_note(&mut self, id: NodeId, index: usize) -> CanvasResult<Note> {
        self.note_index(id, index)?;
        let removed = self.scene.update(id, |n| n.notes.remove(index))?;
        Ok(removed)
    }

    pub fn notes(&self, id: NodeId) -> CanvasResult<&[Note]> {
        Ok(&self.scene.node(id)?.notes)
    }

    fn note_index(&self, id: NodeId, index: usize) -> CanvasResult<()> {
        if index < self.scene.node(id)?.notes.len() {
            Ok(())
        } else {
            Err(CanvasError::NotFound(Missing::Note { node: id, index }))
        }
    }

    // --- Z-order ---

    pub fn bring_to_front(&mut self, id: NodeId) -> CanvasResult<()> {
        self.scene.bring_to_front(id)
    }

    pub fn send_to_back(&mut self, id: NodeId) -> CanvasResult<()> {
        self.scene.send_to_back(id)
    }

    pub fn bring_forward(&mut self, id: NodeId) -> CanvasResult<bool> {
        self.scene.bring_forward(id)
    }

    pub fn send_backward(&mut self, id: NodeId) -> CanvasResult<bool> {
        self.scene.send_backward(id)
    }

    // --- Components and instances ---

    pub fn create_component(&mut self, frame: NodeId, name: &str) -> CanvasResult<ComponentId> {
        self.registry.create_component(&mut self.scene, frame, name)
    }

    pub fn add_variant_prop(&mut self, component: ComponentId, name: &str, spec: serde_json::Value) -> CanvasResult<()> {
        self.registry.add_variant_prop(component, name, spec)
    }

    /// Returns the canonical key the template was stored under. Instances
    /// of a replaced template are rebuilt from the new one.
    pub fn add_variant(&mut self, component: ComponentId, key: &VariantKey, frame: NodeId) -> CanvasResult<String> {
        let canonical = self.registry.add_variant(&mut self.scene, component, key, frame)?;
        self.prune_selection();
        Ok(canonical)
    }

    pub fn add_slot(&mut self, component: ComponentId, name: &str, placeholder: NodeId) -> CanvasResult<()> {
        self.registry.add_slot(&mut self.scene, component, name, placeholder)
    }

    /// Remove a component no instance still uses.
    pub fn remove_component(&mut self, component: ComponentId) -> CanvasResult<Component> {
        let in_use = self
            .scene
            .nodes()
            .any(|n| n.instance_data().is_some_and(|d| d.component_id == component));
        if in_use {
            return Err(CanvasError::InvalidTree(format!(
                "component {} still has instances",
                component
            )));
        }
        self.registry.remove_component(component)
    }

    pub fn create_instance(&mut self, component: ComponentId, x: f64, y: f64) -> CanvasResult<NodeId> {
        instance::create_instance(&mut self.scene, &self.registry, component, Point::new(x, y))
    }

    pub fn set_instance_variant(&mut self, instance: NodeId, key: &VariantKey) -> CanvasResult<()> {
        instance::set_instance_variant(&mut self.scene, &self.registry, instance, key)?;
        self.prune_selection();
        Ok(())
    }

    pub fn fill_slot(&mut self, instance: NodeId, slot: &str, content: NodeId) -> CanvasResult<()> {
        instance::fill_slot(&mut self.scene, &self.registry, instance, slot, content)
    }

    pub fn set_instance_override(&mut self, instance: NodeId, node: NodeId, overrides: NodeOverrides) -> CanvasResult<()> {
        instance::set_instance_override(&mut self.scene, instance, node, overrides)
    }

    /// Component behind an Instance node.
    pub fn instance_component(&self, id: NodeId) -> CanvasResult<&Component> {
        instance::instance_component(&self.scene, &self.registry, id)
    }

    // --- Reading for the renderer and the pointer ---

    /// Nodes as they should be painted, back to front: overrides applied,
    /// hidden nodes left out.
    pub fn paint_list(&self) -> Vec<Node> {
        self.scene
            .render_order()
            .filter_map(|id| instance::resolved_node(&self.scene, id))
            .filter(|n| n.visible)
            .collect()
    }

    /// Topmost node at a scene point.
    pub fn hit_test(&self, point: Point) -> Option<NodeId> {
        let policy = if self.config.hit_locked {
            LockPolicy::IncludeLocked
        } else {
            LockPolicy::SkipLocked
        };
        self.scene
            .hit_test_with(point, policy, |node| instance::is_visible(&self.scene, node))
    }

    /// Resize handle of the single selected node under a screen point.
    pub fn handle_at(&self, screen_point: Point, viewport: &Viewport) -> Option<(NodeId, HandleKind)> {
        let [id] = self.selection.as_slice() else {
            return None;
        };
        let node = self.scene.get(*id)?;
        handles::hit_handle(node, viewport, screen_point, self.config.handle_size).map(|h| (*id, h))
    }

    /// Handles of the single selection first, then the topmost node.
    pub fn pick(&self, screen_point: Point, viewport: &Viewport) -> Option<Pick> {
        if let Some((node, handle)) = self.handle_at(screen_point, viewport) {
            return Some(Pick::Handle { node, handle });
        }
        self.hit_test(viewport.screen_to_scene(screen_point)).map(Pick::Node)
    }

    // --- Selection ---

    pub fn selection(&self) -> &[NodeId] {
        &self.selection
    }

    /// Replace the selection with one node.
    pub fn select(&mut self, id: NodeId) -> CanvasResult<()> {
        self.scene.node(id)?;
        self.selection = vec![id];
        Ok(())
    }

    pub fn add_to_selection(&mut self, id: NodeId) -> CanvasResult<()> {
        self.scene.node(id)?;
        if !self.selection.contains(&id) {
            self.selection.push(id);
        }
        Ok(())
    }

    pub fn clear_selection(&mut self) {
        self.selection.clear();
    }

    fn prune_selection(&mut self) {
        let scene = &self.scene;
        self.selection.retain(|&id| scene.contains(id));
    }

    // --- History ---

    fn state(&self) -> DocumentState {
        DocumentState {
            scene: self.scene.clone(),
            registry: self.registry.clone(),
        }
    }

    fn restore_state(&mut self, state: DocumentState) {
        self.scene = state.scene;
        self.registry = state.registry;
        self.prune_selection();
    }

    /// Record the current state as an undo point. Returns false when it
    /// matched the previous point and was skipped.
    pub fn push_undo(&mut self) -> bool {
        let state = self.state();
        self.history.push(state)
    }

    pub fn undo(&mut self) -> CanvasResult<()> {
        let current = self.state();
        let previous = self.history.undo(current)?;
        self.restore_state(previous);
        log::info!("undo ({} left)", self.history.undo_len());
        Ok(())
    }

    pub fn redo(&mut self) -> CanvasResult<()> {
        let current = self.state();
        let next = self.history.redo(current)?;
        self.restore_state(next);
        log::info!("redo ({} left)", self.history.redo_len());
        Ok(())
    }

    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }

    // --- Snapshots ---

    pub fn export(&self) -> DocumentSnapshot {
        DocumentSnapshot {
            format_version: FORMAT_VERSION,
            document_id: self.id.clone(),
            name: self.name.clone(),
            scene: self.scene.export(),
            components: self.registry.export(),
        }
    }

    /// Replace the whole document with a validated snapshot. On failure the
    /// document is untouched. History and selection start over.
    pub fn import(&mut self, snapshot: DocumentSnapshot) -> CanvasResult<()> {
        let (scene, registry) = snapshot.restore()?;
        self.scene = scene;
        self.registry = registry;
        self.id = snapshot.document_id;
        self.name = snapshot.name;
        self.history.clear();
        self.selection.clear();
        log::info!(
            "imported document '{}' ({} nodes, {} components)",
            self.name,
            self.scene.len(),
            self.registry.len()
        );
        Ok(())
    }

    pub fn from_snapshot(snapshot: DocumentSnapshot, config: EditorConfig) -> CanvasResult<Self> {
        let mut document = Self::with_config(config);
        document.import(snapshot)?;
        Ok(document)
    }

    /// Build a document from snapshot JSON.
    pub fn from_json(json: &str, config: EditorConfig) -> CanvasResult<Self> {
        Self::from_snapshot(DocumentSnapshot::from_json(json)?, config)
    }

    pub fn to_json(&self) -> CanvasResult<String> {
        self.export().to_json().map_err(CanvasError::from)
    }
}
