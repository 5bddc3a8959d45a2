//! Component registry and template capture.

use crate::error::{CanvasError, CanvasResult, Missing};
use crate::instance;
use crate::node::{NodeId, NodeKind};
use crate::scene::Scene;
use crate::template::{TemplateId, VariantData};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;

/// Display prefix marking a node a component was captured from.
pub const COMPONENT_TAG: &str = "[C] ";
/// Display prefix marking a slot placeholder.
pub const SLOT_TAG: &str = "[S] ";
/// Display prefix of instance names.
pub const INSTANCE_TAG: &str = "[I] ";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ComponentId(pub u64);

impl fmt::Display for ComponentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A chosen value of a variant property.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum VariantValue {
    Boolean(bool),
    String(String),
}

impl fmt::Display for VariantValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VariantValue::Boolean(b) => write!(f, "{}", b),
            VariantValue::String(s) => write!(f, "{}", s),
        }
    }
}

impl From<bool> for VariantValue {
    fn from(value: bool) -> Self {
        VariantValue::Boolean(value)
    }
}

impl From<&str> for VariantValue {
    fn from(value: &str) -> Self {
        VariantValue::String(value.to_string())
    }
}

/// Property name to chosen value. Serializes with sorted keys.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VariantKey(BTreeMap<String, VariantValue>);

impl VariantKey {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<VariantValue>) -> Self {
        self.0.insert(name.into(), value.into());
        self
    }

    /// Parse a JSON object such as `{"size": true, "tone": "primary"}`.
    pub fn from_json(json: &str) -> CanvasResult<Self> {
        serde_json::from_str(json).map_err(|e| CanvasError::SchemaMismatch(format!("variant key: {}", e)))
    }

    pub fn get(&self, name: &str) -> Option<&VariantValue> {
        self.0.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &VariantValue)> {
        self.0.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// `k=v` pairs joined by commas, in key order.
    pub fn to_key_string(&self) -> String {
        self.0
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join(",")
    }

    pub(crate) fn overlay(&mut self, other: &VariantKey) {
        for (k, v) in &other.0 {
            self.0.insert(k.clone(), v.clone());
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum VariantPropType {
    Boolean,
    String { options: Vec<String> },
}

/// A declared variant property.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariantProp {
    pub name: String,
    pub kind: VariantPropType,
    pub default: VariantValue,
}

/// Input shape for [`ComponentRegistry::add_variant_prop`].
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum PropSpec {
    Boolean {
        #[serde(default)]
        default: bool,
    },
    String {
        options: Vec<String>,
        default: Option<String>,
    },
}

impl VariantProp {
    /// Build a property from `{"type":"boolean","default":false}` or
    /// `{"type":"string","options":[..],"default":".."}`.
    ///
    /// Names and options may not contain `,` or `=`, which separate pairs in
    /// canonical keys.
    pub fn from_spec(name: &str, spec: serde_json::Value) -> CanvasResult<Self> {
        let spec: PropSpec = serde_json::from_value(spec)
            .map_err(|e| CanvasError::SchemaMismatch(format!("property '{}': {}", name, e)))?;
        let reserved = |s: &str| s.contains([',', '=']);
        if reserved(name) {
            return Err(CanvasError::SchemaMismatch(format!(
                "property name '{}' may not contain ',' or '='",
                name
            )));
        }
        if let PropSpec::String { options, .. } = &spec {
            if let Some(bad) = options.iter().find(|o| reserved(o)) {
                return Err(CanvasError::SchemaMismatch(format!(
                    "option '{}' of property '{}' may not contain ',' or '='",
                    bad, name
                )));
            }
        }
        let (kind, default) = match spec {
            PropSpec::Boolean { default } => (VariantPropType::Boolean, VariantValue::Boolean(default)),
            PropSpec::String { options, default } => {
                let default = match default.or_else(|| options.first().cloned()) {
                    Some(d) => d,
                    None => {
                        return Err(CanvasError::SchemaMismatch(format!(
                            "property '{}' has no options",
                            name
                        )));
                    }
                };
                (VariantPropType::String { options }, VariantValue::String(default))
            }
        };
        let prop = Self {
            name: name.to_string(),
            kind,
            default,
        };
        if !prop.accepts(&prop.default) {
            return Err(CanvasError::SchemaMismatch(format!(
                "default '{}' is not valid for property '{}'",
                prop.default, name
            )));
        }
        Ok(prop)
    }

    /// Whether `value` has the right type (and, for strings, is an option).
    pub fn accepts(&self, value: &VariantValue) -> bool {
        match (&self.kind, value) {
            (VariantPropType::Boolean, VariantValue::Boolean(_)) => true,
            (VariantPropType::String { options }, VariantValue::String(s)) => options.contains(s),
            _ => false,
        }
    }
}

/// A named insertion point in the default template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlotDef {
    pub name: String,
    pub placeholder: TemplateId,
    pub default_children: Vec<TemplateId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Component {
    pub id: ComponentId,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub props: Vec<VariantProp>,
    pub slots: Vec<SlotDef>,
    /// Templates by canonical key string.
    pub variants: BTreeMap<String, VariantData>,
    pub default_variant: String,
}

impl Component {
    pub fn prop(&self, name: &str) -> Option<&VariantProp> {
        self.props.iter().find(|p| p.name == name)
    }

    pub fn slot(&self, name: &str) -> Option<&SlotDef> {
        self.slots.iter().find(|s| s.name == name)
    }

    /// The key made of every property's default.
    pub fn default_values(&self) -> VariantKey {
        VariantKey(self.props.iter().map(|p| (p.name.clone(), p.default.clone())).collect())
    }

    /// Validate `key` against the property schema and fill in defaults for
    /// properties it does not name.
    pub fn complete_key(&self, key: &VariantKey) -> CanvasResult<VariantKey> {
        for (name, value) in key.iter() {
            let prop = self.prop(name).ok_or_else(|| {
                CanvasError::SchemaMismatch(format!("component '{}' has no property '{}'", self.name, name))
            })?;
            if !prop.accepts(value) {
                return Err(CanvasError::SchemaMismatch(format!(
                    "value '{}' is not valid for property '{}'",
                    value, name
                )));
            }
        }
        let mut full = self.default_values();
        full.overlay(key);
        Ok(full)
    }

    /// Canonical lookup string: sorted `k=v` pairs, leaving out values equal
    /// to the property default. The all-defaults key is the empty string, so
    /// declaring a new property keeps existing keys stable.
    pub fn canonical_key(&self, key: &VariantKey) -> CanvasResult<String> {
        let full = self.complete_key(key)?;
        let sparse = VariantKey(
            full.0
                .into_iter()
                .filter(|(name, value)| self.prop(name).is_some_and(|p| &p.default != value))
                .collect(),
        );
        Ok(sparse.to_key_string())
    }

    /// Template for a key, or `NotFound` with no fallback.
    pub fn variant(&self, key: &VariantKey) -> CanvasResult<(String, &VariantData)> {
        let canonical = self.canonical_key(key)?;
        match self.variants.get(&canonical) {
            Some(data) => Ok((canonical, data)),
            None => Err(CanvasError::NotFound(Missing::Variant(canonical))),
        }
    }

    pub fn default_template(&self) -> CanvasResult<&VariantData> {
        self.variants
            .get(&self.default_variant)
            .ok_or_else(|| CanvasError::NotFound(Missing::Variant(self.default_variant.clone())))
    }

    /// Structural checks run on import.
    pub fn validate(&self) -> Result<(), String> {
        let mut names = HashSet::new();
        for prop in &self.props {
            if !names.insert(prop.name.as_str()) {
                return Err(format!("component {} declares '{}' twice", self.id, prop.name));
            }
            if !prop.accepts(&prop.default) {
                return Err(format!("component {} property '{}' has an invalid default", self.id, prop.name));
            }
        }
        for (key, data) in &self.variants {
            data.validate().map_err(|e| format!("component {} variant '{}': {}", self.id, key, e))?;
        }
        let default = self
            .variants
            .get(&self.default_variant)
            .ok_or_else(|| format!("component {} has no default variant", self.id))?;
        for slot in &self.slots {
            if default.get(slot.placeholder).is_none() {
                return Err(format!(
                    "component {} slot '{}' placeholder {} not in default template",
                    self.id, slot.name, slot.placeholder
                ));
            }
        }
        Ok(())
    }
}

/// Flat, serializable form of the registry.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RegistryData {
    /// Components sorted by id.
    pub components: Vec<Component>,
    pub next_id: u64,
    #[serde(default)]
    pub next_revision: u64,
}

/// All components of one document.
#[derive(Debug, Clone, PartialEq)]
pub struct ComponentRegistry {
    components: BTreeMap<ComponentId, Component>,
    next_id: u64,
    next_revision: u64,
}

impl Default for ComponentRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ComponentRegistry {
    pub fn new() -> Self {
        Self {
            components: BTreeMap::new(),
            next_id: 1,
            next_revision: 1,
        }
    }

    fn stamp(&mut self, template: &mut VariantData) {
        template.revision = self.next_revision;
        self.next_revision += 1;
    }

    pub fn get(&self, id: ComponentId) -> Option<&Component> {
        self.components.get(&id)
    }

    pub fn component(&self, id: ComponentId) -> CanvasResult<&Component> {
        self.components.get(&id).ok_or(CanvasError::component(id))
    }

    fn component_mut(&mut self, id: ComponentId) -> CanvasResult<&mut Component> {
        self.components.get_mut(&id).ok_or(CanvasError::component(id))
    }

    /// Components in id order.
    pub fn list(&self) -> impl Iterator<Item = &Component> {
        self.components.values()
    }

    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    /// Capture `frame`'s subtree as the default template of a new component
    /// and tag the source node's name.
    pub fn create_component(&mut self, scene: &mut Scene, frame: NodeId, name: &str) -> CanvasResult<ComponentId> {
        let mut template = VariantData::capture(scene, frame)?;
        self.stamp(&mut template);

        let id = ComponentId(self.next_id);
        self.next_id += 1;
        self.components.insert(
            id,
            Component {
                id,
                name: name.to_string(),
                description: String::new(),
                props: Vec::new(),
                slots: Vec::new(),
                variants: BTreeMap::from([(String::new(), template)]),
                default_variant: String::new(),
            },
        );

        scene.update(frame, |n| {
            if !n.name.starts_with(COMPONENT_TAG) {
                n.name = format!("{}{}", COMPONENT_TAG, n.name);
            }
        })?;

        log::debug!("created component {} '{}' from node {}", id, name, frame);
        Ok(id)
    }

    pub fn set_description(&mut self, id: ComponentId, description: &str) -> CanvasResult<()> {
        self.component_mut(id)?.description = description.to_string();
        Ok(())
    }

    /// Declare a variant property. Names must be unique per component.
    pub fn add_variant_prop(&mut self, id: ComponentId, name: &str, spec: serde_json::Value) -> CanvasResult<()> {
        let component = self.component_mut(id)?;
        if component.prop(name).is_some() {
            return Err(CanvasError::SchemaMismatch(format!(
                "component '{}' already has property '{}'",
                component.name, name
            )));
        }
        let prop = VariantProp::from_spec(name, spec)?;
        component.props.push(prop);
        Ok(())
    }

    /// Capture `frame`'s subtree as the template for `key`, replacing any
    /// template already registered under the same canonical key.
    ///
    /// Instances showing a replaced template are re-materialized from the
    /// new one. Their overrides on template nodes are dropped and their slot
    /// content moves to the new placeholders.
    pub fn add_variant(&mut self, scene: &mut Scene, id: ComponentId, key: &VariantKey, frame: NodeId) -> CanvasResult<String> {
        let component = self.component(id)?;
        let canonical = component.canonical_key(key)?;
        let mut template = VariantData::capture(scene, frame)?;
        self.stamp(&mut template);

        let component = self.component_mut(id)?;
        if canonical == component.default_variant {
            rebind_slots(component, &template);
        }
        let replaced = component.variants.insert(canonical.clone(), template).is_some();
        log::debug!("component {} variant '{}' captured from node {}", id, canonical, frame);

        if replaced {
            let refreshed = instance::refresh_instances(scene, self, id, &canonical)?;
            if !refreshed.is_empty() {
                log::info!(
                    "component {} variant '{}' replaced; {} instances re-materialized",
                    id,
                    canonical,
                    refreshed.len()
                );
            }
        }
        Ok(canonical)
    }

    /// Declare a slot whose placeholder is the default-template copy of the
    /// live node `placeholder`. The live node becomes a slot placeholder.
    pub fn add_slot(&mut self, scene: &mut Scene, id: ComponentId, name: &str, placeholder: NodeId) -> CanvasResult<()> {
        let component = self.component(id)?;
        let template = component.default_template()?;
        let source_root = template.root_node()?.source;
        let captured = template
            .find_by_source(placeholder)
            .ok_or(CanvasError::NotFound(Missing::Descendant {
                ancestor: source_root,
                node: placeholder,
            }))?;
        if captured.id == template.root {
            return Err(CanvasError::InvalidTree(format!(
                "the root of component '{}' cannot be its own slot",
                component.name
            )));
        }
        let slot = SlotDef {
            name: name.to_string(),
            placeholder: captured.id,
            default_children: captured.children.clone(),
        };

        if scene.contains(placeholder) {
            scene.update(placeholder, |n| {
                if !n.is_instance() {
                    n.kind = NodeKind::Slot {
                        slot_name: name.to_string(),
                    };
                }
                if !n.name.starts_with(SLOT_TAG) {
                    n.name = format!("{}{}", SLOT_TAG, n.name);
                }
            })?;
        }

        let component = self.component_mut(id)?;
        component.slots.retain(|s| s.name != name);
        component.slots.push(slot);
        log::debug!("component {} slot '{}' at node {}", id, name, placeholder);
        Ok(())
    }

    pub fn remove_component(&mut self, id: ComponentId) -> CanvasResult<Component> {
        self.components.remove(&id).ok_or(CanvasError::component(id))
    }

    /// Drop every component. Ids keep counting.
    pub fn clear(&mut self) {
        self.components.clear();
    }

    pub fn export(&self) -> RegistryData {
        RegistryData {
            components: self.components.values().cloned().collect(),
            next_id: self.next_id,
            next_revision: self.next_revision,
        }
    }

    pub fn import(data: RegistryData) -> CanvasResult<Self> {
        // Snapshots written before templates carried revisions count from 1.
        let next_revision = data
            .components
            .iter()
            .flat_map(|c| c.variants.values())
            .map(|v| v.revision + 1)
            .fold(data.next_revision.max(1), u64::max);

        let mut components = BTreeMap::new();
        for component in data.components {
            component.validate().map_err(CanvasError::InvalidSnapshot)?;
            if component.id.0 == 0 || component.id.0 >= data.next_id {
                return Err(CanvasError::InvalidSnapshot(format!(
                    "component id {} outside allocated range",
                    component.id
                )));
            }
            let id = component.id;
            if components.insert(id, component).is_some() {
                return Err(CanvasError::InvalidSnapshot(format!("duplicate component id {}", id)));
            }
        }
        Ok(Self {
            components,
            next_id: data.next_id,
            next_revision,
        })
    }
}

/// Re-point slot definitions at a replacement default template, matching
/// placeholders by the live node they were captured from.
fn rebind_slots(component: &mut Component, template: &VariantData) {
    let Some(old) = component.variants.get(&component.default_variant) else {
        return;
    };
    let mut kept = Vec::with_capacity(component.slots.len());
    for slot in &component.slots {
        let rebound = old
            .get(slot.placeholder)
            .and_then(|p| template.find_by_source(p.source))
            .filter(|p| p.id != template.root);
        match rebound {
            Some(placeholder) => kept.push(SlotDef {
                name: slot.name.clone(),
                placeholder: placeholder.id,
                default_children: placeholder.children.clone(),
            }),
            None => log::warn!(
                "component {} slot '{}' has no placeholder in the new default template; dropped",
                component.id,
                slot.name
            ),
        }
    }
    component.slots = kept;
}
