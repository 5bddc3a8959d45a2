//! Whole-document export and validated import.

use crate::component::{ComponentRegistry, RegistryData};
use crate::error::{CanvasError, CanvasResult};
use crate::scene::{Scene, SceneData};
use serde::{Deserialize, Serialize};

/// Current snapshot format.
pub const FORMAT_VERSION: u32 = 1;

/// Flat, deterministic form of one document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentSnapshot {
    pub format_version: u32,
    pub document_id: String,
    pub name: String,
    pub scene: SceneData,
    pub components: RegistryData,
}

impl DocumentSnapshot {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Rebuild the live scene and registry, checking everything that links
    /// them. Nothing is returned unless every check passes.
    pub fn restore(&self) -> CanvasResult<(Scene, ComponentRegistry)> {
        if self.format_version != FORMAT_VERSION {
            return Err(CanvasError::InvalidSnapshot(format!(
                "unsupported format version {}",
                self.format_version
            )));
        }
        let scene = Scene::import(self.scene.clone())?;
        let registry = ComponentRegistry::import(self.components.clone())?;
        check_instances(&scene, &registry).map_err(CanvasError::InvalidSnapshot)?;
        Ok((scene, registry))
    }

    /// Run the import checks without keeping the result.
    pub fn validate(&self) -> CanvasResult<()> {
        self.restore().map(|_| ())
    }
}

/// Every instance names a live component and one of its variants. A
/// materialization map must come from the current revision of that
/// variant's template. Scene import has already checked that every id an
/// instance holds lies inside it.
fn check_instances(scene: &Scene, registry: &ComponentRegistry) -> Result<(), String> {
    for node in scene.nodes() {
        let Some(data) = node.instance_data() else {
            continue;
        };
        let component = registry
            .get(data.component_id)
            .ok_or_else(|| format!("instance {} uses missing component {}", node.id, data.component_id))?;
        let key = component.canonical_key(&data.variant_values).map_err(|e| e.to_string())?;
        let template = component
            .variants
            .get(&key)
            .ok_or_else(|| format!("instance {} uses missing variant '{}'", node.id, key))?;

        if data.materialized.is_empty() {
            continue;
        }
        if data.template_revision != template.revision {
            return Err(format!(
                "instance {} was built from revision {} of variant '{}', which is now at {}",
                node.id, data.template_revision, key, template.revision
            ));
        }
        if let Some(tid) = data.materialized.keys().find(|t| template.get(**t).is_none()) {
            return Err(format!("instance {} maps unknown template node {}", node.id, tid));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::ComponentId;
    use crate::instance;
    use crate::node::{Node, NodeId};
    use kurbo::Point;

    fn sample() -> DocumentSnapshot {
        let mut scene = Scene::new();
        let mut registry = ComponentRegistry::new();
        let frame = scene.insert(Node::frame(0.0, 0.0, 100.0, 100.0), None).unwrap();
        scene.insert(Node::rectangle(10.0, 10.0, 20.0, 20.0), Some(frame)).unwrap();
        let c = registry.create_component(&mut scene, frame, "Box").unwrap();
        instance::create_instance(&mut scene, &registry, c, Point::new(200.0, 0.0)).unwrap();
        DocumentSnapshot {
            format_version: FORMAT_VERSION,
            document_id: "doc".to_string(),
            name: "Sample".to_string(),
            scene: scene.export(),
            components: registry.export(),
        }
    }

    #[test]
    fn test_json_round_trip_is_byte_identical() {
        let snapshot = sample();
        let json = snapshot.to_json().unwrap();
        let back = DocumentSnapshot::from_json(&json).unwrap();
        let (scene, registry) = back.restore().unwrap();
        let again = DocumentSnapshot {
            scene: scene.export(),
            components: registry.export(),
            ..back
        };
        assert_eq!(again.to_json().unwrap(), json);
    }

    #[test]
    fn test_rejects_missing_component() {
        let mut snapshot = sample();
        snapshot.components.components.clear();
        assert!(matches!(snapshot.validate(), Err(CanvasError::InvalidSnapshot(_))));
    }

    #[test]
    fn test_rejects_bad_version() {
        let mut snapshot = sample();
        snapshot.format_version = 99;
        assert!(snapshot.validate().is_err());
    }

    #[test]
    fn test_rejects_dangling_override() {
        let mut snapshot = sample();
        let instance = snapshot
            .scene
            .nodes
            .iter_mut()
            .find_map(|n| n.instance_data_mut())
            .unwrap();
        instance.overrides.insert(NodeId(1), Default::default());
        assert!(matches!(snapshot.validate(), Err(CanvasError::InvalidSnapshot(_))));
    }

    #[test]
    fn test_rejects_out_of_range_component_id() {
        let mut snapshot = sample();
        snapshot.components.components[0].id = ComponentId(50);
        assert!(snapshot.validate().is_err());
    }

    #[test]
    fn test_rejects_stale_template_revision() {
        let mut snapshot = sample();
        let instance = snapshot
            .scene
            .nodes
            .iter_mut()
            .find_map(|n| n.instance_data_mut())
            .unwrap();
        instance.template_revision += 1;
        let err = snapshot.validate().unwrap_err();
        assert!(err.to_string().contains("revision"));
    }
}
