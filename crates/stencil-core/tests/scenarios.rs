//! End-to-end flows through the document API.

use serde_json::json;
use stencil_core::{CanvasError, Document, EditorConfig, Node, NodeId, NodeKind, NodeOverrides, VariantKey, VariantValue};

fn bounds(doc: &Document, id: NodeId) -> (f64, f64, f64, f64) {
    let n = doc.get(id).unwrap();
    (n.x, n.y, n.width, n.height)
}

/// Child kinds in pre-order, ignoring ids.
fn shape(doc: &Document, id: NodeId) -> Vec<(String, usize)> {
    doc.scene()
        .subtree(id)
        .into_iter()
        .map(|n| {
            let node = doc.get(n).unwrap();
            (node.kind.label().to_string(), node.children.len())
        })
        .collect()
}

#[test]
fn size_variant_swaps_instance_contents() {
    let mut doc = Document::new();
    let f = doc.add_frame(0.0, 0.0, 100.0, 100.0);
    doc.add_node(Node::rectangle(10.0, 10.0, 30.0, 30.0), Some(f)).unwrap();
    let c = doc.create_component(f, "Box").unwrap();
    doc.add_variant_prop(c, "size", json!({"type": "boolean", "default": false})).unwrap();

    let f2 = doc.add_frame(300.0, 0.0, 200.0, 200.0);
    doc.add_node(Node::rectangle(320.0, 20.0, 60.0, 60.0), Some(f2)).unwrap();
    doc.add_variant(c, &VariantKey::new().with("size", true), f2).unwrap();

    let i = doc.create_instance(c, 10.0, 10.0).unwrap();
    let data = doc.get(i).unwrap().instance_data().unwrap();
    assert_eq!(data.variant_values.get("size"), Some(&VariantValue::Boolean(false)));
    assert_eq!(bounds(&doc, i), (10.0, 10.0, 100.0, 100.0));
    let old_children = doc.scene().descendants(i);
    assert_eq!(old_children.len(), 1);

    doc.set_instance_variant(i, &VariantKey::new().with("size", true)).unwrap();
    assert_eq!(bounds(&doc, i), (10.0, 10.0, 200.0, 200.0));
    for id in old_children {
        assert!(doc.get(id).is_none());
    }
    let child = doc.scene().children_of(i)[0];
    assert_eq!(bounds(&doc, child), (30.0, 30.0, 60.0, 60.0));
    assert_eq!(doc.scene().check_invariants(), Ok(()));
}

#[test]
fn removing_a_frame_removes_its_children() {
    let mut doc = Document::new();
    let outer = doc.add_frame(0.0, 0.0, 300.0, 300.0);
    let f = doc.add_node(Node::frame(10.0, 10.0, 100.0, 100.0), Some(outer)).unwrap();
    let a = doc.add_node(Node::rectangle(20.0, 20.0, 10.0, 10.0), Some(f)).unwrap();
    let b = doc.add_node(Node::ellipse(40.0, 40.0, 10.0, 10.0), Some(f)).unwrap();

    doc.remove(f).unwrap();
    assert!(doc.get(f).is_none());
    assert!(doc.get(a).is_none());
    assert!(doc.get(b).is_none());
    assert!(!doc.scene().children_of(outer).contains(&f));
    assert!(doc.remove(f).unwrap_err().is_not_found());
}

#[test]
fn switching_to_the_same_variant_twice_keeps_the_shape() {
    let mut doc = Document::new();
    let f = doc.add_frame(0.0, 0.0, 100.0, 50.0);
    doc.add_node(Node::text(5.0, 5.0, "Go", 14.0), Some(f)).unwrap();
    let c = doc.create_component(f, "Button").unwrap();
    doc.add_variant_prop(c, "tone", json!({"type": "string", "options": ["plain", "primary"]}))
        .unwrap();
    let f2 = doc.add_frame(0.0, 100.0, 120.0, 60.0);
    doc.add_node(Node::text(5.0, 105.0, "Go", 14.0), Some(f2)).unwrap();
    doc.add_node(Node::rectangle(0.0, 150.0, 120.0, 10.0), Some(f2)).unwrap();
    doc.add_variant(c, &VariantKey::new().with("tone", "primary"), f2).unwrap();

    let i = doc.create_instance(c, 0.0, 300.0).unwrap();
    let key = VariantKey::new().with("tone", "primary");
    doc.set_instance_variant(i, &key).unwrap();
    let first = (shape(&doc, i), bounds(&doc, i));
    doc.set_instance_variant(i, &key).unwrap();
    assert_eq!((shape(&doc, i), bounds(&doc, i)), first);

    let bad = VariantKey::new().with("tone", "loud");
    assert!(matches!(doc.set_instance_variant(i, &bad), Err(CanvasError::SchemaMismatch(_))));
    assert_eq!(shape(&doc, i), first.0);
}

#[test]
fn duplicate_is_isomorphic_with_fresh_ids() {
    let mut doc = Document::new();
    let f = doc.add_frame(0.0, 0.0, 100.0, 100.0);
    let g = doc.add_node(Node::group(10.0, 10.0, 50.0, 50.0), Some(f)).unwrap();
    doc.add_node(Node::rectangle(12.0, 12.0, 5.0, 5.0), Some(g)).unwrap();
    doc.add_node(Node::text(0.0, 80.0, "Caption", 10.0), Some(f)).unwrap();

    let copy = doc.duplicate(f).unwrap();
    assert_eq!(shape(&doc, copy), shape(&doc, f));

    let originals = doc.scene().subtree(f);
    let copies = doc.scene().subtree(copy);
    assert!(copies.iter().all(|id| !originals.contains(id)));
    for (o, c) in originals.iter().zip(&copies) {
        let (ox, oy, ow, oh) = bounds(&doc, *o);
        assert_eq!(bounds(&doc, *c), (ox + 20.0, oy + 20.0, ow, oh));
    }
    // The copy sits right above the original.
    assert_eq!(doc.scene().root_children(), &[f, copy]);
}

#[test]
fn undo_and_redo_restore_exact_states() {
    let mut doc = Document::new();
    let f = doc.add_frame(0.0, 0.0, 100.0, 100.0);
    let before = doc.export();

    doc.push_undo();
    doc.add_node(Node::rectangle(1.0, 1.0, 5.0, 5.0), Some(f)).unwrap();
    doc.set_fill(f, None).unwrap();
    let after = doc.export();

    doc.undo().unwrap();
    assert_eq!(doc.export(), before);
    doc.redo().unwrap();
    assert_eq!(doc.export(), after);

    // A fresh undo point drops the redo branch.
    doc.undo().unwrap();
    doc.push_undo();
    doc.set_name(f, "Card").unwrap();
    assert!(!doc.can_redo());
}

#[test]
fn history_limit_drops_oldest_states() {
    let mut doc = Document::with_config(EditorConfig {
        history_limit: 3,
        ..EditorConfig::default()
    });
    let f = doc.add_frame(0.0, 0.0, 10.0, 10.0);
    for i in 0..5 {
        doc.push_undo();
        doc.set_name(f, &format!("step {}", i)).unwrap();
    }
    let mut undone = 0;
    while doc.undo().is_ok() {
        undone += 1;
    }
    assert_eq!(undone, 3);
    assert_eq!(doc.get(f).unwrap().name, "step 1");
}

#[test]
fn slots_and_overrides_survive_a_round_trip() {
    let mut doc = Document::new();
    let card = doc.add_frame(0.0, 0.0, 200.0, 120.0);
    doc.add_node(Node::text(10.0, 10.0, "Title", 16.0), Some(card)).unwrap();
    let body = doc.add_node(Node::frame(10.0, 40.0, 180.0, 70.0), Some(card)).unwrap();
    let c = doc.create_component(card, "Card").unwrap();
    doc.add_slot(c, "body", body).unwrap();

    let i = doc.create_instance(c, 300.0, 0.0).unwrap();
    let content = doc.add_text(0.0, 0.0, "Hello", 12.0);
    doc.fill_slot(i, "body", content).unwrap();
    let title = doc
        .scene()
        .descendants(i)
        .into_iter()
        .find(|&id| doc.get(id).and_then(Node::text_content) == Some("Title"))
        .unwrap();
    doc.set_instance_override(i, title, NodeOverrides::text("Welcome")).unwrap();

    let json = doc.to_json().unwrap();
    let loaded = Document::from_json(&json, EditorConfig::default()).unwrap();
    assert_eq!(loaded.to_json().unwrap(), json);

    let placeholder = loaded.get(content).unwrap().parent.unwrap();
    assert!(matches!(loaded.get(placeholder).unwrap().kind, NodeKind::Slot { .. }));
    assert!(loaded.paint_list().iter().any(|n| n.text_content() == Some("Welcome")));
    assert_eq!(loaded.instance_component(i).unwrap().name, "Card");
}

#[test]
fn replacing_a_template_keeps_the_document_importable() {
    let mut doc = Document::new();
    let f = doc.add_frame(0.0, 0.0, 100.0, 100.0);
    doc.add_node(Node::rectangle(10.0, 10.0, 20.0, 20.0), Some(f)).unwrap();
    doc.add_node(Node::rectangle(40.0, 40.0, 20.0, 20.0), Some(f)).unwrap();
    let c = doc.create_component(f, "Pair").unwrap();
    let i = doc.create_instance(c, 200.0, 0.0).unwrap();
    doc.select(doc.scene().children_of(i)[0]).unwrap();

    let empty = doc.add_frame(0.0, 300.0, 50.0, 50.0);
    doc.add_variant(c, &VariantKey::new(), empty).unwrap();

    assert!(doc.scene().children_of(i).is_empty());
    assert!(doc.selection().is_empty());
    let json = doc.to_json().unwrap();
    let loaded = Document::from_json(&json, EditorConfig::default()).unwrap();
    assert_eq!(loaded.to_json().unwrap(), json);
}

#[test]
fn replaced_template_does_not_inherit_overrides() {
    let mut doc = Document::new();
    let f = doc.add_frame(0.0, 0.0, 100.0, 40.0);
    doc.add_node(Node::text(5.0, 5.0, "Label", 14.0), Some(f)).unwrap();
    let c = doc.create_component(f, "Chip").unwrap();
    let i = doc.create_instance(c, 0.0, 100.0).unwrap();
    let label = doc.scene().children_of(i)[0];
    doc.set_instance_override(i, label, NodeOverrides::text("X")).unwrap();

    let other = doc.add_frame(0.0, 300.0, 100.0, 40.0);
    doc.add_node(Node::rectangle(0.0, 300.0, 10.0, 10.0), Some(other)).unwrap();
    doc.add_variant(c, &VariantKey::new(), other).unwrap();
    doc.set_instance_variant(i, &VariantKey::new()).unwrap();

    assert!(doc.get(i).unwrap().instance_data().unwrap().overrides.is_empty());
    assert!(!doc.paint_list().iter().any(|n| n.text_content() == Some("X")));
}

#[test]
fn replacing_the_default_template_keeps_slot_content() {
    let mut doc = Document::new();
    let card = doc.add_frame(0.0, 0.0, 200.0, 120.0);
    let body = doc.add_node(Node::frame(10.0, 40.0, 180.0, 70.0), Some(card)).unwrap();
    let c = doc.create_component(card, "Card").unwrap();
    doc.add_slot(c, "body", body).unwrap();
    let i = doc.create_instance(c, 300.0, 0.0).unwrap();
    let content = doc.add_text(0.0, 0.0, "Hello", 12.0);
    doc.fill_slot(i, "body", content).unwrap();

    // Same source frame, now with a header as well.
    doc.add_node(Node::rectangle(0.0, 0.0, 200.0, 30.0), Some(card)).unwrap();
    doc.add_variant(c, &VariantKey::new(), card).unwrap();

    let placeholder = doc.get(content).unwrap().parent.unwrap();
    assert!(doc.scene().is_ancestor(i, placeholder));
    assert!(matches!(&doc.get(placeholder).unwrap().kind, NodeKind::Slot { slot_name } if slot_name == "body"));
    assert_eq!(doc.get(i).unwrap().instance_data().unwrap().slot_fills["body"], vec![content]);
    assert_eq!(doc.scene().children_of(i).len(), 2);
    assert!(Document::from_json(&doc.to_json().unwrap(), EditorConfig::default()).is_ok());
}

#[test]
fn fill_slot_fails_once_the_variant_lacks_the_slot() {
    let mut doc = Document::new();
    let card = doc.add_frame(0.0, 0.0, 200.0, 120.0);
    let body = doc.add_node(Node::frame(10.0, 40.0, 180.0, 70.0), Some(card)).unwrap();
    let c = doc.create_component(card, "Card").unwrap();
    doc.add_slot(c, "body", body).unwrap();
    doc.add_variant_prop(c, "compact", json!({"type": "boolean"})).unwrap();
    let compact = doc.add_frame(0.0, 200.0, 200.0, 40.0);
    doc.add_variant(c, &VariantKey::new().with("compact", true), compact).unwrap();

    let i = doc.create_instance(c, 300.0, 0.0).unwrap();
    doc.set_instance_variant(i, &VariantKey::new().with("compact", true)).unwrap();
    let content = doc.add_text(0.0, 0.0, "Hello", 12.0);
    let before = doc.export();

    let err = doc.fill_slot(i, "body", content).unwrap_err();
    assert!(matches!(err, CanvasError::NotFound(_)));
    assert_eq!(doc.export(), before);
}

#[test]
fn instance_nodes_with_foreign_references_are_refused() {
    let mut doc = Document::new();
    let f = doc.add_frame(0.0, 0.0, 100.0, 100.0);
    let c = doc.create_component(f, "Box").unwrap();
    let i = doc.create_instance(c, 200.0, 0.0).unwrap();

    let mut forged = doc.get(i).unwrap().clone();
    if let Some(data) = forged.instance_data_mut() {
        data.overrides.insert(NodeId(999), NodeOverrides::visible(false));
    }
    let before = doc.export();
    assert!(matches!(doc.add_node(forged, None), Err(CanvasError::InvalidTree(_))));
    assert_eq!(doc.export(), before);
}
