//! Stencil CLI - work with saved documents without a canvas.

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use serde_json::json;
use std::path::PathBuf;
use stencil_core::{
    Document, EditorConfig, FileStorage, NodeId, NodeOverrides, Storage, StorageError, TextSizing, VariantKey,
};

/// Stencil CLI - inspect and generate design documents
#[derive(Parser)]
#[command(name = "stencil")]
#[command(about = "Command-line tools for Stencil documents")]
struct Cli {
    /// Editor config file (JSON)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Document directory (default: the platform data directory)
    #[arg(short, long)]
    dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List stored documents
    List,

    /// Print the node tree and component list of a document
    Inspect {
        /// Document id
        id: String,
    },

    /// Check a document against every structural invariant
    Validate {
        /// Document id
        id: String,
    },

    /// List nodes whose name contains a query
    Find {
        /// Document id
        id: String,
        /// Case-insensitive substring
        query: String,
    },

    /// Switch an instance to another variant and save the result
    SetVariant {
        /// Document id
        id: String,
        /// Instance node id
        instance: u64,
        /// Variant key as JSON, e.g. '{"size": true}'
        key: String,
        /// Save under another id (default: overwrite)
        #[arg(short, long)]
        out: Option<String>,
    },

    /// Attach a note to a node and save the result
    Note {
        /// Document id
        id: String,
        /// Node id
        node: u64,
        /// Note text (markdown)
        content: String,
        /// Tags, repeatable
        #[arg(short, long)]
        tag: Vec<String>,
    },

    /// Build a small sample document with a component and instances
    Demo {
        /// Save under this id (default: print the JSON)
        #[arg(short, long)]
        save: Option<String>,
    },
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => {
            EditorConfig::load(path).with_context(|| format!("Failed to load config {}", path.display()))?
        }
        None => EditorConfig::default(),
    };
    let storage = match cli.dir {
        Some(dir) => FileStorage::new(dir),
        None => FileStorage::default_location(),
    }
    .context("Failed to open document directory")?;
    log::debug!("documents in {}", storage.base_path().display());

    match cli.command {
        Commands::List => list(&storage),
        Commands::Inspect { id } => inspect(&load(&storage, &id, config)?),
        Commands::Validate { id } => validate(&storage, &id),
        Commands::Find { id, query } => find(&load(&storage, &id, config)?, &query),
        Commands::SetVariant { id, instance, key, out } => {
            let mut doc = load(&storage, &id, config)?;
            doc.set_instance_variant(NodeId(instance), &VariantKey::from_json(&key)?)?;
            save(&storage, out.as_deref().unwrap_or(&id), &doc)
        }
        Commands::Note { id, node, content, tag } => {
            let mut doc = load(&storage, &id, config)?;
            let index = doc.add_note(NodeId(node), &content, tag)?;
            println!("note {} on node {}", index, node);
            save(&storage, &id, &doc)
        }
        Commands::Demo { save: target } => {
            let doc = demo(config)?;
            match target {
                Some(id) => save(&storage, &id, &doc),
                None => {
                    println!("{}", doc.export().to_json_pretty()?);
                    Ok(())
                }
            }
        }
    }
}

fn load(storage: &impl Storage, id: &str, config: EditorConfig) -> Result<Document> {
    let snapshot = storage.load(id).with_context(|| format!("Failed to load '{}'", id))?;
    Document::from_snapshot(snapshot, config).with_context(|| format!("Failed to open '{}'", id))
}

fn save(storage: &impl Storage, id: &str, doc: &Document) -> Result<()> {
    storage
        .save(id, &doc.export())
        .with_context(|| format!("Failed to save '{}'", id))?;
    log::info!("saved '{}'", id);
    Ok(())
}

fn list(storage: &impl Storage) -> Result<()> {
    let ids = storage.list()?;
    if ids.is_empty() {
        println!("No documents.");
    }
    for id in ids {
        println!("{}", id);
    }
    Ok(())
}

fn inspect(doc: &Document) -> Result<()> {
    println!("{} ({})", doc.name, doc.id);
    println!("{} nodes", doc.scene().len());
    for &root in doc.scene().root_children() {
        print_tree(doc, root, 1);
    }

    if !doc.registry().is_empty() {
        println!();
        println!("Components:");
        for component in doc.registry().list() {
            let variants: Vec<&str> = component
                .variants
                .keys()
                .map(|k| if k.is_empty() { "default" } else { k.as_str() })
                .collect();
            println!("  {} {} [{}]", component.id, component.name, variants.join(", "));
            for slot in &component.slots {
                println!("    slot {}", slot.name);
            }
        }
    }
    Ok(())
}

fn print_tree(doc: &Document, id: NodeId, depth: usize) {
    let Some(node) = doc.get(id) else {
        return;
    };
    let mut line = format!(
        "{}{} {} '{}' ({}, {}, {}x{})",
        "  ".repeat(depth),
        node.id,
        node.kind.label(),
        node.name,
        node.x,
        node.y,
        node.width,
        node.height
    );
    if let Some(data) = node.instance_data() {
        line.push_str(&format!(" of {}", data.component_id));
        if !data.variant_values.is_empty() {
            line.push_str(&format!(" [{}]", data.variant_values.to_key_string()));
        }
    }
    if !node.visible {
        line.push_str(" hidden");
    }
    if node.locked {
        line.push_str(" locked");
    }
    if node.text_sizing() == Some(TextSizing::Fixed) {
        line.push_str(" fixed");
    }
    match node.notes.len() {
        0 => {}
        1 => line.push_str(" (1 note)"),
        n => line.push_str(&format!(" ({} notes)", n)),
    }
    println!("{}", line);
    for &child in &node.children {
        print_tree(doc, child, depth + 1);
    }
}

fn validate(storage: &impl Storage, id: &str) -> Result<()> {
    match storage.load(id) {
        Ok(_) => {
            println!("{}: ok", id);
            Ok(())
        }
        Err(StorageError::Invalid(e)) => bail!("{}: {}", id, e),
        Err(e) => Err(e).with_context(|| format!("Failed to read '{}'", id)),
    }
}

fn find(doc: &Document, query: &str) -> Result<()> {
    let hits = doc.find_by_name(query);
    if hits.is_empty() {
        println!("No nodes match '{}'.", query);
    }
    for id in hits {
        if let Some(node) = doc.get(id) {
            println!("{} {} '{}'", node.id, node.kind.label(), node.name);
        }
    }
    Ok(())
}

/// A button component with a size variant and a slot, two instances, one
/// of them switched and overridden.
fn demo(config: EditorConfig) -> Result<Document> {
    let mut doc = Document::with_config(config);
    doc.name = "Demo".to_string();

    let button = doc.add_frame(0.0, 0.0, 120.0, 40.0);
    doc.set_name(button, "Button")?;
    doc.set_corner_radius(button, 6.0)?;
    let label = doc.add_text(12.0, 10.0, "Button", 16.0);
    doc.reparent(label, Some(button))?;
    let icon = doc.add_frame(92.0, 10.0, 20.0, 20.0);
    doc.reparent(icon, Some(button))?;

    let component = doc.create_component(button, "Button")?;
    doc.add_variant_prop(component, "large", json!({"type": "boolean", "default": false}))?;
    doc.add_slot(component, "icon", icon)?;

    let large = doc.add_frame(0.0, 80.0, 180.0, 56.0);
    doc.set_corner_radius(large, 8.0)?;
    let large_label = doc.add_text(16.0, 96.0, "Button", 20.0);
    doc.reparent(large_label, Some(large))?;
    doc.add_variant(component, &VariantKey::new().with("large", true), large)?;

    let first = doc.create_instance(component, 300.0, 0.0)?;
    let second = doc.create_instance(component, 300.0, 80.0)?;
    doc.set_instance_variant(second, &VariantKey::new().with("large", true))?;
    if let Some(&text) = doc.scene().children_of(second).first() {
        doc.set_instance_override(second, text, NodeOverrides::text("Buy now"))?;
    }
    let star = doc.add_ellipse(0.0, 0.0, 16.0, 16.0);
    doc.fill_slot(first, "icon", star)?;

    let caption = doc.add_text(0.0, 200.0, "Two buttons, one component", 14.0);
    doc.set_text_sizing(caption, TextSizing::Fixed)?;
    doc.add_note(button, "Keep labels short", vec!["copy".to_string()])?;

    Ok(doc)
}
