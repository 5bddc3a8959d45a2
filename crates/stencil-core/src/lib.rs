//! Stencil Core Library
//!
//! In-memory core of a 2D vector design canvas: the scene tree, reusable
//! components with variants and slots, live instances, and undo/redo.
//! Rendering and input live elsewhere; this crate only owns the data.

pub mod component;
pub mod config;
pub mod document;
pub mod error;
pub mod handles;
pub mod history;
pub mod instance;
pub mod layout;
pub mod node;
pub mod scene;
pub mod snapshot;
pub mod storage;
pub mod template;
pub mod tokens;
pub mod tree;
pub mod viewport;

pub use component::{Component, ComponentId, ComponentRegistry, VariantKey, VariantProp, VariantValue};
pub use config::{ConfigError, EditorConfig};
pub use document::{Document, DocumentState, Pick};
pub use error::{CanvasError, CanvasResult, Missing};
pub use handles::{Corner, Edge, HandleKind};
pub use history::History;
pub use instance::{InstanceData, NodeOverrides};
pub use layout::{Layout, LayoutMode};
pub use node::{Node, NodeId, NodeKind, Note, SerializableColor, TextSizing};
pub use scene::Scene;
pub use snapshot::DocumentSnapshot;
pub use storage::{FileStorage, Storage, StorageError, StorageResult};
pub use tokens::DesignTokens;
pub use tree::LockPolicy;
pub use viewport::Viewport;
