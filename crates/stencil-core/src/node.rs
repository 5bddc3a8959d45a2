//! Scene nodes: the unit of the canvas.

use crate::instance::InstanceData;
use crate::layout::Layout;
use kurbo::{Affine, Point, Rect};
use peniko::Color;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque identifier of a live scene node.
///
/// Assigned monotonically by the scene and never reused after removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub u64);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for NodeId {
    fn from(value: u64) -> Self {
        NodeId(value)
    }
}

/// Serializable color representation (RGBA8).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerializableColor {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl SerializableColor {
    pub fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    pub fn black() -> Self {
        Self::new(0, 0, 0, 255)
    }

    pub fn white() -> Self {
        Self::new(255, 255, 255, 255)
    }

    pub fn transparent() -> Self {
        Self::new(0, 0, 0, 0)
    }

    /// Parse `#rgb`, `#rrggbb` or `#rrggbbaa`. Returns `None` for anything else.
    pub fn from_hex(hex: &str) -> Option<Self> {
        let hex = hex.trim().strip_prefix('#')?;
        if !hex.is_ascii() {
            return None;
        }
        let channel = |s: &str| u8::from_str_radix(s, 16).ok();
        match hex.len() {
            3 => {
                // #rgb -> #rrggbb
                let r = channel(&hex[0..1])? * 17;
                let g = channel(&hex[1..2])? * 17;
                let b = channel(&hex[2..3])? * 17;
                Some(Self::new(r, g, b, 255))
            }
            6 => Some(Self::new(
                channel(&hex[0..2])?,
                channel(&hex[2..4])?,
                channel(&hex[4..6])?,
                255,
            )),
            8 => Some(Self::new(
                channel(&hex[0..2])?,
                channel(&hex[2..4])?,
                channel(&hex[4..6])?,
                channel(&hex[6..8])?,
            )),
            _ => None,
        }
    }

    /// Format as `#rrggbb`, or `#rrggbbaa` when not fully opaque.
    pub fn to_hex(&self) -> String {
        if self.a == 255 {
            format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
        } else {
            format!("#{:02x}{:02x}{:02x}{:02x}", self.r, self.g, self.b, self.a)
        }
    }
}

impl From<Color> for SerializableColor {
    fn from(color: Color) -> Self {
        let rgba = color.to_rgba8();
        Self {
            r: rgba.r,
            g: rgba.g,
            b: rgba.b,
            a: rgba.a,
        }
    }
}

impl From<SerializableColor> for Color {
    fn from(color: SerializableColor) -> Self {
        Color::from_rgba8(color.r, color.g, color.b, color.a)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fill {
    pub color: SerializableColor,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stroke {
    pub color: SerializableColor,
    pub width: f64,
}

/// How a text node's box relates to its content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextSizing {
    /// Width and height follow the content and font size.
    #[default]
    Fit,
    /// The box keeps whatever size it was given.
    Fixed,
}

/// A markdown note attached to a node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Note {
    pub content: String,
    #[serde(default)]
    pub tags: Vec<String>,
    /// Milliseconds since the Unix epoch.
    pub updated_at: u64,
}

/// What a node is. The set is closed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum NodeKind {
    Rectangle,
    Ellipse,
    Text {
        content: String,
        font_size: f64,
        font_family: String,
        #[serde(default)]
        sizing: TextSizing,
    },
    Frame,
    Group,
    /// A slot placeholder inside a component template.
    Slot { slot_name: String },
    /// A live instance of a component.
    Instance(Box<InstanceData>),
}

impl NodeKind {
    /// Short lowercase label used in listings.
    pub fn label(&self) -> &'static str {
        match self {
            NodeKind::Rectangle => "rectangle",
            NodeKind::Ellipse => "ellipse",
            NodeKind::Text { .. } => "text",
            NodeKind::Frame => "frame",
            NodeKind::Group => "group",
            NodeKind::Slot { .. } => "slot",
            NodeKind::Instance(_) => "instance",
        }
    }

    fn default_name(&self) -> String {
        match self {
            NodeKind::Rectangle => "Rectangle".to_string(),
            NodeKind::Ellipse => "Ellipse".to_string(),
            NodeKind::Text { .. } => "Text".to_string(),
            NodeKind::Frame => "Frame".to_string(),
            NodeKind::Group => "Group".to_string(),
            NodeKind::Slot { slot_name } => format!("[S] {}", slot_name),
            NodeKind::Instance(_) => "Instance".to_string(),
        }
    }
}

/// A single scene element.
///
/// Coordinates are absolute scene coordinates; `children` is in paint order
/// (last = topmost). The tree links `parent` and `children` belong to the
/// scene store and are only changed through it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    pub name: String,
    pub kind: NodeKind,
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    /// Rotation in radians around the center.
    #[serde(default)]
    pub rotation: f64,
    pub opacity: f64,
    pub visible: bool,
    pub locked: bool,
    pub fill: Option<Fill>,
    pub stroke: Option<Stroke>,
    pub corner_radius: f64,
    #[serde(default)]
    pub layout: Layout,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub notes: Vec<Note>,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
}

impl Node {
    /// Default size of a freshly created node.
    pub const DEFAULT_SIZE: f64 = 100.0;
    /// Default font size for text nodes.
    pub const DEFAULT_FONT_SIZE: f64 = 16.0;
    /// Default font family for text nodes.
    pub const DEFAULT_FONT_FAMILY: &'static str = "Inter";

    /// Create a detached node of the given kind. The id is assigned on insert.
    pub fn new(kind: NodeKind) -> Self {
        Self {
            id: NodeId(0),
            name: kind.default_name(),
            kind,
            x: 0.0,
            y: 0.0,
            width: Self::DEFAULT_SIZE,
            height: Self::DEFAULT_SIZE,
            rotation: 0.0,
            opacity: 1.0,
            visible: true,
            locked: false,
            fill: Some(Fill {
                color: SerializableColor::new(200, 200, 200, 255),
            }),
            stroke: None,
            corner_radius: 0.0,
            layout: Layout::default(),
            notes: Vec::new(),
            parent: None,
            children: Vec::new(),
        }
    }

    pub fn rectangle(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self::new(NodeKind::Rectangle).at(x, y).sized(width, height)
    }

    pub fn ellipse(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self::new(NodeKind::Ellipse).at(x, y).sized(width, height)
    }

    pub fn frame(x: f64, y: f64, width: f64, height: f64) -> Self {
        let mut node = Self::new(NodeKind::Frame).at(x, y).sized(width, height);
        node.fill = Some(Fill {
            color: SerializableColor::white(),
        });
        node
    }

    pub fn group(x: f64, y: f64, width: f64, height: f64) -> Self {
        let mut node = Self::new(NodeKind::Group).at(x, y).sized(width, height);
        node.fill = None;
        node
    }

    /// Text node sized to fit its content.
    pub fn text(x: f64, y: f64, content: &str, font_size: f64) -> Self {
        let mut node = Self::new(NodeKind::Text {
            content: content.to_string(),
            font_size,
            font_family: Self::DEFAULT_FONT_FAMILY.to_string(),
            sizing: TextSizing::Fit,
        })
        .at(x, y);
        node.fit_text();
        node.name = content.chars().take(24).collect();
        node.fill = Some(Fill {
            color: SerializableColor::black(),
        });
        node
    }

    pub fn at(mut self, x: f64, y: f64) -> Self {
        self.x = x;
        self.y = y;
        self
    }

    pub fn sized(mut self, width: f64, height: f64) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Axis-aligned bounds ignoring rotation.
    pub fn bounds(&self) -> Rect {
        Rect::new(self.x, self.y, self.x + self.width, self.y + self.height)
    }

    pub fn center(&self) -> Point {
        self.bounds().center()
    }

    /// Check whether a scene-space point lies inside the node's rotated rectangle.
    /// Edges count as inside.
    pub fn contains_point(&self, point: Point) -> bool {
        let local = if self.rotation != 0.0 {
            Affine::rotate_about(-self.rotation, self.center()) * point
        } else {
            point
        };
        let b = self.bounds();
        local.x >= b.x0 && local.x <= b.x1 && local.y >= b.y0 && local.y <= b.y1
    }

    pub fn is_instance(&self) -> bool {
        matches!(self.kind, NodeKind::Instance(_))
    }

    pub fn instance_data(&self) -> Option<&InstanceData> {
        match &self.kind {
            NodeKind::Instance(data) => Some(data),
            _ => None,
        }
    }

    pub fn instance_data_mut(&mut self) -> Option<&mut InstanceData> {
        match &mut self.kind {
            NodeKind::Instance(data) => Some(data),
            _ => None,
        }
    }

    /// Resize a fitting text node to its content. Height follows the font
    /// size; width is a rough estimate until a renderer measures it. Other
    /// nodes are left alone.
    pub fn fit_text(&mut self) {
        if let NodeKind::Text {
            content,
            font_size,
            sizing: TextSizing::Fit,
            ..
        } = &self.kind
        {
            self.width = (content.chars().count() as f64 * font_size * 0.6).max(1.0);
            self.height = font_size * 1.2;
        }
    }

    pub fn text_sizing(&self) -> Option<TextSizing> {
        match &self.kind {
            NodeKind::Text { sizing, .. } => Some(*sizing),
            _ => None,
        }
    }

    /// Text content for text nodes.
    pub fn text_content(&self) -> Option<&str> {
        match &self.kind {
            NodeKind::Text { content, .. } => Some(content),
            _ => None,
        }
    }
}
