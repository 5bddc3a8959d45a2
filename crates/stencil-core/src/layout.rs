//! Auto layout for container nodes.
//!
//! A container with a layout mode other than `None` positions its visible
//! children itself: in a single flex line, or in a fixed-column grid.

use crate::node::NodeId;
use crate::scene::Scene;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum LayoutMode {
    #[default]
    None,
    Flex,
    Grid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FlexDirection {
    #[default]
    Row,
    Column,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Align {
    #[default]
    Start,
    Center,
    End,
    Stretch,
}

impl Align {
    /// Parse a CSS-like keyword. Unknown keywords fall back to `Start`.
    pub fn parse(s: &str) -> Self {
        match s {
            "center" => Align::Center,
            "end" => Align::End,
            "stretch" => Align::Stretch,
            _ => Align::Start,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Justify {
    #[default]
    Start,
    Center,
    End,
    SpaceBetween,
    SpaceAround,
    SpaceEvenly,
}

impl Justify {
    /// Parse a CSS-like keyword. Unknown keywords fall back to `Start`.
    pub fn parse(s: &str) -> Self {
        match s {
            "center" => Justify::Center,
            "end" => Justify::End,
            "space-between" | "between" => Justify::SpaceBetween,
            "space-around" | "around" => Justify::SpaceAround,
            "space-evenly" | "evenly" => Justify::SpaceEvenly,
            _ => Justify::Start,
        }
    }
}

/// Padding on the four sides of a container.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Padding {
    pub top: f64,
    pub right: f64,
    pub bottom: f64,
    pub left: f64,
}

impl Padding {
    pub fn uniform(value: f64) -> Self {
        Self {
            top: value,
            right: value,
            bottom: value,
            left: value,
        }
    }
}

/// Layout properties for container nodes (frames, groups, instances).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Layout {
    pub mode: LayoutMode,
    pub direction: FlexDirection,
    pub align_items: Align,
    pub justify_content: Justify,
    pub gap: f64,
    pub padding: Padding,
    pub grid_columns: u32,
}

impl Default for Layout {
    fn default() -> Self {
        Self {
            mode: LayoutMode::None,
            direction: FlexDirection::Row,
            align_items: Align::Start,
            justify_content: Justify::Start,
            gap: 0.0,
            padding: Padding::default(),
            grid_columns: 1,
        }
    }
}

impl Layout {
    pub fn is_active(&self) -> bool {
        self.mode != LayoutMode::None
    }
}

/// Content box of a container after padding.
#[derive(Debug, Clone, Copy)]
struct ContentBox {
    x: f64,
    y: f64,
    width: f64,
    height: f64,
}

/// Run layout on every container with an active layout, parents before children.
pub fn compute_layouts(scene: &mut Scene) {
    let containers: Vec<NodeId> = scene
        .render_order()
        .filter(|&id| scene.get(id).is_some_and(|n| n.layout.is_active()))
        .collect();

    for id in containers {
        compute_node_layout(scene, id);
    }
}

fn compute_node_layout(scene: &mut Scene, parent_id: NodeId) {
    let Some(parent) = scene.get(parent_id) else {
        return;
    };
    let layout = parent.layout.clone();
    let content = ContentBox {
        x: parent.x + layout.padding.left,
        y: parent.y + layout.padding.top,
        width: parent.width - layout.padding.left - layout.padding.right,
        height: parent.height - layout.padding.top - layout.padding.bottom,
    };
    // (id, width, height) of the visible children, in order.
    let children: Vec<(NodeId, f64, f64)> = parent
        .children
        .iter()
        .filter_map(|&id| scene.get(id))
        .filter(|c| c.visible)
        .map(|c| (c.id, c.width, c.height))
        .collect();

    if children.is_empty() {
        return;
    }

    let placements = match layout.mode {
        LayoutMode::Flex => flex_placements(&layout, content, &children),
        LayoutMode::Grid => grid_placements(&layout, content, &children),
        LayoutMode::None => return,
    };

    for placement in placements {
        let Some(child) = scene.get(placement.id) else {
            continue;
        };
        let (dx, dy) = (placement.x - child.x, placement.y - child.y);
        scene.set_frame(placement.id, placement.x, placement.y, placement.width, placement.height);

        // Coordinates are absolute, so the child's own subtree moves with it.
        if dx != 0.0 || dy != 0.0 {
            for id in scene.descendants(placement.id) {
                if let Some((x, y, w, h)) = scene.get(id).map(|n| (n.x, n.y, n.width, n.height)) {
                    scene.set_frame(id, x + dx, y + dy, w, h);
                }
            }
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Placement {
    id: NodeId,
    x: f64,
    y: f64,
    width: f64,
    height: f64,
}

fn flex_placements(layout: &Layout, content: ContentBox, children: &[(NodeId, f64, f64)]) -> Vec<Placement> {
    let is_row = layout.direction == FlexDirection::Row;
    let n = children.len() as f64;
    let main_of = |w: f64, h: f64| if is_row { w } else { h };
    let cross_of = |w: f64, h: f64| if is_row { h } else { w };

    let total_child: f64 = children.iter().map(|&(_, w, h)| main_of(w, h)).sum();
    let avail_main = if is_row { content.width } else { content.height };
    let avail_cross = if is_row { content.height } else { content.width };
    let free = avail_main - total_child;

    let (mut main_pos, spacing) = match layout.justify_content {
        Justify::Start => (0.0, layout.gap),
        Justify::Center => ((free - layout.gap * (n - 1.0)) / 2.0, layout.gap),
        Justify::End => (free - layout.gap * (n - 1.0), layout.gap),
        Justify::SpaceBetween if n > 1.0 => (0.0, free / (n - 1.0)),
        Justify::SpaceBetween => (0.0, 0.0),
        Justify::SpaceAround => {
            let space = free / n;
            (space / 2.0, space)
        }
        Justify::SpaceEvenly => {
            let space = free / (n + 1.0);
            (space, space)
        }
    };

    let mut placements = Vec::with_capacity(children.len());
    for &(id, w, h) in children {
        let child_cross = cross_of(w, h);
        let cross_pos = match layout.align_items {
            Align::Start | Align::Stretch => 0.0,
            Align::Center => (avail_cross - child_cross) / 2.0,
            Align::End => avail_cross - child_cross,
        };
        let (x, y) = if is_row {
            (content.x + main_pos, content.y + cross_pos)
        } else {
            (content.x + cross_pos, content.y + main_pos)
        };
        let (width, height) = match (layout.align_items, is_row) {
            (Align::Stretch, true) => (w, avail_cross),
            (Align::Stretch, false) => (avail_cross, h),
            _ => (w, h),
        };
        placements.push(Placement { id, x, y, width, height });
        main_pos += main_of(w, h) + spacing;
    }
    placements
}

fn grid_placements(layout: &Layout, content: ContentBox, children: &[(NodeId, f64, f64)]) -> Vec<Placement> {
    let cols = layout.grid_columns.max(1) as usize;
    let gap = layout.gap;
    let col_width = (content.width - gap * (cols as f64 - 1.0)) / cols as f64;

    // Row height is the tallest cell in the row.
    let row_heights: Vec<f64> = children
        .chunks(cols)
        .map(|row| row.iter().map(|&(_, _, h)| h).fold(0.0_f64, f64::max))
        .collect();

    let mut placements = Vec::with_capacity(children.len());
    let mut row_y = 0.0;
    for (row, cells) in children.chunks(cols).enumerate() {
        for (col, &(id, _, h)) in cells.iter().enumerate() {
            placements.push(Placement {
                id,
                x: content.x + col as f64 * (col_width + gap),
                y: content.y + row_y,
                width: col_width,
                height: h,
            });
        }
        row_y += row_heights[row] + gap;
    }
    placements
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::Node;

    fn container(scene: &mut Scene, layout: Layout) -> NodeId {
        let mut frame = Node::frame(0.0, 0.0, 300.0, 100.0);
        frame.layout = layout;
        scene.insert(frame, None).unwrap()
    }

    fn child(scene: &mut Scene, parent: NodeId, w: f64, h: f64) -> NodeId {
        scene.insert(Node::rectangle(500.0, 500.0, w, h), Some(parent)).unwrap()
    }

    #[test]
    fn test_flex_row_with_gap() {
        let mut scene = Scene::new();
        let parent = container(
            &mut scene,
            Layout {
                mode: LayoutMode::Flex,
                gap: 10.0,
                padding: Padding::uniform(5.0),
                ..Layout::default()
            },
        );
        let a = child(&mut scene, parent, 50.0, 20.0);
        let b = child(&mut scene, parent, 30.0, 40.0);

        compute_layouts(&mut scene);

        let a = scene.get(a).unwrap();
        let b = scene.get(b).unwrap();
        assert_eq!((a.x, a.y), (5.0, 5.0));
        assert_eq!((b.x, b.y), (65.0, 5.0));
    }

    #[test]
    fn test_placed_child_carries_its_subtree() {
        let mut scene = Scene::new();
        let parent = container(
            &mut scene,
            Layout {
                mode: LayoutMode::Flex,
                ..Layout::default()
            },
        );
        let group = scene.insert(Node::group(100.0, 100.0, 50.0, 50.0), Some(parent)).unwrap();
        let inner = scene.insert(Node::rectangle(110.0, 120.0, 5.0, 5.0), Some(group)).unwrap();

        compute_layouts(&mut scene);

        let inner = scene.get(inner).unwrap();
        assert_eq!((inner.x, inner.y), (10.0, 20.0));
    }

    #[test]
    fn test_flex_column_center_stretch() {
        let mut scene = Scene::new();
        let parent = container(
            &mut scene,
            Layout {
                mode: LayoutMode::Flex,
                direction: FlexDirection::Column,
                justify_content: Justify::Center,
                align_items: Align::Stretch,
                ..Layout::default()
            },
        );
        let a = child(&mut scene, parent, 50.0, 20.0);
        let b = child(&mut scene, parent, 30.0, 40.0);

        compute_layouts(&mut scene);

        let a = scene.get(a).unwrap();
        let b = scene.get(b).unwrap();
        // 100 high, 60 used: 20 above.
        assert_eq!(a.y, 20.0);
        assert_eq!(b.y, 40.0);
        assert_eq!(a.width, 300.0);
        assert_eq!(b.width, 300.0);
    }

    #[test]
    fn test_space_between_skips_hidden() {
        let mut scene = Scene::new();
        let parent = container(
            &mut scene,
            Layout {
                mode: LayoutMode::Flex,
                justify_content: Justify::SpaceBetween,
                ..Layout::default()
            },
        );
        let a = child(&mut scene, parent, 50.0, 20.0);
        let hidden = child(&mut scene, parent, 50.0, 20.0);
        let b = child(&mut scene, parent, 50.0, 20.0);
        scene.update(hidden, |n| n.visible = false).unwrap();

        compute_layouts(&mut scene);

        assert_eq!(scene.get(a).unwrap().x, 0.0);
        assert_eq!(scene.get(b).unwrap().x, 250.0);
        assert_eq!(scene.get(hidden).unwrap().x, 500.0);
    }

    #[test]
    fn test_grid_rows_use_tallest_cell() {
        let mut scene = Scene::new();
        let parent = container(
            &mut scene,
            Layout {
                mode: LayoutMode::Grid,
                grid_columns: 2,
                gap: 10.0,
                ..Layout::default()
            },
        );
        let a = child(&mut scene, parent, 10.0, 20.0);
        let b = child(&mut scene, parent, 10.0, 35.0);
        let c = child(&mut scene, parent, 10.0, 20.0);

        compute_layouts(&mut scene);

        let (a, b, c) = (scene.get(a).unwrap(), scene.get(b).unwrap(), scene.get(c).unwrap());
        assert_eq!((a.x, a.y, a.width), (0.0, 0.0, 145.0));
        assert_eq!((b.x, b.y), (155.0, 0.0));
        assert_eq!((c.x, c.y), (0.0, 45.0));
    }

    #[test]
    fn test_keyword_parsing() {
        assert_eq!(Justify::parse("between"), Justify::SpaceBetween);
        assert_eq!(Justify::parse("bogus"), Justify::Start);
        assert_eq!(Align::parse("stretch"), Align::Stretch);
    }
}
