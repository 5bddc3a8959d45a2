//! Resize handles for the selected node.
//!
//! Eight handles sit on the node's rotated bounding rect: four corners and
//! four edge midpoints. Hit testing happens in screen space so the hotspots
//! keep their size at any zoom.

use crate::node::Node;
use crate::viewport::Viewport;
use kurbo::{Affine, Point};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Corner {
    TopLeft,
    TopRight,
    BottomLeft,
    BottomRight,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Edge {
    Top,
    Right,
    Bottom,
    Left,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HandleKind {
    Corner(Corner),
    Edge(Edge),
}

impl HandleKind {
    /// All eight handles, corners first.
    pub const ALL: [HandleKind; 8] = [
        HandleKind::Corner(Corner::TopLeft),
        HandleKind::Corner(Corner::TopRight),
        HandleKind::Corner(Corner::BottomRight),
        HandleKind::Corner(Corner::BottomLeft),
        HandleKind::Edge(Edge::Top),
        HandleKind::Edge(Edge::Right),
        HandleKind::Edge(Edge::Bottom),
        HandleKind::Edge(Edge::Left),
    ];

    /// Position on the unit square, (0,0) top-left.
    fn anchor(self) -> (f64, f64) {
        match self {
            HandleKind::Corner(Corner::TopLeft) => (0.0, 0.0),
            HandleKind::Corner(Corner::TopRight) => (1.0, 0.0),
            HandleKind::Corner(Corner::BottomRight) => (1.0, 1.0),
            HandleKind::Corner(Corner::BottomLeft) => (0.0, 1.0),
            HandleKind::Edge(Edge::Top) => (0.5, 0.0),
            HandleKind::Edge(Edge::Right) => (1.0, 0.5),
            HandleKind::Edge(Edge::Bottom) => (0.5, 1.0),
            HandleKind::Edge(Edge::Left) => (0.0, 0.5),
        }
    }
}

/// A handle at a screen position.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Handle {
    pub kind: HandleKind,
    pub position: Point,
}

impl Handle {
    /// Square hotspot of `size` screen pixels around the handle.
    pub fn hit_test(&self, screen_point: Point, size: f64) -> bool {
        let half = size / 2.0;
        (screen_point.x - self.position.x).abs() <= half && (screen_point.y - self.position.y).abs() <= half
    }
}

/// Screen positions of the eight handles of `node`.
pub fn handles_for(node: &Node, viewport: &Viewport) -> Vec<Handle> {
    let bounds = node.bounds();
    let rotate = Affine::rotate_about(node.rotation, node.center());
    let to_screen = viewport.transform() * rotate;
    HandleKind::ALL
        .iter()
        .map(|&kind| {
            let (u, v) = kind.anchor();
            let scene = Point::new(bounds.x0 + u * bounds.width(), bounds.y0 + v * bounds.height());
            Handle {
                kind,
                position: to_screen * scene,
            }
        })
        .collect()
}

/// First handle of `node` whose hotspot contains `screen_point`.
pub fn hit_handle(node: &Node, viewport: &Viewport, screen_point: Point, size: f64) -> Option<HandleKind> {
    handles_for(node, viewport)
        .into_iter()
        .find(|h| h.hit_test(screen_point, size))
        .map(|h| h.kind)
}

#[cfg(test)]
mod tests {
    use super::*;
    use kurbo::Vec2;

    #[test]
    fn test_eight_handles_on_bounds() {
        let node = Node::rectangle(10.0, 20.0, 100.0, 50.0);
        let handles = handles_for(&node, &Viewport::new());
        assert_eq!(handles.len(), 8);
        assert_eq!(handles[0].position, Point::new(10.0, 20.0));
        assert_eq!(handles[2].position, Point::new(110.0, 70.0));
        assert_eq!(handles[5].position, Point::new(110.0, 45.0));
    }

    #[test]
    fn test_hit_uses_screen_space() {
        let node = Node::rectangle(0.0, 0.0, 100.0, 100.0);
        let viewport = Viewport::with(Vec2::new(10.0, 10.0), 2.0);

        // Bottom-right corner lands at (210, 210) on screen.
        assert_eq!(
            hit_handle(&node, &viewport, Point::new(213.0, 207.0), 8.0),
            Some(HandleKind::Corner(Corner::BottomRight))
        );
        assert_eq!(
            hit_handle(&node, &viewport, Point::new(110.0, 10.0), 8.0),
            Some(HandleKind::Edge(Edge::Top))
        );
        assert_eq!(hit_handle(&node, &viewport, Point::new(110.0, 110.0), 8.0), None);
    }

    #[test]
    fn test_handles_follow_rotation() {
        let mut node = Node::rectangle(0.0, 0.0, 100.0, 20.0);
        node.rotation = std::f64::consts::FRAC_PI_2;
        let handles = handles_for(&node, &Viewport::new());
        // A quarter turn about (50, 10) moves the top edge midpoint to the right side.
        let top = handles[4].position;
        assert!((top.x - 60.0).abs() < 1e-9);
        assert!((top.y - 10.0).abs() < 1e-9);
    }
}
