//! Screen/scene conversion for pointer queries.
//!
//! The input layer owns panning and zooming; it hands the current view to
//! the core whenever a screen-space query (handle picking) needs it.

use kurbo::{Affine, Point, Vec2};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    /// Screen position of the scene origin.
    pub offset: Vec2,
    /// Screen pixels per scene unit.
    pub zoom: f64,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            offset: Vec2::ZERO,
            zoom: 1.0,
        }
    }
}

impl Viewport {
    /// The identity view.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(offset: Vec2, zoom: f64) -> Self {
        Self { offset, zoom }
    }

    /// Scene to screen.
    pub fn transform(&self) -> Affine {
        Affine::translate(self.offset) * Affine::scale(self.zoom)
    }

    /// Screen to scene.
    pub fn inverse_transform(&self) -> Affine {
        Affine::scale(1.0 / self.zoom) * Affine::translate(-self.offset)
    }

    pub fn screen_to_scene(&self, point: Point) -> Point {
        self.inverse_transform() * point
    }

    pub fn scene_to_screen(&self, point: Point) -> Point {
        self.transform() * point
    }
}
