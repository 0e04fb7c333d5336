//! Toroidal grid geometry and the position components.
//!
//! The world wraps in both axes. Every coordinate difference in the engine
//! goes through [`Torus::delta`], the signed shortest difference modulo the
//! world size; raw subtraction of two cells is never meaningful on its own.

use glam::{IVec2, Vec2};
use serde::{Deserialize, Serialize};

/// World dimensions in cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Torus {
    pub width: i32,
    pub height: i32,
}

impl Torus {
    /// Dimensions below one cell are raised to one.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width: width.clamp(1, i32::MAX as u32) as i32,
            height: height.clamp(1, i32::MAX as u32) as i32,
        }
    }

    pub fn size(self) -> IVec2 {
        IVec2::new(self.width, self.height)
    }

    /// Canonical representative of a cell, in `[0, width) × [0, height)`.
    pub fn wrap(self, cell: IVec2) -> IVec2 {
        IVec2::new(cell.x.rem_euclid(self.width), cell.y.rem_euclid(self.height))
    }

    /// `origin + offset`, wrapped.
    pub fn offset(self, origin: IVec2, offset: IVec2) -> IVec2 {
        self.wrap(origin + offset)
    }

    /// Signed shortest difference `to - from`. When both ways round are
    /// equally short (even sizes) the positive direction wins.
    pub fn delta(self, from: IVec2, to: IVec2) -> IVec2 {
        IVec2::new(
            shortest(to.x - from.x, self.width),
            shortest(to.y - from.y, self.height),
        )
    }

    pub fn distance(self, a: IVec2, b: IVec2) -> f32 {
        self.delta(a, b).as_vec2().length()
    }

    /// Wrap a continuous point into `[0, width) × [0, height)`.
    pub fn wrap_point(self, p: Vec2) -> Vec2 {
        Vec2::new(
            p.x.rem_euclid(self.width as f32),
            p.y.rem_euclid(self.height as f32),
        )
    }

    /// The copy of `cell` nearest to the continuous point `anchor`, possibly
    /// outside the canonical range. Interpolating from `anchor` to the result
    /// crosses the seam instead of sweeping across the whole world.
    pub fn unwrap_near(self, anchor: Vec2, cell: IVec2) -> Vec2 {
        let anchor_cell = anchor.round().as_ivec2();
        (anchor_cell + self.delta(self.wrap(anchor_cell), cell)).as_vec2()
    }
}

impl Default for Torus {
    fn default() -> Self {
        Self::new(64, 64)
    }
}

fn shortest(d: i32, size: i32) -> i32 {
    let d = d.rem_euclid(size);
    if d > size / 2 { d - size } else { d }
}

/// Logical cell of an entity. Always kept wrapped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Position(pub IVec2);

/// Continuous visual position, written by effects and read by renderers.
/// May lie outside the canonical range while an effect crosses the seam.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Placement(pub Vec2);

/// The four step directions, clockwise from up. The y axis points down.
pub const UP: IVec2 = IVec2::new(0, -1);
pub const RIGHT: IVec2 = IVec2::new(1, 0);
pub const DOWN: IVec2 = IVec2::new(0, 1);
pub const LEFT: IVec2 = IVec2::new(-1, 0);
