//! Toroidal shadowcasting.
//!
//! Cells are visited in square rings around the viewer. Each ring is walked
//! in four iterations (up, right, down, left); an iteration has a direction
//! `d` pointing away from the viewer and a normal `n` pointing clockwise along
//! the ring side:
//!
//! ```text
//!          ┌──── up: d = (0,-1), n = (1,0) ────┐
//!          │  -2  -1  [0]  +1  +2               │   j = offset along n
//!   left   │                                    │   right
//!          │             viewer                 │
//! ```
//!
//! Per iteration the center cell comes first, then the side cells at `±j`
//! working outwards. The four corners come last, once every side of the ring
//! has been traced.
//!
//! A cell covers an arc of directions, measured in degrees clockwise from
//! straight up. The arc runs between two of the cell's corners picked from its
//! side of the center line. The cell is visible if the arc overlaps what is
//! left of the open sky and the cell is within the elliptical light radius.
//! A visible opaque cell removes its arc from the sky.

use std::collections::HashSet;

use glam::{IVec2, Vec2};

use super::Optics;
use crate::grid::{DOWN, LEFT, RIGHT, Torus, UP};

/// Overlaps thinner than this are corner contacts, not sight lines.
const MIN_OVERLAP: f32 = 1e-3;

/// Cells a viewer can see, in discovery order.
#[derive(Debug, Clone, Default)]
pub struct VisibleSet {
    order: Vec<IVec2>,
    cells: HashSet<IVec2>,
}

impl VisibleSet {
    fn insert(&mut self, cell: IVec2) {
        if self.cells.insert(cell) {
            self.order.push(cell);
        }
    }

    pub fn contains(&self, cell: IVec2) -> bool {
        self.cells.contains(&cell)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = IVec2> + '_ {
        self.order.iter().copied()
    }
}

/// Open arcs of the sky, as non-wrapping `[start, end)` pieces of `[0, 360)`.
#[derive(Debug, Clone)]
struct Sky {
    arcs: Vec<(f32, f32)>,
}

impl Sky {
    fn open() -> Self {
        Self {
            arcs: vec![(0.0, 360.0)],
        }
    }

    fn is_closed(&self) -> bool {
        self.arcs.is_empty()
    }

    fn overlaps(&self, span: Span) -> bool {
        span.pieces().any(|(s, e)| {
            self.arcs
                .iter()
                .any(|&(a, b)| e.min(b) - s.max(a) > MIN_OVERLAP)
        })
    }

    fn subtract(&mut self, span: Span) {
        for (s, e) in span.pieces() {
            let mut kept = Vec::with_capacity(self.arcs.len() + 1);
            for &(a, b) in &self.arcs {
                if e <= a || s >= b {
                    kept.push((a, b));
                    continue;
                }
                if a < s {
                    kept.push((a, s));
                }
                if e < b {
                    kept.push((e, b));
                }
            }
            self.arcs = kept;
        }
    }
}

/// A clockwise arc from `start` to `end`; wraps through 0 when `start > end`.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Span {
    start: f32,
    end: f32,
}

impl Span {
    fn between(from: Vec2, to: Vec2) -> Self {
        Self {
            start: bearing(from),
            end: bearing(to),
        }
    }

    fn pieces(self) -> impl Iterator<Item = (f32, f32)> {
        let (first, second) = if self.start <= self.end {
            ((self.start, self.end), None)
        } else {
            ((self.start, 360.0), Some((0.0, self.end)))
        };
        std::iter::once(first).chain(second)
    }
}

/// Degrees clockwise from straight up, in `[0, 360)`. The y axis points down.
fn bearing(v: Vec2) -> f32 {
    let deg = v.x.atan2(-v.y).to_degrees();
    let deg = if deg < 0.0 { deg + 360.0 } else { deg };
    if deg >= 360.0 { 0.0 } else { deg }
}

/// Where a cell sits within its iteration; decides which corners bound it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Side {
    Center,
    Clockwise,
    Counter,
    Corner,
}

fn span_of(center: Vec2, d: Vec2, n: Vec2, side: Side) -> Span {
    let (from, to) = match side {
        Side::Clockwise | Side::Corner => {
            (center - 0.5 * n + 0.5 * d, center + 0.5 * n - 0.5 * d)
        }
        Side::Counter => (center - 0.5 * n - 0.5 * d, center + 0.5 * n + 0.5 * d),
        Side::Center => (center - 0.5 * n - 0.5 * d, center + 0.5 * n - 0.5 * d),
    };
    Span::between(from, to)
}

const ITERATIONS: [IVec2; 4] = [UP, RIGHT, DOWN, LEFT];

/// Cells visible from `origin` with light `radius`. `opaque` reports whether
/// a (wrapped) cell blocks sight. A radius below one sees nothing, not even
/// the viewer's own cell.
pub fn trace_visibility(
    origin: IVec2,
    radius: f32,
    optics: Optics,
    torus: Torus,
    opaque: impl Fn(IVec2) -> bool,
) -> VisibleSet {
    let mut seen = VisibleSet::default();
    let radius = effective_radius(radius);
    if radius <= 0.0 {
        return seen;
    }
    let origin = torus.wrap(origin);
    seen.insert(origin);

    let optics = optics.checked();
    let aspect = optics.aspect;
    let reach = radius + optics.bias;
    let rings = (radius / aspect).ceil() as i32;
    let mut sky = Sky::open();

    let mut visit = |offset: IVec2, d: IVec2, side: Side, sky: &mut Sky| {
        let rel = offset.as_vec2();
        if (rel.x * aspect).hypot(rel.y) > reach {
            return;
        }
        let n = IVec2::new(-d.y, d.x).as_vec2();
        let span = span_of(rel, d.as_vec2(), n, side);
        if !sky.overlaps(span) {
            return;
        }
        let cell = torus.offset(origin, offset);
        seen.insert(cell);
        if opaque(cell) {
            sky.subtract(span);
        }
    };

    for k in 1..=rings {
        for d in ITERATIONS {
            let n = IVec2::new(-d.y, d.x);
            visit(d * k, d, Side::Center, &mut sky);
            for j in 1..k {
                visit(d * k + n * j, d, Side::Clockwise, &mut sky);
                visit(d * k - n * j, d, Side::Counter, &mut sky);
            }
        }
        for d in ITERATIONS {
            let n = IVec2::new(-d.y, d.x);
            visit(d * k + n * k, d, Side::Corner, &mut sky);
        }
        if sky.is_closed() {
            break;
        }
    }
    seen
}

/// Light below one world unit gives no vision at all.
pub(crate) fn effective_radius(light: f32) -> f32 {
    if light.is_finite() && light >= 1.0 { light } else { 0.0 }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn optics() -> Optics {
        Optics {
            aspect: 1.0,
            bias: 0.5,
        }
    }

    #[test]
    fn bearings_run_clockwise_from_up() {
        let cases = [
            (Vec2::new(0.0, -1.0), 0.0),
            (Vec2::new(1.0, 0.0), 90.0),
            (Vec2::new(0.0, 1.0), 180.0),
            (Vec2::new(-1.0, 0.0), 270.0),
            (Vec2::new(-1.0, -1.0), 315.0),
        ];
        for (v, expected) in cases {
            assert!((bearing(v) - expected).abs() < 1e-3, "{v} → {}", bearing(v));
        }
    }

    #[test]
    fn subtract_splits_and_trims() {
        let mut sky = Sky::open();
        sky.subtract(Span {
            start: 90.0,
            end: 180.0,
        });
        assert_eq!(sky.arcs, vec![(0.0, 90.0), (180.0, 360.0)]);
        sky.subtract(Span {
            start: 350.0,
            end: 10.0,
        });
        assert_eq!(sky.arcs, vec![(10.0, 90.0), (180.0, 350.0)]);
        assert!(!sky.overlaps(Span {
            start: 355.0,
            end: 5.0
        }));
        assert!(sky.overlaps(Span {
            start: 80.0,
            end: 100.0
        }));
    }

    #[test]
    fn open_field_is_a_disc() {
        let torus = Torus::new(40, 40);
        let origin = IVec2::new(20, 20);
        let seen = trace_visibility(origin, 3.0, optics(), torus, |_| false);
        assert!(seen.contains(origin));
        assert!(seen.contains(IVec2::new(23, 20)));
        assert!(seen.contains(IVec2::new(22, 22)));
        assert!(!seen.contains(IVec2::new(23, 23)));
        assert!(!seen.contains(IVec2::new(24, 20)));
    }

    #[test]
    fn north_occluder_blocks_only_its_column() {
        let torus = Torus::new(20, 20);
        let origin = IVec2::new(10, 10);
        let wall = IVec2::new(10, 9);
        let seen = trace_visibility(origin, 4.0, optics(), torus, |c| c == wall);
        assert!(seen.contains(wall));
        assert!(!seen.contains(IVec2::new(10, 8)));
        assert!(!seen.contains(IVec2::new(10, 7)));
        assert!(!seen.contains(IVec2::new(10, 6)));
        assert!(seen.contains(IVec2::new(11, 10)));
        assert!(seen.contains(IVec2::new(9, 10)));
        assert!(seen.contains(IVec2::new(11, 9)));
        assert!(seen.contains(IVec2::new(9, 9)));
    }

    #[test]
    fn sight_wraps_around_the_seam() {
        let torus = Torus::new(10, 10);
        let origin = IVec2::new(0, 5);
        let seen = trace_visibility(origin, 2.0, optics(), torus, |_| false);
        assert!(seen.contains(IVec2::new(9, 5)));
        assert!(seen.contains(IVec2::new(8, 5)));
        assert!(seen.contains(IVec2::new(1, 5)));
        assert!(seen.contains(IVec2::new(2, 5)));
        assert_eq!(torus.delta(origin, IVec2::new(8, 5)), IVec2::new(-2, 0));
        assert_eq!(torus.delta(IVec2::new(8, 5), origin), IVec2::new(2, 0));
    }

    #[test]
    fn dim_light_sees_nothing() {
        let torus = Torus::new(10, 10);
        let seen = trace_visibility(IVec2::new(3, 3), 0.9, optics(), torus, |_| false);
        assert!(seen.is_empty());
    }

    #[test]
    fn enclosed_viewer_stops_at_the_walls() {
        let torus = Torus::new(30, 30);
        let origin = IVec2::new(15, 15);
        let ring = |c: IVec2| {
            let d = torus.delta(origin, c);
            d.x.abs().max(d.y.abs())
        };
        let seen = trace_visibility(origin, 6.0, optics(), torus, |c| ring(c) == 1);
        assert!(seen.iter().all(|c| ring(c) <= 1));
        for wall in [UP, RIGHT, DOWN, LEFT] {
            assert!(seen.contains(origin + wall));
        }
    }

    #[test]
    fn narrow_aspect_reaches_further_sideways() {
        let torus = Torus::new(40, 40);
        let origin = IVec2::new(20, 20);
        let optics = Optics {
            aspect: 0.5,
            bias: 0.5,
        };
        let seen = trace_visibility(origin, 3.0, optics, torus, |_| false);
        assert!(seen.contains(IVec2::new(26, 20)));
        assert!(!seen.contains(IVec2::new(20, 24)));
        assert!(seen.contains(IVec2::new(20, 23)));
    }

    #[test]
    fn zero_aspect_traces_like_square_cells() {
        let torus = Torus::new(40, 40);
        let origin = IVec2::new(20, 20);
        let broken = Optics {
            aspect: 0.0,
            bias: 0.5,
        };
        let seen = trace_visibility(origin, 3.0, broken, torus, |_| false);
        let square = trace_visibility(origin, 3.0, Optics::default(), torus, |_| false);
        assert_eq!(seen.len(), square.len());
        assert!(seen.contains(IVec2::new(23, 20)));
        assert!(!seen.contains(IVec2::new(24, 20)));
    }
}
