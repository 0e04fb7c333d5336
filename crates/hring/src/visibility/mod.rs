//! # Visibility — Fog of War on the Torus
//!
//! Every entity taking part in the map memory carries a [`FogState`]:
//! `Hidden` (never seen), `Fog` (seen before, remembered) or `Visible` (in
//! view right now). The [`VisibilityEngine`] recomputes these around the
//! [`Viewer`] whenever the world [`Revision`](crate::generation::Revision)
//! moved since its last run.
//!
//! A run has two phases so that no partial result leaks into the trace:
//!
//! ```text
//! mark    Visible entities near the viewer          → pending Fog
//! trace   cells reached by shadowcasting            → pending Visible
//!         entities of the viewer's structure        → pending Visible
//! commit  pending targets, in the order they were marked
//! ```
//!
//! Commit rules:
//! - `fixed` entities never change.
//! - `Air` fillers only exist to fill unexplored darkness. They are disposed
//!   the first time they would become anything but `Hidden`.
//! - The first time a structure fragment goes `Hidden → Visible`, every other
//!   `Hidden` fragment of that structure becomes `Fog`. A structure is
//!   discovered as a whole, but each fragment still needs its own sight line
//!   to become `Visible`.
//!
//! The engine keeps an index of fog entities by cell, fed by the `FogState`
//! diff journals. Entities with [`Motion`] are re-indexed every run.

mod shadow;

use std::collections::{BTreeSet, HashMap, HashSet};

use glam::IVec2;
use serde::{Deserialize, Serialize};

use crate::ecs::{Entity, World};
use crate::generation::{Notify, Watermark};
use crate::grid::{Position, Torus};
use crate::movement::Motion;

pub use shadow::{VisibleSet, trace_visibility};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub enum Visibility {
    #[default]
    Hidden,
    Fog,
    Visible,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum FogKind {
    /// Placeholder filling unexplored cells; disposed once revealed.
    Air,
    #[default]
    Terrain,
    Object,
    Unit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FogState {
    pub visibility: Visibility,
    pub kind: FogKind,
    /// Pinned: the engine never changes it.
    pub fixed: bool,
}

impl FogState {
    pub fn new(kind: FogKind) -> Self {
        Self {
            kind,
            ..Self::default()
        }
    }

    pub fn fixed(kind: FogKind, visibility: Visibility) -> Self {
        Self {
            visibility,
            kind,
            fixed: true,
        }
    }
}

/// The entity whose sight drives the fog. `light` is the sight radius.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Viewer {
    pub light: f32,
}

/// Blocks line of sight through its cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Opaque;

/// Membership in a multi-cell structure such as a house.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Structure(pub u32);

/// Cell geometry for the light radius.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Optics {
    /// Cell width over cell height, in (0, 1]. Sight reaches `1 / aspect`
    /// times further sideways.
    pub aspect: f32,
    /// Added to the radius so rounding does not leave gaps at the rim.
    pub bias: f32,
}

impl Optics {
    /// Replace values that would break the trace: a non-positive or
    /// non-finite aspect becomes 1, a negative or non-finite bias becomes 0.
    pub(crate) fn checked(self) -> Self {
        let mut optics = self;
        if !(optics.aspect.is_finite() && optics.aspect > 0.0) {
            log::warn!("invalid optics aspect {}; using 1", optics.aspect);
            optics.aspect = 1.0;
        }
        if !(optics.bias.is_finite() && optics.bias >= 0.0) {
            log::warn!("invalid optics bias {}; using 0", optics.bias);
            optics.bias = 0.0;
        }
        optics
    }
}

impl Default for Optics {
    fn default() -> Self {
        Self {
            aspect: 1.0,
            bias: 0.5,
        }
    }
}

/// Pending targets, remembering the order entities were first marked.
#[derive(Debug, Default)]
struct Pending {
    order: Vec<Entity>,
    targets: HashMap<Entity, Visibility>,
}

impl Pending {
    fn set(&mut self, entity: Entity, target: Visibility) {
        if self.targets.insert(entity, target).is_none() {
            self.order.push(entity);
        }
    }

    fn get(&self, entity: Entity) -> Option<Visibility> {
        self.targets.get(&entity).copied()
    }
}

/// Axis-aligned box of cells around a center.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Window {
    center: IVec2,
    half: IVec2,
}

impl Window {
    fn cells(self, torus: Torus) -> Vec<IVec2> {
        let mut seen = HashSet::new();
        let mut cells = Vec::new();
        for dy in -self.half.y..=self.half.y {
            for dx in -self.half.x..=self.half.x {
                let cell = torus.offset(self.center, IVec2::new(dx, dy));
                if seen.insert(cell) {
                    cells.push(cell);
                }
            }
        }
        cells
    }
}

#[derive(Debug, Default)]
pub struct VisibilityEngine {
    watermark: Watermark,
    tracking: bool,
    cells: HashMap<IVec2, Vec<Entity>>,
    located: HashMap<Entity, IVec2>,
    last_window: Option<Window>,
    /// Entities left `Visible` by the last run, wherever they are.
    lit: BTreeSet<Entity>,
    last_transitions: usize,
}

impl VisibilityEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Transitions committed by the most recent run.
    pub fn last_transitions(&self) -> usize {
        self.last_transitions
    }

    /// Fog entities indexed at `cell`, sorted.
    pub fn entities_at(&self, cell: IVec2) -> &[Entity] {
        self.cells.get(&cell).map_or(&[], Vec::as_slice)
    }

    /// Recompute fog around the viewer if anything changed. Returns the number
    /// of transitions committed.
    pub fn update(&mut self, world: &mut World) -> usize {
        let torus = world.get_resource::<Torus>().copied().unwrap_or_default();
        self.sync_index(world, torus);

        if !self.watermark.is_stale(world.revision()) {
            return 0;
        }
        let transitions = match find_viewer(world) {
            Some((viewer, origin, light)) => self.run(world, torus, viewer, origin, light),
            None => 0,
        };
        // Our own touches must not trigger another run.
        self.watermark.observe(world.revision());
        self.last_transitions = transitions;
        transitions
    }

    fn run(
        &mut self,
        world: &mut World,
        torus: Torus,
        viewer: Entity,
        origin: IVec2,
        light: f32,
    ) -> usize {
        let optics = world
            .get_resource::<Optics>()
            .copied()
            .unwrap_or_default()
            .checked();
        let radius = shadow::effective_radius(light);
        let window = Window {
            center: origin,
            half: IVec2::new(
                (radius / optics.aspect).ceil() as i32 + 1,
                radius.ceil() as i32 + 1,
            ),
        };

        let mut pending = Pending::default();
        for w in std::iter::once(window).chain(self.last_window) {
            for cell in w.cells(torus) {
                for &e in self.entities_at(cell) {
                    if visibility_of(world, e) == Some(Visibility::Visible) {
                        pending.set(e, Visibility::Fog);
                    }
                }
            }
        }
        self.last_window = Some(window);
        // Structure see-through can light entities outside both windows.
        for &e in &self.lit {
            if visibility_of(world, e) == Some(Visibility::Visible) {
                pending.set(e, Visibility::Fog);
            }
        }

        let walls: HashSet<IVec2> = {
            let mut walls = HashSet::new();
            world.query_filtered::<(&Position,), Opaque>(|_, (p,)| {
                walls.insert(torus.wrap(p.0));
            });
            walls
        };
        let seen = trace_visibility(origin, radius, optics, torus, |c| walls.contains(&c));
        for cell in seen.iter() {
            for &e in self.entities_at(cell) {
                pending.set(e, Visibility::Visible);
            }
        }

        if radius > 0.0 {
            if let Some(home) = self.structure_at(world, viewer, origin) {
                for e in members(world, home) {
                    pending.set(e, Visibility::Visible);
                }
            }
        }

        let transitions = commit(world, &pending);
        self.lit = pending
            .order
            .iter()
            .copied()
            .filter(|&e| visibility_of(world, e) == Some(Visibility::Visible))
            .collect();
        log::debug!(
            "visibility from {origin} r={radius}: {} seen, {transitions} transitions",
            seen.len()
        );
        transitions
    }

    /// The structure enclosing the viewer: its own, else that of a fragment
    /// in its cell.
    fn structure_at(&self, world: &World, viewer: Entity, origin: IVec2) -> Option<Structure> {
        world.get::<Structure>(viewer).copied().or_else(|| {
            self.entities_at(origin)
                .iter()
                .find_map(|&e| world.get::<Structure>(e).copied())
        })
    }

    fn sync_index(&mut self, world: &mut World, torus: Torus) {
        if !self.tracking {
            world.track::<FogState>();
            world.added::<FogState>();
            world.removed::<FogState>();
            for e in world.entities_with::<FogState>() {
                if let Some(p) = world.get::<Position>(e) {
                    self.place(e, torus.wrap(p.0));
                }
            }
            self.tracking = true;
            return;
        }

        for e in world.removed::<FogState>() {
            self.unplace(e);
        }
        for e in world.added::<FogState>() {
            if !world.has::<FogState>(e) {
                continue;
            }
            match world.get::<Position>(e) {
                Some(p) => self.place(e, torus.wrap(p.0)),
                None => log::warn!("fog entity {e} has no position; it stays out of the fog map"),
            }
        }

        let mut moved = Vec::new();
        world.query_filtered::<(&Position, &FogState), Motion>(|e, (p, _)| {
            let cell = torus.wrap(p.0);
            if self.located.get(&e) != Some(&cell) {
                moved.push((e, cell));
            }
        });
        for (e, cell) in moved {
            self.place(e, cell);
        }
    }

    fn place(&mut self, entity: Entity, cell: IVec2) {
        self.unplace(entity);
        let slot = self.cells.entry(cell).or_default();
        let at = slot.binary_search(&entity).unwrap_or_else(|i| i);
        slot.insert(at, entity);
        self.located.insert(entity, cell);
    }

    fn unplace(&mut self, entity: Entity) {
        let Some(cell) = self.located.remove(&entity) else {
            return;
        };
        if let Some(slot) = self.cells.get_mut(&cell) {
            slot.retain(|&e| e != entity);
            if slot.is_empty() {
                self.cells.remove(&cell);
            }
        }
    }
}

fn find_viewer(world: &World) -> Option<(Entity, IVec2, f32)> {
    world.entities_with::<Viewer>().into_iter().find_map(|e| {
        let light = world.get::<Viewer>(e)?.light;
        let cell = world.get::<Position>(e)?.0;
        Some((e, cell, light))
    })
}

fn visibility_of(world: &World, entity: Entity) -> Option<Visibility> {
    world.get::<FogState>(entity).map(|f| f.visibility)
}

/// Fog entities of a structure, sorted.
fn members(world: &World, structure: Structure) -> Vec<Entity> {
    world
        .entities_with::<Structure>()
        .into_iter()
        .filter(|&e| world.get::<Structure>(e) == Some(&structure) && world.has::<FogState>(e))
        .collect()
}

/// Apply pending targets in mark order. Returns the number of transitions,
/// disposals included.
fn commit(world: &mut World, pending: &Pending) -> usize {
    let mut transitions = 0;
    for &entity in &pending.order {
        let Some(target) = pending.get(entity) else {
            continue;
        };
        // May already be gone: an earlier fragment can dispose air siblings.
        let Some(state) = world.get::<FogState>(entity).copied() else {
            continue;
        };
        if state.fixed || state.visibility == target {
            continue;
        }
        if state.kind == FogKind::Air {
            if target != Visibility::Hidden {
                world.despawn(entity);
                transitions += 1;
            }
            continue;
        }
        if state.visibility == Visibility::Hidden && target == Visibility::Visible {
            if let Some(structure) = world.get::<Structure>(entity).copied() {
                transitions += discover(world, pending, entity, structure);
            }
        }
        set_visibility(world, entity, target);
        transitions += 1;
    }
    transitions
}

/// First sight of a structure fragment: remember the rest of the structure.
fn discover(world: &mut World, pending: &Pending, seen: Entity, structure: Structure) -> usize {
    let mut transitions = 0;
    for sibling in members(world, structure) {
        if sibling == seen || pending.get(sibling) == Some(Visibility::Visible) {
            continue;
        }
        let Some(state) = world.get::<FogState>(sibling).copied() else {
            continue;
        };
        if state.fixed || state.visibility != Visibility::Hidden {
            continue;
        }
        if state.kind == FogKind::Air {
            world.despawn(sibling);
        } else {
            set_visibility(world, sibling, Visibility::Fog);
        }
        transitions += 1;
    }
    transitions
}

fn set_visibility(world: &mut World, entity: Entity, visibility: Visibility) {
    if let Some(state) = world.get_mut::<FogState>(entity) {
        state.visibility = visibility;
    }
    world.touch(entity);
}

/// Visibility stage system.
pub fn update_visibility(world: &mut World) {
    let Some(mut engine) = world.resource_remove::<VisibilityEngine>() else {
        return;
    };
    engine.update(world);
    world.insert_resource(engine);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generation::Renderable;

    fn world(width: u32, height: u32) -> World {
        let mut world = World::new();
        world.insert_resource(Torus::new(width, height));
        world.insert_resource(Optics::default());
        world
    }

    fn cell(world: &mut World, x: i32, y: i32, kind: FogKind) -> Entity {
        world.spawn((
            Position(IVec2::new(x, y)),
            FogState::new(kind),
            Renderable::default(),
        ))
    }

    fn vis(world: &World, e: Entity) -> Option<Visibility> {
        visibility_of(world, e)
    }

    #[test]
    fn viewer_reveals_its_surroundings() {
        let mut world = world(20, 20);
        world.spawn((Position(IVec2::new(5, 5)), Viewer { light: 3.0 }));
        let near = cell(&mut world, 6, 5, FogKind::Terrain);
        let far = cell(&mut world, 15, 15, FogKind::Terrain);
        world.touch(near);

        let mut engine = VisibilityEngine::new();
        assert!(engine.update(&mut world) >= 1);
        assert_eq!(vis(&world, near), Some(Visibility::Visible));
        assert_eq!(vis(&world, far), Some(Visibility::Hidden));
    }

    #[test]
    fn second_commit_is_a_no_op() {
        let mut world = world(20, 20);
        world.spawn((Position(IVec2::new(5, 5)), Viewer { light: 3.0 }));
        for x in 3..8 {
            cell(&mut world, x, 5, FogKind::Terrain);
        }
        let mut engine = VisibilityEngine::new();
        assert_eq!(engine.update(&mut world), 5);
        let revision = world.revision();
        world.touch_by(Entity::from_bits(u64::MAX), 1);
        assert_eq!(engine.update(&mut world), 0);
        assert_eq!(world.revision(), revision + 1);
        assert_eq!(engine.update(&mut world), 0);
    }

    #[test]
    fn unchanged_revision_skips_the_run() {
        let mut world = world(20, 20);
        let viewer = world.spawn((Position(IVec2::new(5, 5)), Viewer { light: 3.0 }));
        let e = cell(&mut world, 5, 6, FogKind::Terrain);
        let mut engine = VisibilityEngine::new();
        engine.update(&mut world);
        assert_eq!(vis(&world, e), Some(Visibility::Visible));

        // Moving without a touch goes unnoticed.
        if let Some(p) = world.get_mut::<Position>(viewer) {
            p.0 = IVec2::new(15, 15);
        }
        assert_eq!(engine.update(&mut world), 0);
        assert_eq!(vis(&world, e), Some(Visibility::Visible));

        world.touch(viewer);
        assert_eq!(engine.update(&mut world), 1);
        assert_eq!(vis(&world, e), Some(Visibility::Fog));
    }

    #[test]
    fn fog_then_visible_again() {
        let mut world = world(30, 30);
        let viewer = world.spawn((Position(IVec2::new(5, 5)), Viewer { light: 2.0 }));
        let e = cell(&mut world, 6, 5, FogKind::Object);
        let mut engine = VisibilityEngine::new();
        engine.update(&mut world);

        world.get_mut::<Position>(viewer).unwrap().0 = IVec2::new(20, 20);
        world.touch(viewer);
        engine.update(&mut world);
        assert_eq!(vis(&world, e), Some(Visibility::Fog));

        world.get_mut::<Position>(viewer).unwrap().0 = IVec2::new(5, 5);
        world.touch(viewer);
        engine.update(&mut world);
        assert_eq!(vis(&world, e), Some(Visibility::Visible));
    }

    #[test]
    fn north_wall_hides_what_is_behind_it() {
        let mut world = world(20, 20);
        world.spawn((Position(IVec2::new(10, 10)), Viewer { light: 4.0 }));
        let wall = cell(&mut world, 10, 9, FogKind::Terrain);
        world.insert(wall, Opaque);
        let behind = cell(&mut world, 10, 7, FogKind::Terrain);
        let east = cell(&mut world, 11, 10, FogKind::Terrain);
        let west = cell(&mut world, 9, 10, FogKind::Terrain);

        VisibilityEngine::new().update(&mut world);
        assert_eq!(vis(&world, wall), Some(Visibility::Visible));
        assert_eq!(vis(&world, behind), Some(Visibility::Hidden));
        assert_eq!(vis(&world, east), Some(Visibility::Visible));
        assert_eq!(vis(&world, west), Some(Visibility::Visible));
    }

    #[test]
    fn sight_wraps_across_the_edge() {
        let mut world = world(10, 10);
        world.spawn((Position(IVec2::new(0, 4)), Viewer { light: 2.0 }));
        let one = cell(&mut world, 9, 4, FogKind::Terrain);
        let two = cell(&mut world, 8, 4, FogKind::Terrain);
        let three = cell(&mut world, 7, 4, FogKind::Terrain);
        VisibilityEngine::new().update(&mut world);
        assert_eq!(vis(&world, one), Some(Visibility::Visible));
        assert_eq!(vis(&world, two), Some(Visibility::Visible));
        assert_eq!(vis(&world, three), Some(Visibility::Hidden));
    }

    #[test]
    fn structure_is_discovered_as_a_whole() {
        let mut world = world(30, 30);
        world.spawn((Position(IVec2::new(0, 0)), Viewer { light: 3.0 }));
        let seen = cell(&mut world, 2, 0, FogKind::Object);
        let far_a = cell(&mut world, 12, 0, FogKind::Object);
        let air = cell(&mut world, 13, 0, FogKind::Air);
        let far_b = cell(&mut world, 14, 0, FogKind::Terrain);
        for e in [seen, far_a, air, far_b] {
            world.insert(e, Structure(7));
        }

        let transitions = VisibilityEngine::new().update(&mut world);
        assert_eq!(transitions, 4);
        assert_eq!(vis(&world, seen), Some(Visibility::Visible));
        assert_eq!(vis(&world, far_a), Some(Visibility::Fog));
        assert_eq!(vis(&world, far_b), Some(Visibility::Fog));
        assert!(!world.is_alive(air));
    }

    #[test]
    fn viewer_sees_its_whole_structure() {
        let mut world = world(30, 30);
        world.spawn((
            Position(IVec2::new(0, 0)),
            Viewer { light: 1.0 },
            Structure(3),
        ));
        let room = cell(&mut world, 8, 8, FogKind::Terrain);
        world.insert(room, Structure(3));
        VisibilityEngine::new().update(&mut world);
        assert_eq!(vis(&world, room), Some(Visibility::Visible));
    }

    #[test]
    fn revealed_air_is_disposed() {
        let mut world = world(20, 20);
        world.spawn((Position(IVec2::new(5, 5)), Viewer { light: 2.0 }));
        let air = cell(&mut world, 6, 5, FogKind::Air);
        let dark_air = cell(&mut world, 15, 5, FogKind::Air);
        VisibilityEngine::new().update(&mut world);
        assert!(!world.is_alive(air));
        assert!(world.is_alive(dark_air));
    }

    #[test]
    fn fixed_entities_never_change() {
        let mut world = world(20, 20);
        world.spawn((Position(IVec2::new(5, 5)), Viewer { light: 3.0 }));
        let pinned = world.spawn((
            Position(IVec2::new(6, 5)),
            FogState::fixed(FogKind::Object, Visibility::Hidden),
        ));
        VisibilityEngine::new().update(&mut world);
        assert_eq!(vis(&world, pinned), Some(Visibility::Hidden));
    }

    #[test]
    fn dim_viewer_sees_nothing() {
        let mut world = world(20, 20);
        let viewer = world.spawn((
            Position(IVec2::new(5, 5)),
            Viewer { light: 3.0 },
            Structure(1),
        ));
        let here = cell(&mut world, 5, 5, FogKind::Terrain);
        let room = cell(&mut world, 12, 12, FogKind::Terrain);
        world.insert(room, Structure(1));
        let mut engine = VisibilityEngine::new();
        engine.update(&mut world);
        assert_eq!(vis(&world, here), Some(Visibility::Visible));
        assert_eq!(vis(&world, room), Some(Visibility::Visible));

        world.get_mut::<Viewer>(viewer).unwrap().light = 0.5;
        world.touch(viewer);
        engine.update(&mut world);
        assert_eq!(vis(&world, here), Some(Visibility::Fog));
        assert_eq!(vis(&world, room), Some(Visibility::Fog));
    }

    #[test]
    fn leaving_the_structure_fogs_its_far_fragments() {
        let mut world = world(40, 40);
        let viewer = world.spawn((
            Position(IVec2::new(5, 5)),
            Viewer { light: 2.0 },
            Structure(1),
        ));
        let room = cell(&mut world, 12, 5, FogKind::Terrain);
        world.insert(room, Structure(1));
        let mut engine = VisibilityEngine::new();
        engine.update(&mut world);
        assert_eq!(vis(&world, room), Some(Visibility::Visible));

        world.remove::<Structure>(viewer);
        world.get_mut::<Position>(viewer).unwrap().0 = IVec2::new(25, 25);
        world.touch(viewer);
        engine.update(&mut world);
        assert_eq!(vis(&world, room), Some(Visibility::Fog));

        world.touch(viewer);
        assert_eq!(engine.update(&mut world), 0);
        assert_eq!(vis(&world, room), Some(Visibility::Fog));
    }

    #[test]
    fn degenerate_optics_still_trace() {
        let mut world = world(20, 20);
        world.insert_resource(Optics {
            aspect: 0.0,
            bias: f32::NAN,
        });
        world.spawn((Position(IVec2::new(5, 5)), Viewer { light: 2.0 }));
        let near = cell(&mut world, 6, 5, FogKind::Terrain);
        VisibilityEngine::new().update(&mut world);
        assert_eq!(vis(&world, near), Some(Visibility::Visible));
    }

    #[test]
    fn index_follows_spawns_and_disposals() {
        let mut world = world(20, 20);
        let mut engine = VisibilityEngine::new();
        engine.update(&mut world);
        let a = cell(&mut world, 1, 1, FogKind::Terrain);
        let b = cell(&mut world, 1, 1, FogKind::Unit);
        engine.update(&mut world);
        assert_eq!(engine.entities_at(IVec2::new(1, 1)), &[a, b]);
        world.despawn(a);
        engine.update(&mut world);
        assert_eq!(engine.entities_at(IVec2::new(1, 1)), &[b]);
    }
}
