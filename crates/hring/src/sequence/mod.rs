//! # Sequences — Timed Effects Attached to Entities
//!
//! A sequence is a resumable state machine advanced once per tick until its
//! effect reports completion: a glide between cells, a floating damage number,
//! a projectile in flight, a fade-out, an idle flicker. Each entity runs at most
//! one sequence per [`SequenceKind`].
//!
//! ```text
//! SequenceRegistry (resource)
//!   entity ──► kind ──► SequenceState { effect, frame, elapsed, particles }
//!                                              │
//!                            frame entity: Frame::manual + FrameOwners + Renderable
//! ```
//!
//! ## Frames
//!
//! Every sequence holds a frame entity used as a private elapsed-time and
//! generation source. Chained effects may share one frame
//! ([`start_on_frame`]); [`FrameOwners`] counts the sequences referencing it
//! and the frame is disposed, deferred to the end of the tick, when the last
//! one finishes. Deferral lets the visibility stage still read the frame's
//! final generation.
//!
//! When a sequence finishes, the generation its frame accumulated since the
//! sequence started is folded into the owning entity, so an observer watching
//! only the entity never misses the last visual update.
//!
//! ## Particles
//!
//! Auxiliary entities an effect creates (a caption, a projectile anchor) are
//! recorded in the state's [`Particles`]. Each is disposed exactly once: by
//! the effect itself through [`Particles::dispose`], or by the engine when the
//! sequence finishes or its owner is disposed.
//!
//! ## Advancing
//!
//! [`advance_sequences`] takes the registry out of the world for the duration
//! of the pass. Sequences started by effects during the pass land in a fresh
//! registry and are merged back afterwards, so they first run on the next tick.

mod effects;

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::ecs::{Entity, SpawnBundle, World};
use crate::error::SimError;
use crate::frame::Frame;
use crate::generation::{Notify, Renderable};
use crate::time::Time;

pub use effects::{Caption, Effect, Tint};

/// One sequence slot per kind per entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum SequenceKind {
    /// Movement easing between cells.
    Motion,
    /// Sprite-level animation such as death fades.
    Animation,
    /// Floating text above the entity.
    Popup,
    /// Projectiles the entity fired.
    Projectile,
    /// Effects that run for as long as the entity lives.
    Ambient,
}

/// What an effect reports after one advance.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Step {
    pub finished: bool,
    pub updated: bool,
}

impl Step {
    pub const IDLE: Step = Step {
        finished: false,
        updated: false,
    };
    pub const UPDATED: Step = Step {
        finished: false,
        updated: true,
    };
    pub const DONE: Step = Step {
        finished: true,
        updated: true,
    };
}

/// Reference count on a shared sequence frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameOwners(pub u32);

/// Named auxiliary entities owned by one sequence.
#[derive(Debug, Clone, Default)]
pub struct Particles {
    entries: BTreeMap<&'static str, Entity>,
}

impl Particles {
    pub fn get(&self, name: &str) -> Option<Entity> {
        self.entries.get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, Entity)> + '_ {
        self.entries.iter().map(|(&name, &e)| (name, e))
    }

    /// Spawn a particle under `name`. A particle already registered under the
    /// same name is disposed first.
    pub fn spawn<B: SpawnBundle>(
        &mut self,
        world: &mut World,
        name: &'static str,
        bundle: B,
    ) -> Entity {
        if self.entries.contains_key(name) {
            log::warn!("particle `{name}` spawned twice; disposing the previous one");
            self.dispose(world, name);
        }
        let entity = world.spawn(bundle);
        self.entries.insert(name, entity);
        entity
    }

    /// Dispose a particle and forget it. Returns `false` if no particle was
    /// registered under `name`.
    pub fn dispose(&mut self, world: &mut World, name: &str) -> bool {
        match self.entries.remove(name) {
            Some(entity) => {
                if !world.despawn(entity) {
                    log::warn!("particle `{name}` ({entity}) was disposed outside its sequence");
                }
                true
            }
            None => false,
        }
    }

    fn dispose_all(&mut self, world: &mut World) -> usize {
        let names: Vec<&'static str> = self.entries.keys().copied().collect();
        names.into_iter().filter(|name| self.dispose(world, name)).count()
    }
}

/// The live state of one running sequence.
#[derive(Debug, Clone)]
pub struct SequenceState {
    pub effect: Effect,
    pub frame: Entity,
    /// Simulated time since the sequence started. Never reset.
    pub elapsed: f32,
    pub particles: Particles,
    frame_generation_at_start: u64,
}

/// Every running sequence, keyed by owner then kind.
#[derive(Debug, Default)]
pub struct SequenceRegistry {
    states: BTreeMap<Entity, BTreeMap<SequenceKind, SequenceState>>,
    /// Slots held by the pass in progress, while the registry is taken out.
    in_flight: BTreeSet<(Entity, SequenceKind)>,
}

impl SequenceRegistry {
    pub fn get(&self, entity: Entity, kind: SequenceKind) -> Option<&SequenceState> {
        self.states.get(&entity)?.get(&kind)
    }

    pub fn is_active(&self, entity: Entity, kind: SequenceKind) -> bool {
        self.in_flight.contains(&(entity, kind)) || self.get(entity, kind).is_some()
    }

    /// Total number of running sequences.
    pub fn len(&self) -> usize {
        self.states.values().map(BTreeMap::len).sum::<usize>() + self.in_flight.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn install(&mut self, entity: Entity, kind: SequenceKind, state: SequenceState) {
        self.states.entry(entity).or_default().insert(kind, state);
    }
}

/// Start a sequence with a fresh frame. Returns the frame entity.
pub fn start(
    world: &mut World,
    entity: Entity,
    kind: SequenceKind,
    effect: Effect,
) -> Result<Entity, SimError> {
    check_slot(world, entity, kind)?;
    let frame = world.spawn((Frame::manual(), FrameOwners(1), Renderable::default()));
    install(world, entity, kind, effect, frame, 0);
    Ok(frame)
}

/// Start a sequence chained onto an existing sequence frame, sharing its
/// lifetime.
pub fn start_on_frame(
    world: &mut World,
    entity: Entity,
    kind: SequenceKind,
    effect: Effect,
    frame: Entity,
) -> Result<Entity, SimError> {
    check_slot(world, entity, kind)?;
    match world.get_mut::<FrameOwners>(frame) {
        Some(owners) if owners.0 > 0 => owners.0 += 1,
        _ => return Err(SimError::NotASequenceFrame { frame }),
    }
    let generation = world.generation_of(frame);
    install(world, entity, kind, effect, frame, generation);
    Ok(frame)
}

fn check_slot(world: &mut World, entity: Entity, kind: SequenceKind) -> Result<(), SimError> {
    if !world.is_alive(entity) {
        return Err(SimError::NotFound {
            id: entity.to_bits(),
        });
    }
    let registry = registry_mut(world);
    if registry.is_active(entity, kind) {
        return Err(SimError::SequenceActive { entity, kind });
    }
    Ok(())
}

fn install(
    world: &mut World,
    entity: Entity,
    kind: SequenceKind,
    effect: Effect,
    frame: Entity,
    frame_generation_at_start: u64,
) {
    log::debug!("sequence {kind:?} started on {entity} (frame {frame})");
    registry_mut(world).install(
        entity,
        kind,
        SequenceState {
            effect,
            frame,
            elapsed: 0.0,
            particles: Particles::default(),
            frame_generation_at_start,
        },
    );
}

fn registry_mut(world: &mut World) -> &mut SequenceRegistry {
    if !world.has_resource::<SequenceRegistry>() {
        world.insert_resource(SequenceRegistry::default());
    }
    world.resource_mut::<SequenceRegistry>()
}

/// The running sequence of `kind` on `entity`, if any. Sequences in the middle
/// of an advance pass are not visible here.
pub fn get(world: &World, entity: Entity, kind: SequenceKind) -> Option<&SequenceState> {
    world.get_resource::<SequenceRegistry>()?.get(entity, kind)
}

pub fn is_active(world: &World, entity: Entity, kind: SequenceKind) -> bool {
    world
        .get_resource::<SequenceRegistry>()
        .is_some_and(|r| r.is_active(entity, kind))
}

/// Effects stage: advance every running sequence by this tick's `dt`.
pub fn advance_sequences(world: &mut World) {
    let dt = world.get_resource::<Time>().map_or(0.0, Time::delta);
    let mut running = std::mem::take(&mut registry_mut(world).states);
    {
        let registry = registry_mut(world);
        for (&entity, kinds) in &running {
            for &kind in kinds.keys() {
                registry.in_flight.insert((entity, kind));
            }
        }
    }

    let owners: Vec<Entity> = running.keys().copied().collect();
    for entity in owners {
        let Some(mut kinds) = running.remove(&entity) else {
            continue;
        };
        let slots: Vec<SequenceKind> = kinds.keys().copied().collect();
        for kind in slots {
            let Some(mut state) = kinds.remove(&kind) else {
                continue;
            };
            registry_mut(world).in_flight.remove(&(entity, kind));

            if !world.is_alive(entity) {
                retire(world, entity, kind, state);
                continue;
            }
            if advance_one(world, entity, kind, &mut state, dt) {
                finish(world, entity, kind, state);
            } else {
                kinds.insert(kind, state);
            }
        }
        if !kinds.is_empty() {
            running.insert(entity, kinds);
        }
    }

    let started = std::mem::take(&mut registry_mut(world).states);
    for (entity, kinds) in started {
        let slot = running.entry(entity).or_default();
        for (kind, state) in kinds {
            if slot.contains_key(&kind) {
                log::error!(
                    "sequence {kind:?} on {entity} started twice in one tick; dropping the newer one"
                );
                retire(world, entity, kind, state);
            } else {
                slot.insert(kind, state);
            }
        }
    }
    let registry = registry_mut(world);
    registry.states = running;
    registry.in_flight.clear();
}

/// Run one sequence's effect. Returns whether it finished.
fn advance_one(
    world: &mut World,
    entity: Entity,
    kind: SequenceKind,
    state: &mut SequenceState,
    dt: f32,
) -> bool {
    assert!(
        world.is_alive(state.frame),
        "sequence {kind:?} on {entity} references disposed frame {}",
        state.frame
    );
    state.elapsed += dt;
    let step = effects::run(world, entity, state);
    if step.updated {
        world.touch(entity);
        world.touch(state.frame);
    }
    step.finished
}

/// Completion: dispose leftover particles, fold the frame's generation into
/// the owner and release the frame.
fn finish(world: &mut World, entity: Entity, kind: SequenceKind, mut state: SequenceState) {
    let leftover = state.particles.dispose_all(world);
    let folded = world
        .generation_of(state.frame)
        .saturating_sub(state.frame_generation_at_start);
    world.touch_by(entity, folded);
    release_frame(world, state.frame);
    log::debug!(
        "sequence {kind:?} on {entity} finished after {:.3} ({leftover} particles cleaned up)",
        state.elapsed
    );
}

/// The owner is gone: clean up without touching it.
fn retire(world: &mut World, entity: Entity, kind: SequenceKind, mut state: SequenceState) {
    state.particles.dispose_all(world);
    release_frame(world, state.frame);
    log::debug!("sequence {kind:?} retired with its owner {entity}");
}

fn release_frame(world: &mut World, frame: Entity) {
    let Some(owners) = world.get_mut::<FrameOwners>(frame) else {
        log::warn!("released frame {frame} is already gone");
        return;
    };
    owners.0 = owners.0.saturating_sub(1);
    if owners.0 == 0 {
        world.despawn_deferred(frame);
    }
}

#[cfg(test)]
mod tests {
    use glam::{IVec2, Vec2};

    use super::*;
    use crate::ease::Ease;
    use crate::grid::Placement;

    fn world_with_time(dt: f32) -> World {
        let mut world = World::new();
        let mut time = Time::new();
        time.advance(dt);
        world.insert_resource(time);
        world
    }

    fn tick(world: &mut World) {
        advance_sequences(world);
        world.flush_deferred();
    }

    fn fade(duration: f32) -> Effect {
        Effect::Fade { duration }
    }

    #[test]
    fn completion_removes_state_and_frame() {
        let mut world = world_with_time(0.5);
        let owner = world.spawn((Renderable::default(),));
        let frame = start(&mut world, owner, SequenceKind::Animation, fade(1.0)).unwrap();
        assert!(is_active(&world, owner, SequenceKind::Animation));

        tick(&mut world);
        assert!(world.is_alive(frame));
        assert_eq!(world.get::<Tint>(owner), Some(&Tint(0.5)));

        tick(&mut world);
        assert!(!is_active(&world, owner, SequenceKind::Animation));
        assert!(!world.is_alive(frame));
        assert!(world.resource::<SequenceRegistry>().is_empty());
    }

    #[test]
    fn frame_survives_until_end_of_tick() {
        let mut world = world_with_time(1.0);
        let owner = world.spawn_empty();
        let frame = start(&mut world, owner, SequenceKind::Animation, fade(1.0)).unwrap();
        advance_sequences(&mut world);
        assert!(world.is_alive(frame));
        assert!(world.is_despawn_pending(frame));
        assert_eq!(world.generation_of(frame), 1);
        world.flush_deferred();
        assert!(!world.is_alive(frame));
    }

    #[test]
    fn duplicate_start_is_rejected() {
        let mut world = world_with_time(0.1);
        let owner = world.spawn_empty();
        start(&mut world, owner, SequenceKind::Popup, fade(1.0)).unwrap();
        let again = start(&mut world, owner, SequenceKind::Popup, fade(1.0));
        assert!(matches!(again, Err(SimError::SequenceActive { .. })));
        assert!(start(&mut world, owner, SequenceKind::Animation, fade(1.0)).is_ok());
    }

    #[test]
    fn start_on_dead_entity_fails() {
        let mut world = world_with_time(0.1);
        let owner = world.spawn_empty();
        world.despawn(owner);
        let result = start(&mut world, owner, SequenceKind::Popup, fade(1.0));
        assert!(matches!(result, Err(SimError::NotFound { .. })));
    }

    #[test]
    fn particles_are_disposed_exactly_once() {
        let mut world = world_with_time(0.25);
        world.track::<Placement>();
        let owner = world.spawn((Placement(Vec2::ZERO),));
        world.added::<Placement>();

        start(
            &mut world,
            owner,
            SequenceKind::Popup,
            Effect::Popup {
                text: "12".into(),
                rise: 1.0,
                duration: 0.5,
            },
        )
        .unwrap();
        start(
            &mut world,
            owner,
            SequenceKind::Projectile,
            Effect::Volley {
                from: IVec2::ZERO,
                to: IVec2::new(3, 0),
                speed: 6.0,
            },
        )
        .unwrap();

        for _ in 0..4 {
            tick(&mut world);
        }
        let spawned = world.added::<Placement>();
        let disposed = world.removed::<Placement>();
        assert_eq!(spawned.len(), 2);
        assert_eq!(disposed, spawned);
        assert!(world.resource::<SequenceRegistry>().is_empty());
        assert!(world.entities_with::<Caption>().is_empty());
    }

    #[test]
    fn shared_frame_outlives_first_finisher() {
        let mut world = world_with_time(1.0);
        let owner = world.spawn_empty();
        let frame = start(&mut world, owner, SequenceKind::Animation, fade(1.0)).unwrap();
        start_on_frame(&mut world, owner, SequenceKind::Ambient, fade(3.0), frame).unwrap();
        assert_eq!(world.get::<FrameOwners>(frame), Some(&FrameOwners(2)));

        tick(&mut world);
        assert!(world.is_alive(frame));
        assert_eq!(world.get::<FrameOwners>(frame), Some(&FrameOwners(1)));
        tick(&mut world);
        assert!(world.is_alive(frame));
        tick(&mut world);
        assert!(!world.is_alive(frame));
    }

    #[test]
    fn chaining_onto_a_plain_entity_fails() {
        let mut world = world_with_time(1.0);
        let owner = world.spawn_empty();
        let not_a_frame = world.spawn((Frame::new(1.0),));
        let result =
            start_on_frame(&mut world, owner, SequenceKind::Motion, fade(1.0), not_a_frame);
        assert!(matches!(result, Err(SimError::NotASequenceFrame { .. })));
        assert!(!is_active(&world, owner, SequenceKind::Motion));
    }

    #[test]
    fn owner_disposal_retires_sequences() {
        let mut world = world_with_time(0.1);
        let owner = world.spawn((Placement(Vec2::ZERO),));
        let frame = start(
            &mut world,
            owner,
            SequenceKind::Popup,
            Effect::Popup {
                text: "hi".into(),
                rise: 1.0,
                duration: 10.0,
            },
        )
        .unwrap();
        tick(&mut world);
        assert_eq!(world.entities_with::<Caption>().len(), 1);

        world.despawn(owner);
        tick(&mut world);
        assert!(world.entities_with::<Caption>().is_empty());
        assert!(!world.is_alive(frame));
        assert!(world.resource::<SequenceRegistry>().is_empty());
    }

    #[test]
    fn ambient_effects_never_finish() {
        let mut world = world_with_time(0.3);
        let owner = world.spawn_empty();
        start(
            &mut world,
            owner,
            SequenceKind::Ambient,
            Effect::Flicker {
                period: 1.0,
                low: 0.4,
                high: 1.0,
            },
        )
        .unwrap();
        for _ in 0..50 {
            tick(&mut world);
        }
        let state = get(&world, owner, SequenceKind::Ambient).unwrap();
        assert!((state.elapsed - 15.0).abs() < 1e-3);
        let tint = world.get::<Tint>(owner).unwrap().0;
        assert!((0.4..=1.0).contains(&tint));
    }

    #[test]
    fn finish_folds_frame_generation_into_owner() {
        let mut world = world_with_time(0.5);
        let owner = world.spawn((Renderable::default(),));
        start(
            &mut world,
            owner,
            SequenceKind::Motion,
            Effect::Glide {
                from: IVec2::ZERO,
                to: IVec2::new(1, 0),
                duration: 1.0,
                ease: Ease::Linear,
            },
        )
        .unwrap();
        tick(&mut world);
        assert_eq!(world.generation_of(owner), 1);
        tick(&mut world);
        // Two updates plus the two frame bumps folded in on completion.
        assert_eq!(world.generation_of(owner), 4);
        assert_eq!(world.get::<Placement>(owner), Some(&Placement(Vec2::new(1.0, 0.0))));
    }

    #[test]
    #[should_panic(expected = "disposed frame")]
    fn disposed_frame_is_fatal() {
        let mut world = world_with_time(0.1);
        let owner = world.spawn_empty();
        let frame = start(&mut world, owner, SequenceKind::Animation, fade(1.0)).unwrap();
        world.despawn(frame);
        advance_sequences(&mut world);
    }
}
