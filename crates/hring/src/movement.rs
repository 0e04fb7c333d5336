//! Grid movement driven by reference frames.
//!
//! A [`Motion`] holds queued step directions and the frame that paces them.
//! Each time the frame is ready, [`walk`] pops one direction and moves the
//! entity one cell on the torus, easing its [`Placement`] with a glide
//! sequence. Gated movers (player input) suspend their frame when nothing is
//! queued; [`steer`] wakes it again, so the first step after idling happens on
//! the next tick instead of waiting out a period.

use std::collections::VecDeque;

use glam::IVec2;

use crate::ease::Ease;
use crate::ecs::{Entity, World};
use crate::frame::Frame;
use crate::generation::Notify;
use crate::grid::{Placement, Position, Torus};
use crate::sequence::{self, Effect, SequenceKind};

/// Occupies its cell: nothing can step onto it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Solid;

#[derive(Debug, Clone, PartialEq)]
pub struct Motion {
    pub queue: VecDeque<IVec2>,
    /// Entity carrying the pacing [`Frame`]; often the mover itself.
    pub frame: Entity,
    /// Suspend the frame whenever the queue runs dry.
    pub gated: bool,
    /// Duration of the visual glide between cells.
    pub glide: f32,
}

impl Motion {
    pub fn new(frame: Entity, glide: f32) -> Self {
        Self {
            queue: VecDeque::new(),
            frame,
            gated: false,
            glide,
        }
    }

    pub fn gated(mut self) -> Self {
        self.gated = true;
        self
    }
}

/// Queue a step. Wakes the frame of a gated mover. Returns `false` if the
/// entity cannot move.
pub fn steer(world: &mut World, entity: Entity, dir: IVec2) -> bool {
    let Some(motion) = world.get_mut::<Motion>(entity) else {
        return false;
    };
    motion.queue.push_back(dir);
    let (frame, gated) = (motion.frame, motion.gated);
    if gated {
        if let Some(frame) = world.get_mut::<Frame>(frame) {
            frame.resume();
        }
    }
    true
}

/// Move one cell right now, outside the frame's cadence (knockback). The
/// frame restarts its period. Returns whether the entity moved.
pub fn push(world: &mut World, entity: Entity, dir: IVec2) -> bool {
    let Some(frame) = world.get::<Motion>(entity).map(|m| m.frame) else {
        return false;
    };
    if let Some(frame) = world.get_mut::<Frame>(frame) {
        frame.force();
    }
    step(world, entity, dir)
}

/// Gameplay stage system: take one queued step for every mover whose frame is
/// ready.
pub fn walk(world: &mut World) {
    for entity in world.entities_with::<Motion>() {
        let Some(motion) = world.get::<Motion>(entity) else {
            continue;
        };
        let frame = motion.frame;
        let gated = motion.gated;
        let Some(ready) = world.get::<Frame>(frame).map(Frame::is_ready) else {
            log::warn!("mover {entity} has no frame at {frame}");
            continue;
        };

        let next = if ready {
            world
                .get_mut::<Motion>(entity)
                .and_then(|m| m.queue.pop_front())
        } else {
            None
        };
        match next {
            Some(dir) => {
                step(world, entity, dir);
            }
            None if gated && idle(world, entity) => {
                if let Some(frame) = world.get_mut::<Frame>(frame) {
                    frame.suspend();
                }
            }
            None => {}
        }
    }
}

fn idle(world: &World, entity: Entity) -> bool {
    world
        .get::<Motion>(entity)
        .is_none_or(|m| m.queue.is_empty())
}

fn step(world: &mut World, entity: Entity, dir: IVec2) -> bool {
    let torus = world.get_resource::<Torus>().copied().unwrap_or_default();
    let Some(from) = world.get::<Position>(entity).map(|p| p.0) else {
        return false;
    };
    let to = torus.offset(from, dir);
    if is_blocked(world, entity, to, torus) {
        log::trace!("{entity} bumped into {to}");
        return false;
    }

    if let Some(p) = world.get_mut::<Position>(entity) {
        p.0 = to;
    }
    let glide = world.get::<Motion>(entity).map_or(0.0, |m| m.glide);
    if glide > 0.0 && !sequence::is_active(world, entity, SequenceKind::Motion) {
        let effect = Effect::Glide {
            from,
            to,
            duration: glide,
            ease: Ease::QuadOut,
        };
        if let Err(e) = sequence::start(world, entity, SequenceKind::Motion, effect) {
            log::error!("glide for {entity}: {e}");
        }
    } else {
        world.insert(entity, Placement(to.as_vec2()));
    }
    world.touch(entity);
    true
}

fn is_blocked(world: &mut World, mover: Entity, cell: IVec2, torus: Torus) -> bool {
    let mut blocked = false;
    world.query_filtered::<(&Position,), Solid>(|e, (p,)| {
        if e != mover && torus.wrap(p.0) == cell {
            blocked = true;
        }
    });
    blocked
}
