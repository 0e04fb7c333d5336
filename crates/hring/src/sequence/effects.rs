//! The closed set of effects a sequence can run.
//!
//! Each variant carries its own payload and is advanced by a plain function
//! matched in [`run`]. Effects read `state.elapsed` for their progress and keep
//! any entities they create in `state.particles`.

use glam::{IVec2, Vec2};
use serde::{Deserialize, Serialize};

use super::{SequenceState, Step};
use crate::ease::{Ease, progress};
use crate::ecs::{Entity, World};
use crate::grid::{Placement, Position, Torus};

/// Opacity in \[0, 1\], written by fades and flickers.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Tint(pub f32);

/// Text of a floating caption particle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Caption(pub String);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Effect {
    /// Ease the owner's [`Placement`] from one cell to another, crossing the
    /// world seam when that is shorter.
    Glide {
        from: IVec2,
        to: IVec2,
        duration: f32,
        ease: Ease,
    },
    /// A caption that rises above the owner and disappears.
    Popup {
        text: String,
        rise: f32,
        duration: f32,
    },
    /// A projectile anchor flying from `from` to `to` at `speed` cells per
    /// unit of time.
    Volley { from: IVec2, to: IVec2, speed: f32 },
    /// Drive the owner's [`Tint`] from 1 to 0.
    Fade { duration: f32 },
    /// Oscillate the owner's [`Tint`] between `low` and `high`. Never ends.
    Flicker { period: f32, low: f32, high: f32 },
}

impl Effect {
    pub fn name(&self) -> &'static str {
        match self {
            Effect::Glide { .. } => "glide",
            Effect::Popup { .. } => "popup",
            Effect::Volley { .. } => "volley",
            Effect::Fade { .. } => "fade",
            Effect::Flicker { .. } => "flicker",
        }
    }
}

const CAPTION: &str = "caption";
const ANCHOR: &str = "anchor";

pub(super) fn run(world: &mut World, entity: Entity, state: &mut SequenceState) -> Step {
    let elapsed = state.elapsed;
    match &state.effect {
        Effect::Glide {
            from,
            to,
            duration,
            ease,
        } => glide(world, entity, *from, *to, ease.sample(progress(elapsed, *duration))),
        Effect::Popup {
            text,
            rise,
            duration,
        } => {
            let text = text.clone();
            let (rise, duration) = (*rise, *duration);
            popup(world, entity, state, text, rise, duration)
        }
        Effect::Volley { from, to, speed } => {
            let (from, to, speed) = (*from, *to, *speed);
            volley(world, state, from, to, speed)
        }
        Effect::Fade { duration } => {
            let t = progress(elapsed, *duration);
            world.insert(entity, Tint(1.0 - t));
            if t >= 1.0 { Step::DONE } else { Step::UPDATED }
        }
        Effect::Flicker { period, low, high } => {
            let level = if *period > 0.0 {
                let phase = (elapsed / period * std::f32::consts::TAU).sin() * 0.5 + 0.5;
                low + (high - low) * phase
            } else {
                *high
            };
            world.insert(entity, Tint(level));
            Step::UPDATED
        }
    }
}

fn torus(world: &World) -> Torus {
    world.get_resource::<Torus>().copied().unwrap_or_default()
}

fn glide(world: &mut World, entity: Entity, from: IVec2, to: IVec2, eased: f32) -> Step {
    let torus = torus(world);
    if eased >= 1.0 {
        world.insert(entity, Placement(torus.wrap(to).as_vec2()));
        return Step::DONE;
    }
    let start = from.as_vec2();
    let end = torus.unwrap_near(start, to);
    world.insert(entity, Placement(start.lerp(end, eased)));
    Step::UPDATED
}

fn popup(
    world: &mut World,
    entity: Entity,
    state: &mut SequenceState,
    text: String,
    rise: f32,
    duration: f32,
) -> Step {
    let t = progress(state.elapsed, duration);
    if t >= 1.0 {
        state.particles.dispose(world, CAPTION);
        return Step::DONE;
    }
    let base = anchor_of(world, entity);
    let caption = match state.particles.get(CAPTION) {
        Some(caption) => caption,
        None => state
            .particles
            .spawn(world, CAPTION, (Caption(text), Placement(base), Tint(1.0))),
    };
    // y grows downwards, so rising means decreasing y.
    let lifted = base - Vec2::Y * rise * Ease::QuadOut.sample(t);
    if let Some(placement) = world.get_mut::<Placement>(caption) {
        placement.0 = lifted;
    }
    if let Some(tint) = world.get_mut::<Tint>(caption) {
        tint.0 = 1.0 - t * t;
    }
    Step::UPDATED
}

fn volley(
    world: &mut World,
    state: &mut SequenceState,
    from: IVec2,
    to: IVec2,
    speed: f32,
) -> Step {
    let torus = torus(world);
    let duration = if speed > 0.0 {
        torus.distance(from, to) / speed
    } else {
        0.0
    };
    let t = progress(state.elapsed, duration);
    let start = from.as_vec2();
    let end = torus.unwrap_near(start, to);
    let at = start.lerp(end, t);
    match state.particles.get(ANCHOR) {
        Some(anchor) => {
            if let Some(placement) = world.get_mut::<Placement>(anchor) {
                placement.0 = at;
            }
        }
        None => {
            state.particles.spawn(world, ANCHOR, (Placement(at),));
        }
    }
    // The anchor stays until the engine cleans up after completion.
    if t >= 1.0 { Step::DONE } else { Step::UPDATED }
}

/// Where particles of `entity` appear: its continuous placement, else its
/// cell, else the origin.
fn anchor_of(world: &World, entity: Entity) -> Vec2 {
    world
        .get::<Placement>(entity)
        .map(|p| p.0)
        .or_else(|| world.get::<Position>(entity).map(|p| p.0.as_vec2()))
        .unwrap_or(Vec2::ZERO)
}
