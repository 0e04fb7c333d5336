//! # Reference Frames — Per-Entity Logical Clocks
//!
//! A [`Frame`] decides when timed behavior may happen. It accumulates simulated
//! time into `delta` and "fires" once `delta` reaches `tick`. Firing subtracts
//! exactly one `tick`, so the residual carries into the next period and a
//! cadence never drifts under a variable host frame rate.
//!
//! ```text
//!             age (Clock stage)              settle (Settle stage)
//! delta ──► delta + min(dt, tick) ──► ready? ──► delta - tick, fires_left - 1
//!                                       │
//!                              gameplay consumes readiness
//! ```
//!
//! Aging adds at most one `tick` per host tick and never pushes a frame that
//! is already processable past `tick`; settling removes exactly one. So after
//! settle `delta < tick` holds for every running frame, including one that
//! was just resumed.
//!
//! A frame can halt itself after a fixed number of fires
//! ([`Frame::with_fires`]) or be halted from outside ([`Frame::suspend`]).
//! A suspended frame keeps aging up to `tick` and then holds there, so that
//! [`Frame::resume`] makes it fire on the very next tick.
//!
//! A frame with `tick <= 0` never fires. It is a manual clock: sequence frames
//! use one purely as an elapsed-time and generation source.

use serde::{Deserialize, Serialize};

use crate::ecs::World;
use crate::time::Time;

/// Logical clock component.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    tick: f32,
    delta: f32,
    suspended: bool,
    /// Fires left before the frame halts. `None` never halts.
    fires_left: Option<u32>,
}

impl Frame {
    /// A free-running clock firing every `tick` units of simulated time.
    pub fn new(tick: f32) -> Self {
        Self {
            tick,
            delta: 0.0,
            suspended: false,
            fires_left: None,
        }
    }

    /// A clock that never fires.
    pub fn manual() -> Self {
        Self::new(-1.0)
    }

    /// A clock that suspends itself after exactly `fires` fires.
    pub fn with_fires(tick: f32, fires: u32) -> Self {
        Self {
            fires_left: Some(fires),
            ..Self::new(tick)
        }
    }

    /// Start the clock suspended. Used for gated, input-driven movement.
    pub fn suspended(mut self) -> Self {
        self.suspended = true;
        self
    }

    pub fn tick(&self) -> f32 {
        self.tick
    }

    pub fn delta(&self) -> f32 {
        self.delta
    }

    pub fn is_suspended(&self) -> bool {
        self.suspended
    }

    pub fn fires_left(&self) -> Option<u32> {
        self.fires_left
    }

    pub fn is_manual(&self) -> bool {
        self.tick <= 0.0
    }

    /// Eligible to fire this tick.
    pub fn is_processable(&self) -> bool {
        self.tick > 0.0 && self.delta >= self.tick
    }

    /// Processable and running: gameplay may act on it now.
    pub fn is_ready(&self) -> bool {
        self.is_processable() && !self.suspended
    }

    pub fn suspend(&mut self) {
        self.suspended = true;
    }

    pub fn resume(&mut self) {
        self.suspended = false;
    }

    /// Wake the clock for an immediate, out-of-cadence action (a push or a
    /// knockback). The next regular fire is a full `tick` away.
    pub fn force(&mut self) {
        self.suspended = false;
        self.delta = 0.0;
    }

    /// Accumulate one host tick of `dt`. Negative `dt` counts as zero.
    pub fn age(&mut self, dt: f32) {
        let dt = dt.max(0.0);
        if self.fires_left == Some(0) {
            self.suspended = true;
            self.fires_left = None;
        }
        if self.is_manual() {
            self.delta += dt;
            return;
        }
        // Already eligible: hold at one tick, whether or not it runs now.
        if self.is_processable() {
            self.delta = self.tick;
            return;
        }
        self.delta += dt.min(self.tick);
        if self.suspended {
            self.delta = self.delta.min(self.tick);
        }
    }

    /// Consume one fire if the frame is ready. Returns whether it fired.
    pub fn settle(&mut self) -> bool {
        if !self.is_ready() {
            return false;
        }
        self.delta -= self.tick;
        if let Some(n) = self.fires_left.as_mut() {
            *n = n.saturating_sub(1);
        }
        true
    }
}

impl Default for Frame {
    fn default() -> Self {
        Self::manual()
    }
}

/// How many frames fired during the last settle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameTally {
    pub fired: u32,
}

/// Clock stage: age every frame by this tick's `dt`.
pub fn age_frames(world: &mut World) {
    let dt = world.get_resource::<Time>().map_or(0.0, Time::delta);
    world.query::<(&mut Frame,)>(|_, (frame,)| frame.age(dt));
}

/// Settle stage: every frame still ready after gameplay and effects consumes
/// one fire.
pub fn settle_frames(world: &mut World) {
    let mut fired = 0u32;
    world.query::<(&mut Frame,)>(|entity, (frame,)| {
        if frame.settle() {
            fired += 1;
            if frame.fires_left() == Some(0) {
                log::trace!("frame {entity} spent its last fire");
            }
        }
    });
    world.insert_resource(FrameTally { fired });
}
