//! Simulated time.
//!
//! The [`Time`] resource holds the `dt` of the tick in progress. It is advanced
//! by [`Simulation::advance`](crate::sim::Simulation::advance) with whatever
//! the host passes in; nothing in the core reads a wall clock, so replaying
//! the same `dt` sequence replays the same simulation.

use serde::Serialize;

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct Time {
    delta: f32,
    elapsed: f64,
    tick: u64,
}

impl Time {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a new tick. Negative or NaN `dt` counts as zero so that no clock
    /// can ever run backwards.
    pub(crate) fn advance(&mut self, dt: f32) {
        self.delta = if dt.is_finite() && dt > 0.0 { dt } else { 0.0 };
        self.elapsed += f64::from(self.delta);
        self.tick += 1;
    }

    /// Simulated time covered by the current tick.
    pub fn delta(&self) -> f32 {
        self.delta
    }

    /// Total simulated time since the simulation started.
    pub fn elapsed(&self) -> f64 {
        self.elapsed
    }

    /// Number of ticks run so far.
    pub fn tick(&self) -> u64 {
        self.tick
    }
}
