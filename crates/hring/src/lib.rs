//! # Hring — Tick-Driven Grid Simulation Core
//!
//! The engine behind a turn-paced roguelike on a wrapping grid: reference
//! frames that pace entities, sequences that animate them, and a fog of war
//! recomputed by recursive shadowcasting whenever something observable
//! changed.
//!
//! Start with `use hring::prelude::*` and drive a
//! [`Simulation`](sim::Simulation) with [`advance`](sim::Simulation::advance).

pub mod config;
pub mod ease;
pub mod ecs;
pub mod error;
pub mod frame;
pub mod generation;
pub mod grid;
pub mod movement;
pub mod prelude;
pub mod sequence;
pub mod sim;
pub mod time;
pub mod visibility;

#[cfg(feature = "diagnostics")]
pub mod diag;
