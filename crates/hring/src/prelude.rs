//! Convenience re-exports: `use hring::prelude::*` for the common items.

// Core
pub use crate::config::SimConfig;
pub use crate::ease::Ease;
pub use crate::ecs::{Entity, Schedule, System, World};
pub use crate::error::SimError;
pub use crate::sim::{Plugin, Simulation, Stage};
pub use crate::time::Time;

// Grid
pub use crate::grid::{DOWN, LEFT, Placement, Position, RIGHT, Torus, UP};

// Frames and sequences
pub use crate::frame::Frame;
pub use crate::generation::{Notify, Renderable, Revision, Watermark};
pub use crate::movement::{Motion, Solid};
pub use crate::sequence::{Caption, Effect, Particles, SequenceKind, Step, Tint};

// Visibility
pub use crate::visibility::{FogKind, FogState, Opaque, Optics, Structure, Viewer, Visibility};

// Diagnostics (feature-gated)
#[cfg(feature = "diagnostics")]
pub use crate::diag::SimStats;
