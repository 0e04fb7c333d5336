//! Error type shared by the entity store, the sequence engine and config
//! loading.
//!
//! Precondition violations come back as `Err` so the caller decides whether a
//! bug is fatal; the engine's own callers log them and keep the tick going.
//! Invariant violations are not represented here: they panic.

use std::fmt;

use crate::ecs::Entity;
use crate::sequence::SequenceKind;

#[derive(Debug)]
pub enum SimError {
    /// `World::by_id` found no live entity for the id.
    NotFound { id: u64 },
    /// A sequence of this kind is already running on the entity.
    SequenceActive { entity: Entity, kind: SequenceKind },
    /// The frame passed to a chained start is not a live sequence frame.
    NotASequenceFrame { frame: Entity },
    /// Invalid configuration value or unparsable config document.
    Config(String),
    Io(std::io::Error),
}

impl fmt::Display for SimError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SimError::NotFound { id } => write!(f, "no live entity with id {id:#x}"),
            SimError::SequenceActive { entity, kind } => {
                write!(f, "sequence {kind:?} already active on {entity}")
            }
            SimError::NotASequenceFrame { frame } => {
                write!(f, "{frame} is not a live sequence frame")
            }
            SimError::Config(e) => write!(f, "invalid config: {e}"),
            SimError::Io(e) => write!(f, "io error: {e}"),
        }
    }
}

impl std::error::Error for SimError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SimError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for SimError {
    fn from(e: std::io::Error) -> Self {
        SimError::Io(e)
    }
}

impl From<serde_json::Error> for SimError {
    fn from(e: serde_json::Error) -> Self {
        SimError::Config(e.to_string())
    }
}
