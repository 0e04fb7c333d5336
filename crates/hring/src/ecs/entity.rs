//! # Entity — Generational Handles
//!
//! An [`Entity`] is a slot index paired with a generation counter. The
//! [`World`](super::world::World) maps entities to their components; the handle
//! itself carries no data.
//!
//! Slots are recycled when entities are disposed. Recycling bumps the slot's
//! generation, so a handle kept by a sequence or a quest target after its
//! entity died no longer resolves:
//!
//! ```text
//! Entity { index: 5, generation: 0 }  ← original
//! Entity { index: 5, generation: 1 }  ← after recycle
//! ```
//!
//! ## Stable ids
//!
//! Gameplay code that stores references outside the world (quest targets,
//! collision candidates, diagnostics) uses [`Entity::to_bits`], a `u64` with the
//! generation in the high half. [`World::by_id`](super::world::World::by_id)
//! resolves it back, failing with `NotFound` once the entity is gone.
//!
//! Handles are totally ordered (index first, then generation) so that every
//! per-tick iteration in the engine is deterministic.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A lightweight handle to an entity in the [`World`](super::world::World).
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Entity {
    /// Slot index in the allocator. Recycled when the entity is disposed.
    pub(crate) index: u32,
    /// Incremented each time this slot is reused.
    pub(crate) generation: u32,
}

impl Entity {
    /// Returns the raw slot index.
    pub fn index(self) -> u32 {
        self.index
    }

    /// Returns the generation.
    pub fn generation(self) -> u32 {
        self.generation
    }

    /// Stable integer id of this handle.
    pub fn to_bits(self) -> u64 {
        (u64::from(self.generation) << 32) | u64::from(self.index)
    }

    /// Rebuild a handle from [`to_bits`](Entity::to_bits). The result may be
    /// stale; check it with [`World::is_alive`](super::world::World::is_alive).
    pub fn from_bits(bits: u64) -> Self {
        Self {
            index: bits as u32,
            generation: (bits >> 32) as u32,
        }
    }
}

impl fmt::Debug for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Entity({}v{})", self.index, self.generation)
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}v{}", self.index, self.generation)
    }
}

/// Allocates and recycles entity slots.
///
/// ```text
/// generations: [0, 1, 0, 2, 0]   ← one generation per slot ever allocated
/// free_list:   [1, 3]             ← slots available for reuse
/// ```
pub(crate) struct EntityAllocator {
    generations: Vec<u32>,
    free_list: Vec<u32>,
}

impl EntityAllocator {
    pub fn new() -> Self {
        Self {
            generations: Vec::new(),
            free_list: Vec::new(),
        }
    }

    /// Allocate a handle, reusing a freed slot when one is available.
    pub fn allocate(&mut self) -> Entity {
        if let Some(index) = self.free_list.pop() {
            let generation = self.generations[index as usize];
            Entity { index, generation }
        } else {
            let index = self.generations.len() as u32;
            self.generations.push(0);
            Entity {
                index,
                generation: 0,
            }
        }
    }

    /// Free a slot. Returns `false` if the handle was already stale, so a
    /// second disposal of the same handle is detectable by the caller.
    pub fn deallocate(&mut self, entity: Entity) -> bool {
        if !self.is_alive(entity) {
            return false;
        }
        self.generations[entity.index as usize] += 1;
        self.free_list.push(entity.index);
        true
    }

    pub fn is_alive(&self, entity: Entity) -> bool {
        self.generations
            .get(entity.index as usize)
            .is_some_and(|&g| g == entity.generation)
    }

    pub fn alive_count(&self) -> usize {
        self.generations.len() - self.free_list.len()
    }
}
