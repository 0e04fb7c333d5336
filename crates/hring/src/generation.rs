//! # Generations — Change Detection Across Systems
//!
//! Every entity whose visible state can change carries a [`Renderable`]
//! generation. Bumping any generation also bumps the world-wide [`Revision`],
//! a single monotonic counter. A subsystem keeps a [`Watermark`] with the last
//! revision it acted on and skips its work entirely while the revision is
//! unchanged.
//!
//! ```text
//! movement ──touch(player)──► Renderable(player) += 1
//!                             Revision += 1
//! visibility: watermark 41, revision 42 → recompute, watermark := 42
//! ```
//!
//! The contract is explicit: any system that mutates state another system's
//! query depends on must call [`Notify::touch`]. A missing touch means the
//! dependent system silently misses the update.

use serde::{Deserialize, Serialize};

use crate::ecs::{Entity, World};

/// The world-wide revision. Only ever increases.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Revision(u64);

impl Revision {
    pub fn get(self) -> u64 {
        self.0
    }
}

/// Per-entity generation, incremented whenever the entity's visible state
/// changes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Renderable {
    pub generation: u64,
}

/// The last revision a subsystem acted on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Watermark {
    seen: Option<u64>,
}

impl Watermark {
    pub fn new() -> Self {
        Self::default()
    }

    /// `true` if `revision` differs from the last observed value (always `true`
    /// the first time), recording it either way.
    pub fn observe(&mut self, revision: u64) -> bool {
        let changed = self.seen != Some(revision);
        self.seen = Some(revision);
        changed
    }

    /// Whether `revision` differs from the last observed value, without
    /// recording it.
    pub fn is_stale(&self, revision: u64) -> bool {
        self.seen != Some(revision)
    }

    /// Forget the last observed value so the next `observe` reports a change.
    pub fn invalidate(&mut self) {
        self.seen = None;
    }
}

/// Change notification. Implemented by [`World`].
pub trait Notify {
    /// Bump the entity's generation by one and the world revision with it.
    fn touch(&mut self, entity: Entity) {
        self.touch_by(entity, 1);
    }

    /// Bump the entity's generation by `amount`. Dead entities are ignored;
    /// the revision still moves so observers notice the disappearance.
    fn touch_by(&mut self, entity: Entity, amount: u64);

    /// Current world-wide revision.
    fn revision(&self) -> u64;

    /// The entity's generation, `0` if it has none.
    fn generation_of(&self, entity: Entity) -> u64;
}

impl Notify for World {
    fn touch_by(&mut self, entity: Entity, amount: u64) {
        if amount == 0 {
            return;
        }
        if self.is_alive(entity) {
            match self.get_mut::<Renderable>(entity) {
                Some(r) => r.generation += amount,
                None => self.insert(entity, Renderable { generation: amount }),
            }
        }
        match self.get_resource_mut::<Revision>() {
            Some(rev) => rev.0 += amount,
            None => self.insert_resource(Revision(amount)),
        }
    }

    fn revision(&self) -> u64 {
        self.get_resource::<Revision>().map_or(0, |r| r.0)
    }

    fn generation_of(&self, entity: Entity) -> u64 {
        self.get::<Renderable>(entity).map_or(0, |r| r.generation)
    }
}
