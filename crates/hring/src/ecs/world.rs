//! # World — The Entity Store
//!
//! The [`World`] owns every entity, component and resource of a simulation.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │ World                                                    │
//! │                                                          │
//! │  allocator: generational entity slots                    │
//! │  archetypes: HashMap<ArchetypeKey, Archetype>            │
//! │  entity_locations: slot index → (archetype key, row)     │
//! │  resources: HashMap<TypeId, Box<dyn Any>>                │
//! │  journals: TypeId → added / removed entities             │
//! │  deferred: disposals postponed to the end of the tick    │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Diff journals
//!
//! Systems that maintain their own index (the visibility cell index) need to
//! know which entities gained or lost a component since they last looked.
//! [`World::track`] turns journaling on for one component type; afterwards
//! [`World::added`] and [`World::removed`] drain everything that happened since
//! the previous drain. Disposal counts as removal of every tracked component.
//!
//! ## Deferred disposal
//!
//! [`World::despawn_deferred`] keeps an entity alive until
//! [`World::flush_deferred`], which the simulation calls as its last stage.
//! Sequence frames are released this way so a later stage in the same tick can
//! still read their final generation.

use std::any::{Any, TypeId};
use std::collections::HashMap;

use super::archetype::{Archetype, ArchetypeKey, archetype_key};
use super::component::ComponentColumn;
use super::entity::{Entity, EntityAllocator};
use super::query::QueryParam;
use crate::error::SimError;

type BoxedComponent = Box<dyn Any + Send + Sync>;

#[derive(Clone)]
pub(crate) struct EntityLocation {
    archetype_key: ArchetypeKey,
    row: usize,
}

#[derive(Default)]
struct Journal {
    added: Vec<Entity>,
    removed: Vec<Entity>,
}

/// The central container for all simulation state.
pub struct World {
    allocator: EntityAllocator,
    archetypes: HashMap<ArchetypeKey, Archetype>,
    entity_locations: HashMap<u32, EntityLocation>,
    resources: HashMap<TypeId, Box<dyn Any>>,
    journals: HashMap<TypeId, Journal>,
    deferred: Vec<Entity>,
    #[cfg(feature = "diagnostics")]
    spawned_this_tick: u32,
    #[cfg(feature = "diagnostics")]
    despawned_this_tick: u32,
}

impl World {
    pub fn new() -> Self {
        Self {
            allocator: EntityAllocator::new(),
            archetypes: HashMap::new(),
            entity_locations: HashMap::new(),
            resources: HashMap::new(),
            journals: HashMap::new(),
            deferred: Vec::new(),
            #[cfg(feature = "diagnostics")]
            spawned_this_tick: 0,
            #[cfg(feature = "diagnostics")]
            despawned_this_tick: 0,
        }
    }

    // ── Resources ────────────────────────────────────────────────────

    /// Insert a resource, replacing any existing one of the same type.
    pub fn insert_resource<T: 'static + Send + Sync>(&mut self, value: T) {
        self.resources.insert(TypeId::of::<T>(), Box::new(value));
    }

    /// # Panics
    ///
    /// Panics if the resource hasn't been inserted.
    pub fn resource<T: 'static + Send + Sync>(&self) -> &T {
        self.get_resource::<T>().unwrap_or_else(|| {
            panic!(
                "resource `{}` not found; was the simulation built with Simulation::new?",
                std::any::type_name::<T>()
            )
        })
    }

    /// # Panics
    ///
    /// Panics if the resource hasn't been inserted.
    pub fn resource_mut<T: 'static + Send + Sync>(&mut self) -> &mut T {
        self.get_resource_mut::<T>().unwrap_or_else(|| {
            panic!(
                "resource `{}` not found; was the simulation built with Simulation::new?",
                std::any::type_name::<T>()
            )
        })
    }

    pub fn get_resource<T: 'static + Send + Sync>(&self) -> Option<&T> {
        self.resources
            .get(&TypeId::of::<T>())
            .and_then(|r| r.downcast_ref::<T>())
    }

    pub fn get_resource_mut<T: 'static + Send + Sync>(&mut self) -> Option<&mut T> {
        self.resources
            .get_mut(&TypeId::of::<T>())
            .and_then(|r| r.downcast_mut::<T>())
    }

    pub fn has_resource<T: 'static + Send + Sync>(&self) -> bool {
        self.resources.contains_key(&TypeId::of::<T>())
    }

    /// Remove a resource, taking ownership. Used for the extract/reinsert
    /// pattern when a system needs the resource and `&mut World` at once.
    pub fn resource_remove<T: 'static + Send + Sync>(&mut self) -> Option<T> {
        self.resources
            .remove(&TypeId::of::<T>())
            .and_then(|r| r.downcast::<T>().ok())
            .map(|b| *b)
    }

    // ── Diff journals ────────────────────────────────────────────────

    /// Start journaling additions and removals of component `T`.
    /// Calling it again is a no-op.
    pub fn track<T: 'static + Send + Sync>(&mut self) {
        self.journals.entry(TypeId::of::<T>()).or_default();
    }

    /// Drain the entities that gained `T` since the previous call.
    /// Empty if `T` is not tracked.
    pub fn added<T: 'static + Send + Sync>(&mut self) -> Vec<Entity> {
        self.journals
            .get_mut(&TypeId::of::<T>())
            .map(|j| std::mem::take(&mut j.added))
            .unwrap_or_default()
    }

    /// Drain the entities that lost `T` (or were disposed while holding it)
    /// since the previous call. Empty if `T` is not tracked.
    pub fn removed<T: 'static + Send + Sync>(&mut self) -> Vec<Entity> {
        self.journals
            .get_mut(&TypeId::of::<T>())
            .map(|j| std::mem::take(&mut j.removed))
            .unwrap_or_default()
    }

    fn journal_added(&mut self, entity: Entity, type_ids: &[TypeId]) {
        for tid in type_ids {
            if let Some(j) = self.journals.get_mut(tid) {
                j.added.push(entity);
            }
        }
    }

    fn journal_removed(&mut self, entity: Entity, type_ids: &[TypeId]) {
        for tid in type_ids {
            if let Some(j) = self.journals.get_mut(tid) {
                j.removed.push(entity);
            }
        }
    }

    // ── Entity lookup ────────────────────────────────────────────────

    pub fn entity_count(&self) -> usize {
        self.allocator.alive_count()
    }

    pub fn archetype_count(&self) -> usize {
        self.archetypes.len()
    }

    pub fn is_alive(&self, entity: Entity) -> bool {
        self.allocator.is_alive(entity)
    }

    /// Resolve a stable id from [`Entity::to_bits`].
    pub fn by_id(&self, id: u64) -> Result<Entity, SimError> {
        self.try_by_id(id).ok_or(SimError::NotFound { id })
    }

    /// Non-asserting variant of [`by_id`](World::by_id), for targets that may
    /// legitimately have been disposed since they were last referenced.
    pub fn try_by_id(&self, id: u64) -> Option<Entity> {
        let entity = Entity::from_bits(id);
        self.is_alive(entity).then_some(entity)
    }

    /// Every live entity that has `T`, sorted.
    pub fn entities_with<T: 'static + Send + Sync>(&self) -> Vec<Entity> {
        let type_id = TypeId::of::<T>();
        let mut result: Vec<Entity> = self
            .archetypes
            .values()
            .filter(|a| a.has_component(&type_id))
            .flat_map(|a| a.entities.iter().copied())
            .collect();
        result.sort_unstable();
        result
    }

    // ── Spawn / Despawn ──────────────────────────────────────────────

    pub fn spawn_empty(&mut self) -> Entity {
        self.spawn(())
    }

    /// Spawn an entity with a bundle of components (tuple).
    ///
    /// ```ignore
    /// let clock = world.spawn((Frame::new(0.25), Renderable::default()));
    /// ```
    pub fn spawn<B: SpawnBundle>(&mut self, bundle: B) -> Entity {
        let entity = self.allocator.allocate();
        #[cfg(feature = "diagnostics")]
        {
            self.spawned_this_tick += 1;
        }
        let type_ids = B::type_ids();
        let key = archetype_key(type_ids.clone());
        assert_eq!(
            key.len(),
            type_ids.len(),
            "spawn bundle lists the same component type twice"
        );

        let arch = self
            .archetypes
            .entry(key.clone())
            .or_insert_with(|| Archetype::with_key(&key));
        let row = arch.entities.len();
        arch.entities.push(entity);
        bundle.push_into(&mut arch.columns);

        self.entity_locations.insert(
            entity.index,
            EntityLocation {
                archetype_key: key,
                row,
            },
        );
        self.journal_added(entity, &type_ids);
        entity
    }

    /// Dispose an entity immediately, dropping its components and freeing its
    /// slot. Returns `false` if it was already dead, so callers can detect a
    /// second disposal of the same handle.
    pub fn despawn(&mut self, entity: Entity) -> bool {
        if !self.allocator.is_alive(entity) {
            return false;
        }

        if let Some(loc) = self.entity_locations.remove(&entity.index) {
            if let Some(arch) = self.archetypes.get_mut(&loc.archetype_key) {
                if let Some(moved) = arch.swap_remove(loc.row) {
                    if let Some(moved_loc) = self.entity_locations.get_mut(&moved.index) {
                        moved_loc.row = loc.row;
                    }
                }
            }
            self.journal_removed(entity, &loc.archetype_key);
        }

        self.allocator.deallocate(entity);
        #[cfg(feature = "diagnostics")]
        {
            self.despawned_this_tick += 1;
        }
        true
    }

    /// Queue an entity for disposal at the end of the tick. It stays alive and
    /// readable until [`flush_deferred`](World::flush_deferred).
    pub fn despawn_deferred(&mut self, entity: Entity) {
        if self.is_alive(entity) && !self.deferred.contains(&entity) {
            self.deferred.push(entity);
        }
    }

    pub fn is_despawn_pending(&self, entity: Entity) -> bool {
        self.deferred.contains(&entity)
    }

    /// Dispose everything queued by [`despawn_deferred`](World::despawn_deferred).
    /// Returns how many entities were actually disposed.
    pub fn flush_deferred(&mut self) -> usize {
        let pending = std::mem::take(&mut self.deferred);
        pending.into_iter().filter(|&e| self.despawn(e)).count()
    }

    /// Spawn and despawn counts since the previous call.
    #[cfg(feature = "diagnostics")]
    pub(crate) fn take_churn(&mut self) -> (u32, u32) {
        let churn = (self.spawned_this_tick, self.despawned_this_tick);
        self.spawned_this_tick = 0;
        self.despawned_this_tick = 0;
        churn
    }

    // ── Per-Entity Component Access ──────────────────────────────────

    /// Returns `None` if the entity is dead or lacks the component.
    pub fn get<T: 'static + Send + Sync>(&self, entity: Entity) -> Option<&T> {
        if !self.allocator.is_alive(entity) {
            return None;
        }
        let loc = self.entity_locations.get(&entity.index)?;
        let arch = self.archetypes.get(&loc.archetype_key)?;
        let col = arch.columns.get(&TypeId::of::<T>())?;
        Some(col.get::<T>(loc.row))
    }

    /// Returns `None` if the entity is dead or lacks the component.
    pub fn get_mut<T: 'static + Send + Sync>(&mut self, entity: Entity) -> Option<&mut T> {
        if !self.allocator.is_alive(entity) {
            return None;
        }
        let loc = self.entity_locations.get(&entity.index)?;
        let arch = self.archetypes.get_mut(&loc.archetype_key)?;
        let col = arch.columns.get_mut(&TypeId::of::<T>())?;
        Some(col.get_mut::<T>(loc.row))
    }

    pub fn has<T: 'static + Send + Sync>(&self, entity: Entity) -> bool {
        self.get::<T>(entity).is_some()
    }

    // ── Dynamic Component Add/Remove ─────────────────────────────────

    /// Add a component, replacing an existing one of the same type.
    ///
    /// # Panics
    ///
    /// Panics if the entity is not alive.
    pub fn insert<T: 'static + Send + Sync>(&mut self, entity: Entity, component: T) {
        if let Some(existing) = self.get_mut::<T>(entity) {
            *existing = component;
            return;
        }
        let loc = self.location(entity, std::any::type_name::<T>());
        let tid = TypeId::of::<T>();
        let mut type_ids = loc.archetype_key.clone();
        type_ids.push(tid);
        let new_key = archetype_key(type_ids);
        self.relocate(entity, loc, new_key, Some((tid, Box::new(component))));
        self.journal_added(entity, &[tid]);
    }

    /// Remove a component. Returns `true` if it was present.
    ///
    /// # Panics
    ///
    /// Panics if the entity is not alive.
    pub fn remove<T: 'static + Send + Sync>(&mut self, entity: Entity) -> bool {
        self.take::<T>(entity).is_some()
    }

    /// Remove a component and hand it back.
    ///
    /// # Panics
    ///
    /// Panics if the entity is not alive.
    pub fn take<T: 'static + Send + Sync>(&mut self, entity: Entity) -> Option<T> {
        let loc = self.location(entity, std::any::type_name::<T>());
        let tid = TypeId::of::<T>();
        if !loc.archetype_key.contains(&tid) {
            return None;
        }
        let new_key: ArchetypeKey = loc
            .archetype_key
            .iter()
            .copied()
            .filter(|&t| t != tid)
            .collect();
        let mut leftover = self.relocate(entity, loc, new_key, None);
        self.journal_removed(entity, &[tid]);
        leftover
            .remove(&tid)
            .and_then(|b| b.downcast::<T>().ok())
            .map(|b| *b)
    }

    fn location(&self, entity: Entity, what: &str) -> EntityLocation {
        assert!(
            self.allocator.is_alive(entity),
            "cannot change `{what}` on dead entity {entity:?}"
        );
        self.entity_locations
            .get(&entity.index)
            .cloned()
            .unwrap_or_else(|| panic!("live entity {entity:?} has no archetype row"))
    }

    /// Move an entity's row into the archetype `new_key`, adding `extra` on the
    /// way. Components the new archetype has no column for are handed back.
    fn relocate(
        &mut self,
        entity: Entity,
        loc: EntityLocation,
        new_key: ArchetypeKey,
        extra: Option<(TypeId, BoxedComponent)>,
    ) -> HashMap<TypeId, BoxedComponent> {
        let mut taken: HashMap<TypeId, BoxedComponent> = HashMap::new();
        if let Some(old) = self.archetypes.get_mut(&loc.archetype_key) {
            for (&tid, col) in old.columns.iter_mut() {
                taken.insert(tid, col.take(loc.row));
            }
            old.entities.swap_remove(loc.row);
            if let Some(&moved) = old.entities.get(loc.row) {
                if let Some(moved_loc) = self.entity_locations.get_mut(&moved.index) {
                    moved_loc.row = loc.row;
                }
            }
        }
        if let Some((tid, value)) = extra {
            taken.insert(tid, value);
        }

        let arch = self
            .archetypes
            .entry(new_key.clone())
            .or_insert_with(|| Archetype::with_key(&new_key));
        let row = arch.entities.len();
        arch.entities.push(entity);
        for (tid, col) in arch.columns.iter_mut() {
            let value = taken
                .remove(tid)
                .unwrap_or_else(|| panic!("component lost while relocating {entity:?}"));
            col.push_any(value);
        }

        self.entity_locations.insert(
            entity.index,
            EntityLocation {
                archetype_key: new_key,
                row,
            },
        );
        taken
    }

    // ── Query ────────────────────────────────────────────────────────

    /// Visit every entity holding all components of `Q`.
    ///
    /// Archetypes are visited in key order so a run is reproducible.
    ///
    /// ```ignore
    /// world.query::<(&mut Frame,)>(|_, (frame,)| frame.settle());
    /// ```
    pub fn query<Q: QueryParam>(&mut self, f: impl FnMut(Entity, Q::Item<'_>)) {
        self.query_types::<Q>(Q::type_ids(), f);
    }

    /// Like [`query`](World::query), restricted to entities that also have
    /// the marker `F`. The marker itself is not yielded.
    pub fn query_filtered<Q: QueryParam, F: 'static + Send + Sync>(
        &mut self,
        f: impl FnMut(Entity, Q::Item<'_>),
    ) {
        let mut required = Q::type_ids();
        required.push(TypeId::of::<F>());
        self.query_types::<Q>(required, f);
    }

    fn query_types<Q: QueryParam>(
        &mut self,
        required: Vec<TypeId>,
        mut f: impl FnMut(Entity, Q::Item<'_>),
    ) {
        let mut matching: Vec<ArchetypeKey> = self
            .archetypes
            .iter()
            .filter(|(_, arch)| arch.has_all(&required) && !arch.entities.is_empty())
            .map(|(key, _)| key.clone())
            .collect();
        matching.sort();

        for key in matching {
            let Some(arch) = self.archetypes.get_mut(&key) else {
                continue;
            };
            let mut cols = Q::extract(&mut arch.columns);
            for (row, &entity) in arch.entities.iter().enumerate() {
                f(entity, Q::fetch(&mut cols, row));
            }
            Q::restore(cols, &mut arch.columns);
        }
    }
}

impl Default for World {
    fn default() -> Self {
        Self::new()
    }
}

// ── Spawn Trait (tuple support) ──────────────────────────────────────────

/// A tuple of components that can be spawned together.
pub trait SpawnBundle {
    fn type_ids() -> Vec<TypeId>;
    fn push_into(self, columns: &mut HashMap<TypeId, ComponentColumn>);
}

impl SpawnBundle for () {
    fn type_ids() -> Vec<TypeId> {
        Vec::new()
    }

    fn push_into(self, _columns: &mut HashMap<TypeId, ComponentColumn>) {}
}

macro_rules! impl_spawn_bundle {
    ($($T:ident),+) => {
        impl<$($T: 'static + Send + Sync),+> SpawnBundle for ($($T,)+) {
            fn type_ids() -> Vec<TypeId> {
                vec![$(TypeId::of::<$T>()),+]
            }

            #[allow(non_snake_case)]
            fn push_into(self, columns: &mut HashMap<TypeId, ComponentColumn>) {
                let ($($T,)+) = self;
                $(
                    columns
                        .get_mut(&TypeId::of::<$T>())
                        .unwrap_or_else(|| panic!("archetype built without a column for bundle member"))
                        .push::<$T>($T);
                )+
            }
        }
    };
}

impl_spawn_bundle!(A);
impl_spawn_bundle!(A, B);
impl_spawn_bundle!(A, B, C);
impl_spawn_bundle!(A, B, C, D);
impl_spawn_bundle!(A, B, C, D, E);
impl_spawn_bundle!(A, B, C, D, E, F);
impl_spawn_bundle!(A, B, C, D, E, F, G);
impl_spawn_bundle!(A, B, C, D, E, F, G, H);

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct Cell(i32, i32);
    struct Light(f32);
    struct Wall;

    #[test]
    fn spawn_and_query() {
        let mut world = World::new();
        world.spawn((Cell(0, 0), Light(3.0)));
        world.spawn((Cell(1, 0), Light(1.0)));
        world.spawn((Cell(2, 0),));

        let mut total = 0.0;
        world.query::<(&Cell, &Light)>(|_, (_, light)| total += light.0);
        assert_eq!(total, 4.0);
    }

    #[test]
    fn query_filtered_requires_marker() {
        let mut world = World::new();
        world.spawn((Cell(0, 0), Wall));
        world.spawn((Cell(1, 1),));

        let mut seen = Vec::new();
        world.query_filtered::<(&Cell,), Wall>(|_, (c,)| seen.push(c.0));
        assert_eq!(seen, vec![0]);
    }

    #[test]
    fn insert_take_and_replace() {
        let mut world = World::new();
        let e = world.spawn((Cell(4, 5),));
        world.insert(e, Light(2.0));
        world.insert(e, Light(6.0));
        assert_eq!(world.get::<Light>(e).map(|l| l.0), Some(6.0));

        let light = world.take::<Light>(e);
        assert_eq!(light.map(|l| l.0), Some(6.0));
        assert!(!world.has::<Light>(e));
        assert_eq!(world.get::<Cell>(e), Some(&Cell(4, 5)));
        assert!(!world.remove::<Light>(e));
    }

    #[test]
    fn relocation_keeps_other_rows_intact() {
        let mut world = World::new();
        let a = world.spawn((Cell(0, 0),));
        let b = world.spawn((Cell(1, 1),));
        let c = world.spawn((Cell(2, 2),));
        world.insert(a, Wall);
        assert_eq!(world.get::<Cell>(b), Some(&Cell(1, 1)));
        assert_eq!(world.get::<Cell>(c), Some(&Cell(2, 2)));
        assert_eq!(world.get::<Cell>(a), Some(&Cell(0, 0)));
        world.despawn(b);
        assert_eq!(world.get::<Cell>(c), Some(&Cell(2, 2)));
    }

    #[test]
    fn journals_report_added_and_removed() {
        let mut world = World::new();
        world.track::<Wall>();
        let a = world.spawn((Cell(0, 0), Wall));
        let b = world.spawn((Cell(1, 0),));
        world.insert(b, Wall);
        assert_eq!(world.added::<Wall>(), vec![a, b]);
        assert!(world.added::<Wall>().is_empty());

        world.remove::<Wall>(a);
        world.despawn(b);
        assert_eq!(world.removed::<Wall>(), vec![a, b]);
        assert!(world.removed::<Cell>().is_empty());
    }

    #[test]
    fn deferred_despawn_waits_for_flush() {
        let mut world = World::new();
        let e = world.spawn((Cell(0, 0),));
        world.despawn_deferred(e);
        world.despawn_deferred(e);
        assert!(world.is_alive(e));
        assert!(world.is_despawn_pending(e));
        assert_eq!(world.flush_deferred(), 1);
        assert!(!world.is_alive(e));
        assert_eq!(world.flush_deferred(), 0);
    }

    #[test]
    fn stable_ids_resolve_until_disposed() {
        let mut world = World::new();
        let e = world.spawn((Cell(0, 0),));
        let id = e.to_bits();
        assert_eq!(world.by_id(id).ok(), Some(e));
        world.despawn(e);
        assert!(matches!(world.by_id(id), Err(SimError::NotFound { .. })));
        assert_eq!(world.try_by_id(id), None);
        let reused = world.spawn((Cell(9, 9),));
        assert_eq!(reused.index(), e.index());
        assert_eq!(world.try_by_id(id), None);
        assert!(world.is_alive(reused));
        assert_eq!(world.try_by_id(reused.to_bits()), Some(reused));
    }

    #[test]
    fn second_despawn_is_reported() {
        let mut world = World::new();
        let e = world.spawn_empty();
        assert!(world.despawn(e));
        assert!(!world.despawn(e));
        assert_eq!(world.entity_count(), 0);
    }

    #[test]
    fn entities_with_is_sorted() {
        let mut world = World::new();
        let a = world.spawn((Wall,));
        let _ = world.spawn((Cell(0, 0),));
        let c = world.spawn((Cell(0, 0), Wall));
        assert_eq!(world.entities_with::<Wall>(), vec![a, c]);
    }

    #[test]
    fn resources_extract_and_reinsert() {
        let mut world = World::new();
        world.insert_resource(5u32);
        let taken = world.resource_remove::<u32>();
        assert_eq!(taken, Some(5));
        assert!(!world.has_resource::<u32>());
        world.insert_resource(taken.unwrap_or_default() + 1);
        assert_eq!(*world.resource::<u32>(), 6);
    }

    #[test]
    #[should_panic(expected = "dead entity")]
    fn insert_on_dead_entity_panics() {
        let mut world = World::new();
        let e = world.spawn_empty();
        world.despawn(e);
        world.insert(e, Wall);
    }
}
