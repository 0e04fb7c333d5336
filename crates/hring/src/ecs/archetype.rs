//! # Archetype — Entities Grouped by Component Signature
//!
//! All entities with exactly the same component set share one table:
//!
//! ```text
//! Archetype { Position, FogState, Opaque }
//!
//! columns:
//!   Position: [p0, p1, p2]
//!   FogState: [f0, f1, f2]
//!   Opaque:   [o0, o1, o2]
//! entities:   [e0, e1, e2]
//! ```
//!
//! Row `i` of every column belongs to `entities[i]`. Queries scan only the
//! archetypes whose signature is a superset of the requested components.

use std::any::TypeId;
use std::collections::HashMap;

use super::component::ComponentColumn;
use super::entity::Entity;

/// Sorted, deduplicated component signature.
pub(crate) type ArchetypeKey = Vec<TypeId>;

pub(crate) fn archetype_key(mut type_ids: Vec<TypeId>) -> ArchetypeKey {
    type_ids.sort();
    type_ids.dedup();
    type_ids
}

pub(crate) struct Archetype {
    pub columns: HashMap<TypeId, ComponentColumn>,
    pub entities: Vec<Entity>,
}

impl Archetype {
    /// Create an empty table with one column per type in `key`.
    pub fn with_key(key: &ArchetypeKey) -> Self {
        Self {
            columns: key.iter().map(|&t| (t, ComponentColumn::new())).collect(),
            entities: Vec::new(),
        }
    }

    pub fn has_component(&self, type_id: &TypeId) -> bool {
        self.columns.contains_key(type_id)
    }

    pub fn has_all(&self, type_ids: &[TypeId]) -> bool {
        type_ids.iter().all(|t| self.has_component(t))
    }

    /// Remove row `index` from every column, dropping the components.
    /// Returns the entity that was swapped into the hole, if any.
    pub fn swap_remove(&mut self, index: usize) -> Option<Entity> {
        for column in self.columns.values_mut() {
            drop(column.take(index));
        }
        self.entities.swap_remove(index);
        self.entities.get(index).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_is_order_independent() {
        let a = archetype_key(vec![TypeId::of::<u8>(), TypeId::of::<u16>()]);
        let b = archetype_key(vec![TypeId::of::<u16>(), TypeId::of::<u8>(), TypeId::of::<u8>()]);
        assert_eq!(a, b);
        assert_eq!(a.len(), 2);
    }

    #[test]
    fn swap_remove_reports_moved_entity() {
        let key = archetype_key(vec![TypeId::of::<u32>()]);
        let mut arch = Archetype::with_key(&key);
        for i in 0..3u32 {
            arch.entities.push(Entity { index: i, generation: 0 });
            arch.columns.get_mut(&TypeId::of::<u32>()).unwrap().push(i);
        }
        let moved = arch.swap_remove(0);
        assert_eq!(moved, Some(Entity { index: 2, generation: 0 }));
        assert_eq!(arch.swap_remove(1), None);
        assert_eq!(arch.entities.len(), 1);
    }
}
