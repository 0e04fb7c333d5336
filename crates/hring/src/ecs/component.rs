//! # Component — Type-Erased Columns
//!
//! Frames, fog states, positions and every other component live in
//! [`ComponentColumn`]s: one column per component type per archetype. A column
//! is a `Vec<Box<dyn Any>>`, accessed through `downcast_ref`/`downcast_mut`.
//! No unsafe code; a type mismatch is an engine bug and panics.

use std::any::Any;

/// A type-erased column of components.
pub struct ComponentColumn {
    data: Vec<Box<dyn Any + Send + Sync>>,
}

impl ComponentColumn {
    pub fn new() -> Self {
        Self { data: Vec::new() }
    }

    pub fn push<T: 'static + Send + Sync>(&mut self, value: T) {
        self.data.push(Box::new(value));
    }

    /// Push an already boxed component. Used when an entity migrates between
    /// archetypes.
    pub fn push_any(&mut self, value: Box<dyn Any + Send + Sync>) {
        self.data.push(value);
    }

    /// # Panics
    ///
    /// Panics if the index is out of bounds or the type doesn't match.
    pub fn get<T: 'static>(&self, index: usize) -> &T {
        self.data[index].downcast_ref().unwrap_or_else(|| {
            panic!(
                "component column holds a different type than `{}`",
                std::any::type_name::<T>()
            )
        })
    }

    /// # Panics
    ///
    /// Panics if the index is out of bounds or the type doesn't match.
    pub fn get_mut<T: 'static>(&mut self, index: usize) -> &mut T {
        self.data[index].downcast_mut().unwrap_or_else(|| {
            panic!(
                "component column holds a different type than `{}`",
                std::any::type_name::<T>()
            )
        })
    }

    /// Swap-remove the component at `index` and hand it back boxed.
    pub fn take(&mut self, index: usize) -> Box<dyn Any + Send + Sync> {
        self.data.swap_remove(index)
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }
}

impl Default for ComponentColumn {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn take_swaps_last_into_hole() {
        let mut col = ComponentColumn::new();
        col.push(10u32);
        col.push(20u32);
        col.push(30u32);
        let taken = col.take(0);
        assert_eq!(*taken.downcast::<u32>().unwrap(), 10);
        assert_eq!(col.len(), 2);
        assert_eq!(*col.get::<u32>(0), 30);
    }

    #[test]
    fn moved_box_keeps_value() {
        let mut from = ComponentColumn::new();
        from.push(String::from("frame"));
        let mut to = ComponentColumn::new();
        to.push_any(from.take(0));
        assert_eq!(to.get::<String>(0), "frame");
        assert_eq!(from.len(), 0);
    }

    #[test]
    #[should_panic(expected = "different type")]
    fn wrong_type_panics() {
        let mut col = ComponentColumn::new();
        col.push(1.0f32);
        let _ = col.get::<u64>(0);
    }
}
