//! # Query — Closure-Based Iteration by Component Set
//!
//! ```text
//! world.query::<(&mut Frame,)>(|entity, (frame,)| frame.age(dt));
//! ```
//!
//! For every archetype whose signature contains all requested types, the
//! needed columns are taken out of the archetype's map, each row is handed to
//! the closure, and the columns are put back. Taking the columns out gives the
//! borrow checker disjoint owned values, so `(&A, &mut B)` needs no unsafe.
//!
//! Requesting the same component twice in one query panics at extract time.

use std::any::TypeId;
use std::collections::HashMap;

use super::component::ComponentColumn;

/// Something fetchable per row: `&T`, `&mut T`, or a tuple of those.
pub trait QueryParam {
    type Item<'w>;

    /// Columns held while the query runs.
    type Column;

    fn type_ids() -> Vec<TypeId>;

    fn extract(columns: &mut HashMap<TypeId, ComponentColumn>) -> Self::Column;

    fn restore(col: Self::Column, columns: &mut HashMap<TypeId, ComponentColumn>);

    fn fetch(col: &mut Self::Column, index: usize) -> Self::Item<'_>;
}

fn take_column<T: 'static>(
    columns: &mut HashMap<TypeId, ComponentColumn>,
) -> (TypeId, ComponentColumn) {
    let tid = TypeId::of::<T>();
    match columns.remove(&tid) {
        Some(col) => (tid, col),
        None => panic!(
            "query needs `{}` but the column is missing (requested twice?)",
            std::any::type_name::<T>()
        ),
    }
}

impl<T: 'static + Send + Sync> QueryParam for &T {
    type Item<'w> = &'w T;
    type Column = (TypeId, ComponentColumn);

    fn type_ids() -> Vec<TypeId> {
        vec![TypeId::of::<T>()]
    }

    fn extract(columns: &mut HashMap<TypeId, ComponentColumn>) -> Self::Column {
        take_column::<T>(columns)
    }

    fn restore((tid, col): Self::Column, columns: &mut HashMap<TypeId, ComponentColumn>) {
        columns.insert(tid, col);
    }

    fn fetch(col: &mut Self::Column, index: usize) -> Self::Item<'_> {
        col.1.get::<T>(index)
    }
}

impl<T: 'static + Send + Sync> QueryParam for &mut T {
    type Item<'w> = &'w mut T;
    type Column = (TypeId, ComponentColumn);

    fn type_ids() -> Vec<TypeId> {
        vec![TypeId::of::<T>()]
    }

    fn extract(columns: &mut HashMap<TypeId, ComponentColumn>) -> Self::Column {
        take_column::<T>(columns)
    }

    fn restore((tid, col): Self::Column, columns: &mut HashMap<TypeId, ComponentColumn>) {
        columns.insert(tid, col);
    }

    fn fetch(col: &mut Self::Column, index: usize) -> Self::Item<'_> {
        col.1.get_mut::<T>(index)
    }
}

macro_rules! impl_query_tuple {
    ($($P:ident),+) => {
        impl<$($P: QueryParam),+> QueryParam for ($($P,)+) {
            type Item<'w> = ($($P::Item<'w>,)+);
            type Column = ($($P::Column,)+);

            fn type_ids() -> Vec<TypeId> {
                let mut ids = Vec::new();
                $(ids.extend($P::type_ids());)+
                ids
            }

            fn extract(columns: &mut HashMap<TypeId, ComponentColumn>) -> Self::Column {
                ($($P::extract(columns),)+)
            }

            #[allow(non_snake_case)]
            fn restore(col: Self::Column, columns: &mut HashMap<TypeId, ComponentColumn>) {
                let ($($P,)+) = col;
                $($P::restore($P, columns);)+
            }

            #[allow(non_snake_case)]
            fn fetch(col: &mut Self::Column, index: usize) -> Self::Item<'_> {
                let ($($P,)+) = col;
                ($($P::fetch($P, index),)+)
            }
        }
    };
}

impl_query_tuple!(A);
impl_query_tuple!(A, B);
impl_query_tuple!(A, B, C);
impl_query_tuple!(A, B, C, D);
impl_query_tuple!(A, B, C, D, E);
