//! # Archetype ECS
//!
//! The entity store every simulation system runs against. Archetype tables of
//! type-erased columns, closure-based queries, typed resources, diff journals
//! and deferred disposal. Zero unsafe.
//!
//! - [`entity`] — generational handles and stable ids
//! - [`component`] — type-erased columns
//! - [`archetype`] — tables grouped by component signature
//! - [`world`] — the store itself
//! - [`query`] — closure-based iteration
//! - [`system`] — systems and schedules

pub(crate) mod archetype;
pub(crate) mod component;
pub mod entity;
pub(crate) mod query;
pub mod system;
pub mod world;

pub use component::ComponentColumn;
pub use entity::Entity;
pub use query::QueryParam;
pub use system::{Schedule, System};
pub use world::{SpawnBundle, World};
