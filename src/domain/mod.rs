//! Domain layer: aggregates, value objects and the events they give rise to.
pub mod aggregates;
pub mod events;
pub mod value_objects;
