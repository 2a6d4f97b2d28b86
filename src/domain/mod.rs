//! Domain layer: aggregates, value objects, discount resolution and events.
pub mod aggregates;
pub mod discount;
pub mod events;
pub mod value_objects;
