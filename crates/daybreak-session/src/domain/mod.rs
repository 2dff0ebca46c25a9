//! Domain layer for the Session context.

pub mod aggregates;
pub mod character;
pub mod commands;
pub mod events;
