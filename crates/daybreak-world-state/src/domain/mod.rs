//! Domain layer for the World State context.

pub mod aggregates;
pub mod commands;
pub mod events;
pub mod mutation;
