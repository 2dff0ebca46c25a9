//! Domain layer for the Episode context.

pub mod aggregates;
pub mod events;
pub mod outcome;
pub mod state;
