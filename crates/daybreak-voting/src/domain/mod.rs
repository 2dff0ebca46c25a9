//! Domain layer for the Vote Aggregation context.

pub mod aggregates;
pub mod events;
pub mod tally;
