//! Application layer for the Vote Aggregation context.

pub mod aggregator;
