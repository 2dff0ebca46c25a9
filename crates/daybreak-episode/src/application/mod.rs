//! Application layer for the Episode context.

pub mod command_handlers;
pub mod publisher;
pub mod query_handlers;
pub mod runner;
