//! Domain layer for the Content Generation context.

pub mod job;
pub mod request;
