//! Route modules organized by bounded context.

pub mod episodes;
pub mod health;
pub mod sessions;
pub mod world;
