//! Application layer for the Content Generation context.

pub mod dispatcher;
pub mod retry;
pub mod service;
