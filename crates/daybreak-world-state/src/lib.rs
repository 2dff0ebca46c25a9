//! Daybreak — World State bounded context.
//!
//! Owns the canonical, versioned record of a session: crew status,
//! resources, relationships and the append-only history of resolved
//! outcomes. Every mutation is one event on the session's world stream, so
//! the stream length is the world version and the repository's
//! expected-version check is the only gate on concurrent writers.

pub mod application;
pub mod domain;
