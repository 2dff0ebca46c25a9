//! Daybreak event store.
//!
//! Durable (`PostgreSQL`) and volatile (in-memory) implementations of the
//! `EventRepository` contract. Both enforce the same optimistic concurrency
//! rule: an append succeeds only if the stream is still at
//! `expected_version`, and writes all of its events or none.

pub mod memory_event_repository;
pub mod pg_event_repository;
