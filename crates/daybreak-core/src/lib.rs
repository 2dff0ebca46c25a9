//! Daybreak Core — shared domain abstractions.
//!
//! This crate defines the traits and types every orchestrator component
//! depends on: aggregates, events, the event repository, time, randomness
//! and cooperative cancellation. It contains no infrastructure code.

pub mod aggregate;
pub mod cancel;
pub mod clock;
pub mod command;
pub mod error;
pub mod event;
pub mod repository;
pub mod rng;
