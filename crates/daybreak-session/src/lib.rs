//! Daybreak — Session bounded context.
//!
//! A session is one persistent game instance: its setting, crew roster and
//! characters, and the sequence of episodes played in it. The
//! `SessionScheduler` arms one timer per session and guarantees that at most
//! one episode of a session is live at any time.

pub mod application;
pub mod domain;
pub mod error;

pub use application::cadence::Cadence;
pub use application::scheduler::{SessionScheduler, TriggerOutcome};
pub use domain::aggregates::Session;
pub use domain::character::Character;
pub use error::SchedulerError;
