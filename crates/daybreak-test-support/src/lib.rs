//! Shared test mocks and utilities for the Daybreak game orchestrator.
//!
//! Only depends on `daybreak-core` so every context crate can pull it in as a
//! dev-dependency without duplicating its own types.

mod clock;
mod repository;
mod rng;

pub use clock::{FixedClock, ManualClock, fixed_time};
pub use repository::{
    ConflictingEventRepository, EmptyEventRepository, FailingEventRepository,
    RecordingEventRepository,
};
pub use rng::{MockRng, SequenceRng};
