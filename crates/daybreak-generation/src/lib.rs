//! Daybreak — Content Generation bounded context.
//!
//! Models the asynchronous jobs sent to narrative, NPC and media services and
//! the dispatcher that fans them out, retries transient failures with
//! exponential backoff and joins the results without letting one job's
//! failure block its siblings.

pub mod application;
pub mod domain;
pub mod error;
#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use application::dispatcher::{Dispatcher, JobHandle};
pub use application::retry::RetryPolicy;
pub use application::service::{GenerationService, ServiceRouter};
pub use domain::job::{ContentJob, JobKind, JobStatus};
pub use domain::request::{
    Choice, JobOutput, JobPayload, JobRequest, MediaRequest, NarrativeDraft, NarrativeRequest,
    NpcRequest, TeaserRequest,
};
pub use error::ServiceError;
