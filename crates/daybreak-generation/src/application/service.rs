//! The generation service port and the routing of job kinds to services.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::domain::job::JobKind;
use crate::domain::request::{JobOutput, JobRequest};
use crate::error::ServiceError;

/// An external service that turns a job request into an output.
#[async_trait]
pub trait GenerationService: Send + Sync {
    /// Performs one attempt of `request`.
    async fn generate(&self, request: &JobRequest) -> Result<JobOutput, ServiceError>;
}

/// Maps each job kind to the service that handles it.
#[derive(Clone, Default)]
pub struct ServiceRouter {
    routes: HashMap<JobKind, Arc<dyn GenerationService>>,
}

impl std::fmt::Debug for ServiceRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut kinds: Vec<&JobKind> = self.routes.keys().collect();
        kinds.sort();
        f.debug_struct("ServiceRouter").field("kinds", &kinds).finish()
    }
}

impl ServiceRouter {
    /// An empty router; every kind is unrouted.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Routes `kind` to `service`, replacing any earlier route.
    #[must_use]
    pub fn route(mut self, kind: JobKind, service: Arc<dyn GenerationService>) -> Self {
        self.routes.insert(kind, service);
        self
    }

    /// Routes narrative and teaser jobs to a text generator.
    #[must_use]
    pub fn text(self, service: Arc<dyn GenerationService>) -> Self {
        self.route(JobKind::Narrative, service.clone())
            .route(JobKind::Teaser, service)
    }

    /// Routes NPC reaction jobs.
    #[must_use]
    pub fn npc(self, service: Arc<dyn GenerationService>) -> Self {
        self.route(JobKind::NpcReaction, service)
    }

    /// Routes every media kind to one service.
    #[must_use]
    pub fn media(self, service: Arc<dyn GenerationService>) -> Self {
        JobKind::MEDIA
            .into_iter()
            .fold(self, |router, kind| router.route(kind, service.clone()))
    }

    /// Returns the service for `kind`, if routed.
    #[must_use]
    pub fn service_for(&self, kind: JobKind) -> Option<Arc<dyn GenerationService>> {
        self.routes.get(&kind).cloned()
    }
}
