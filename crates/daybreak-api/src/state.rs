//! Shared application state.

use std::sync::Arc;

use daybreak_core::clock::Clock;
use daybreak_core::repository::EventRepository;
use daybreak_core::rng::{DeterministicRng, SystemRng};
use daybreak_episode::{EpisodeConfig, EpisodeRunner, Publisher};
use daybreak_generation::{Dispatcher, GenerationService, RetryPolicy, ServiceRouter};
use daybreak_services::{
    ChatCompletionGenerator, LogPublisher, MediaServiceClient, OfflineGenerator, WebhookPublisher,
};
use daybreak_session::{Cadence, SessionScheduler};
use daybreak_voting::{VoteAggregator, VotingPolicy};
use daybreak_world_state::application::store::{EventSourcedWorldStore, WorldStateStore};
use tracing::info;

use crate::config::Config;

/// The outward-facing collaborators an episode needs.
pub struct Wiring {
    /// Routes job kinds to generation services.
    pub router: ServiceRouter,
    /// Player notification transport.
    pub publisher: Arc<dyn Publisher>,
    /// Retry jitter source.
    pub rng: Box<dyn DeterministicRng>,
}

impl Wiring {
    /// Chooses adapters from the configured endpoints. Text and NPC jobs fall
    /// back to the offline generator; media stays unrouted without a media
    /// service.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        let text: Arc<dyn GenerationService> = match &config.llm_base_url {
            Some(url) => {
                info!(%url, "using chat completion generator");
                Arc::new(ChatCompletionGenerator::new(url.clone()))
            }
            None => {
                info!("LLM_BASE_URL not set, using offline generator");
                Arc::new(OfflineGenerator::new())
            }
        };
        let mut router = ServiceRouter::new().text(text.clone()).npc(text);
        if let Some(url) = &config.media_service_url {
            router = router.media(Arc::new(MediaServiceClient::new(url.clone())));
        }

        let publisher: Arc<dyn Publisher> = match &config.notify_webhook_url {
            Some(url) => Arc::new(WebhookPublisher::new(url.clone())),
            None => Arc::new(LogPublisher),
        };

        Self {
            router,
            publisher,
            rng: Box::new(SystemRng::from_entropy()),
        }
    }
}

/// Tunables the state is assembled with.
#[derive(Debug, Clone, Default)]
pub struct Settings {
    /// Episode timing and content.
    pub episode: EpisodeConfig,
    /// Generation retries.
    pub retry: RetryPolicy,
    /// Tally resolution.
    pub voting: VotingPolicy,
    /// Cadence armed for new sessions; `None` leaves them manual.
    pub cadence: Option<Cadence>,
}

impl From<&Config> for Settings {
    fn from(config: &Config) -> Self {
        Self {
            episode: config.episode_config(),
            retry: config.retry,
            voting: config.voting,
            cadence: config.cadence(),
        }
    }
}

/// Application state shared across all request handlers.
#[derive(Clone)]
pub struct AppState {
    /// Injectable clock.
    pub clock: Arc<dyn Clock>,
    /// Event store shared by every context.
    pub event_repository: Arc<dyn EventRepository>,
    /// Session worlds.
    pub world: Arc<dyn WorldStateStore>,
    /// Open vote windows.
    pub votes: Arc<VoteAggregator>,
    /// Per-session episode triggers.
    pub scheduler: SessionScheduler,
    /// Cadence armed for new sessions.
    pub cadence: Option<Cadence>,
}

impl AppState {
    /// Builds every component over `event_repository`.
    #[must_use]
    pub fn assemble(
        event_repository: Arc<dyn EventRepository>,
        clock: Arc<dyn Clock>,
        wiring: Wiring,
        settings: Settings,
    ) -> Self {
        let world: Arc<dyn WorldStateStore> = Arc::new(EventSourcedWorldStore::new(
            event_repository.clone(),
            clock.clone(),
        ));
        let votes = Arc::new(VoteAggregator::new(
            event_repository.clone(),
            clock.clone(),
            settings.voting,
        ));
        let runner = Arc::new(EpisodeRunner::new(
            event_repository.clone(),
            clock.clone(),
            world.clone(),
            votes.clone(),
            Dispatcher::new(wiring.router, settings.retry, wiring.rng),
            wiring.publisher,
            settings.episode,
        ));
        let scheduler = SessionScheduler::new(event_repository.clone(), clock.clone(), runner);

        Self {
            clock,
            event_repository,
            world,
            votes,
            scheduler,
            cadence: settings.cadence,
        }
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("cadence", &self.cadence)
            .finish_non_exhaustive()
    }
}
