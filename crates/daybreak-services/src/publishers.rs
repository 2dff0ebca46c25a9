//! Publishers for the chat transport.

use async_trait::async_trait;
use daybreak_episode::{FailureNotice, PublishError, Publisher, ResultNotice, VoteOpenNotice};
use serde::Serialize;
use tracing::{info, instrument, warn};

#[derive(Debug, Serialize)]
struct Envelope<'a, T: Serialize> {
    event: &'static str,
    notice: &'a T,
}

/// POSTs each notification as JSON to a webhook (the chat bot's inbox).
#[derive(Debug, Clone)]
pub struct WebhookPublisher {
    client: reqwest::Client,
    url: String,
}

impl WebhookPublisher {
    /// A publisher posting to `url`.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
        }
    }

    /// Uses a preconfigured HTTP client.
    #[must_use]
    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }

    async fn post<T: Serialize + Sync>(&self, event: &'static str, notice: &T) -> Result<(), PublishError> {
        let response = self
            .client
            .post(&self.url)
            .json(&Envelope { event, notice })
            .send()
            .await
            .map_err(|e| PublishError(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            warn!(event, status = status.as_u16(), "webhook rejected notification");
            return Err(PublishError(format!("webhook answered {status}")));
        }
        Ok(())
    }
}

#[async_trait]
impl Publisher for WebhookPublisher {
    #[instrument(skip(self, notice), fields(episode_id = %notice.episode_id))]
    async fn publish_vote_open(&self, notice: &VoteOpenNotice) -> Result<(), PublishError> {
        self.post("vote_open", notice).await
    }

    #[instrument(skip(self, notice), fields(episode_id = %notice.episode_id))]
    async fn publish_result(&self, notice: &ResultNotice) -> Result<(), PublishError> {
        self.post("result", notice).await
    }

    #[instrument(skip(self, notice), fields(episode_id = %notice.episode_id))]
    async fn publish_failure(&self, notice: &FailureNotice) -> Result<(), PublishError> {
        self.post("failure", notice).await
    }
}

/// Writes notifications to the log. Used when no transport is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogPublisher;

#[async_trait]
impl Publisher for LogPublisher {
    async fn publish_vote_open(&self, notice: &VoteOpenNotice) -> Result<(), PublishError> {
        let choices: Vec<String> = notice
            .choices
            .iter()
            .map(|c| format!("{}: {}", c.key, c.label))
            .collect();
        info!(
            session_id = %notice.session_id,
            episode_id = %notice.episode_id,
            day = notice.day,
            closes_at = %notice.closes_at,
            narrative = %notice.narrative,
            choices = ?choices,
            npc_lines = notice.npc_lines.len(),
            "vote open"
        );
        Ok(())
    }

    async fn publish_result(&self, notice: &ResultNotice) -> Result<(), PublishError> {
        info!(
            session_id = %notice.session_id,
            episode_id = %notice.episode_id,
            day = notice.day,
            outcome = %notice.outcome.summary,
            total_votes = notice.tally.total_votes,
            assets = notice.assets.len(),
            missing = ?notice.missing,
            teaser = notice.teaser.as_deref().unwrap_or(""),
            "episode result"
        );
        Ok(())
    }

    async fn publish_failure(&self, notice: &FailureNotice) -> Result<(), PublishError> {
        warn!(
            session_id = %notice.session_id,
            episode_id = %notice.episode_id,
            day = notice.day,
            state = %notice.state,
            reason = %notice.reason,
            "episode failed"
        );
        Ok(())
    }
}
