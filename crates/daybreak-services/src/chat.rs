//! Text generation over an OpenAI-compatible chat completion endpoint.

use async_trait::async_trait;
use daybreak_generation::{
    GenerationService, JobOutput, JobPayload, JobRequest, NarrativeDraft, NarrativeRequest,
    NpcRequest, ServiceError, TeaserRequest,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::http::send_json;

const NARRATIVE_SYSTEM_PROMPT: &str = "You are the game master of a cooperative story game. \
Answer with a single JSON object and nothing else: \
{\"narrative\": string, \"choices\": [{\"key\": string, \"label\": string}]}. \
Offer two to four choices with short single-letter keys.";

const NPC_SYSTEM_PROMPT: &str =
    "You voice one character of a cooperative story game. Stay in character and answer in one or two sentences.";

const TEASER_SYSTEM_PROMPT: &str =
    "You write one or two sentence teasers for tomorrow's episode of a cooperative story game. Hint, never reveal.";

#[derive(Debug, Serialize)]
struct Message {
    role: &'static str,
    content: String,
}

#[derive(Debug, Serialize)]
struct CompletionBody<'a> {
    model: &'a str,
    messages: Vec<Message>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    choices: Vec<CompletionChoice>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
}

#[derive(Debug, Deserialize)]
struct CompletionMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Narrative, NPC and teaser generation via `{base_url}/chat/completions`.
#[derive(Debug, Clone)]
pub struct ChatCompletionGenerator {
    client: reqwest::Client,
    base_url: String,
    model: String,
    temperature: f32,
    max_tokens: u32,
}

impl ChatCompletionGenerator {
    /// A generator for the endpoint at `base_url` (e.g.
    /// `http://llama.cpp:8090/v1`).
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_owned(),
            model: "default".to_owned(),
            temperature: 0.7,
            max_tokens: 2000,
        }
    }

    /// Sets the model name sent with each request.
    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Uses a preconfigured HTTP client.
    #[must_use]
    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }

    async fn complete(&self, system: &str, user: String) -> Result<String, ServiceError> {
        let body = CompletionBody {
            model: &self.model,
            messages: vec![
                Message {
                    role: "system",
                    content: system.to_owned(),
                },
                Message {
                    role: "user",
                    content: user,
                },
            ],
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        };
        let response: CompletionResponse = send_json(
            self.client
                .post(format!("{}/chat/completions", self.base_url))
                .json(&body),
        )
        .await?;
        response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .map(|content| content.trim().to_owned())
            .filter(|content| !content.is_empty())
            .ok_or_else(|| ServiceError::Permanent("completion returned no content".into()))
    }

    async fn narrative(&self, request: &NarrativeRequest) -> Result<JobOutput, ServiceError> {
        let content = self
            .complete(NARRATIVE_SYSTEM_PROMPT, narrative_prompt(request))
            .await?;
        parse_draft(&content).map(JobOutput::Narrative)
    }

    async fn reaction(&self, request: &NpcRequest) -> Result<JobOutput, ServiceError> {
        let prompt = format!(
            "You are {name}. Personality: {personality}\nWorld: {world}\nRecent events:\n{events}\n\n\
             Give {name}'s brief reaction to the situation.",
            name = request.name,
            personality = request.personality,
            world = request.world,
            events = bullet_list(&request.recent_events),
        );
        let text = self.complete(NPC_SYSTEM_PROMPT, prompt).await?;
        Ok(JobOutput::Reaction {
            character_id: request.character_id,
            text,
        })
    }

    async fn teaser(&self, request: &TeaserRequest) -> Result<JobOutput, ServiceError> {
        let prompt = format!(
            "Setting: {}\nToday's outcome: {}\n\nWrite tomorrow's teaser.",
            request.setting, request.outcome
        );
        let text = self.complete(TEASER_SYSTEM_PROMPT, prompt).await?;
        Ok(JobOutput::Teaser { text })
    }
}

#[async_trait]
impl GenerationService for ChatCompletionGenerator {
    #[instrument(skip(self, request), fields(job_id = %request.job_id, kind = %request.kind()))]
    async fn generate(&self, request: &JobRequest) -> Result<JobOutput, ServiceError> {
        debug!("requesting completion");
        match &request.payload {
            JobPayload::Narrative(narrative) => self.narrative(narrative).await,
            JobPayload::NpcReaction(npc) => self.reaction(npc).await,
            JobPayload::Teaser(teaser) => self.teaser(teaser).await,
            JobPayload::Media(media) => Err(ServiceError::Permanent(format!(
                "chat completion cannot produce {}",
                media.kind
            ))),
        }
    }
}

fn narrative_prompt(request: &NarrativeRequest) -> String {
    format!(
        "Day {day} of the voyage.\nSetting: {setting}\nWorld state: {world}\nStory so far:\n{history}\n\n\
         Write today's episode in under 300 words: a central conflict or mystery and the \
         decision the crew must vote on.",
        day = request.day,
        setting = request.setting,
        world = request.world,
        history = bullet_list(&request.history),
    )
}

fn bullet_list(lines: &[String]) -> String {
    if lines.is_empty() {
        return "- nothing yet".to_owned();
    }
    lines
        .iter()
        .map(|line| format!("- {line}"))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Extracts the narrative JSON object from the message content, tolerating
/// surrounding prose or code fences.
fn parse_draft(content: &str) -> Result<NarrativeDraft, ServiceError> {
    let (Some(start), Some(end)) = (content.find('{'), content.rfind('}')) else {
        return Err(ServiceError::Permanent(
            "narrative response contained no JSON object".into(),
        ));
    };
    if end < start {
        return Err(ServiceError::Permanent(
            "narrative response contained no JSON object".into(),
        ));
    }
    let draft: NarrativeDraft = serde_json::from_str(&content[start..=end])
        .map_err(|e| ServiceError::Permanent(format!("unparsable narrative: {e}")))?;
    if draft.narrative.trim().is_empty() || draft.choices.is_empty() {
        return Err(ServiceError::Permanent(
            "narrative must have text and at least one choice".into(),
        ));
    }
    Ok(draft)
}
