//! Media generation over a JSON endpoint.

use async_trait::async_trait;
use daybreak_generation::{GenerationService, JobKind, JobOutput, JobPayload, JobRequest, ServiceError};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::http::send_json;

#[derive(Debug, Serialize)]
struct GenerateBody<'a> {
    job_id: Uuid,
    kind: JobKind,
    prompt: &'a str,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    asset: String,
}

/// Image, video, 3D and voice generation via `{base_url}/generate`.
#[derive(Debug, Clone)]
pub struct MediaServiceClient {
    client: reqwest::Client,
    base_url: String,
}

impl MediaServiceClient {
    /// A client for the media service at `base_url`.
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_owned(),
        }
    }

    /// Uses a preconfigured HTTP client.
    #[must_use]
    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }
}

#[async_trait]
impl GenerationService for MediaServiceClient {
    #[instrument(skip(self, request), fields(job_id = %request.job_id, kind = %request.kind()))]
    async fn generate(&self, request: &JobRequest) -> Result<JobOutput, ServiceError> {
        let JobPayload::Media(media) = &request.payload else {
            return Err(ServiceError::Permanent(format!(
                "media service cannot produce {}",
                request.kind()
            )));
        };
        let body = GenerateBody {
            job_id: request.job_id,
            kind: media.kind,
            prompt: &media.prompt,
        };
        let response: GenerateResponse = send_json(
            self.client
                .post(format!("{}/generate", self.base_url))
                .json(&body),
        )
        .await?;
        if response.asset.trim().is_empty() {
            return Err(ServiceError::Permanent("media service returned an empty asset handle".into()));
        }
        debug!(asset = %response.asset, "asset generated");
        Ok(JobOutput::Asset {
            handle: response.asset,
        })
    }
}
