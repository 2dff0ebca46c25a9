//! The `ContentJob` record: one unit of work sent to a generation service.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::request::JobOutput;

/// What a job produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    /// The day's story and its choices.
    Narrative,
    /// One character's reaction.
    NpcReaction,
    /// A still image for the outcome.
    Image,
    /// A short video for the outcome.
    Video,
    /// A 3D model for the outcome.
    #[serde(rename = "3d")]
    Model3d,
    /// Voice narration for the outcome.
    Voice,
    /// A hint for tomorrow's episode.
    Teaser,
}

impl JobKind {
    /// The media kinds, in publication order.
    pub const MEDIA: [JobKind; 4] = [Self::Image, Self::Video, Self::Model3d, Self::Voice];

    /// Whether this kind is produced by the media service.
    #[must_use]
    pub fn is_media(self) -> bool {
        Self::MEDIA.contains(&self)
    }

    /// Stable name used in logs, URLs and payloads.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Narrative => "narrative",
            Self::NpcReaction => "npc_reaction",
            Self::Image => "image",
            Self::Video => "video",
            Self::Model3d => "3d",
            Self::Voice => "voice",
            Self::Teaser => "teaser",
        }
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Created, not yet started.
    Pending,
    /// An attempt is in flight.
    Running,
    /// The service produced an output.
    Succeeded,
    /// Permanent error, or transient errors exhausted the attempts.
    Failed,
    /// The job's deadline passed.
    TimedOut,
    /// The episode was aborted; any late result was discarded.
    Cancelled,
}

impl JobStatus {
    /// Whether the job has reached a final status.
    #[must_use]
    pub fn is_final(self) -> bool {
        !matches!(self, Self::Pending | Self::Running)
    }
}

/// The outcome of one dispatched job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentJob {
    /// Job identifier.
    pub id: Uuid,
    /// The episode the job belongs to.
    pub episode_id: Uuid,
    /// What the job produces.
    pub kind: JobKind,
    /// Current status.
    pub status: JobStatus,
    /// Attempts made after the first.
    pub retry_count: u32,
    /// The produced output, on success.
    pub result: Option<JobOutput>,
    /// Failure detail, when not successful.
    pub error: Option<String>,
}

impl ContentJob {
    /// A job that has not started.
    #[must_use]
    pub fn pending(id: Uuid, episode_id: Uuid, kind: JobKind) -> Self {
        Self {
            id,
            episode_id,
            kind,
            status: JobStatus::Pending,
            retry_count: 0,
            result: None,
            error: None,
        }
    }

    /// Marks the job succeeded with `output`.
    #[must_use]
    pub fn succeeded(mut self, output: JobOutput, retry_count: u32) -> Self {
        self.status = JobStatus::Succeeded;
        self.retry_count = retry_count;
        self.result = Some(output);
        self.error = None;
        self
    }

    /// Marks the job as ending in `status` with `detail`.
    #[must_use]
    pub fn finished(mut self, status: JobStatus, retry_count: u32, detail: impl Into<String>) -> Self {
        self.status = status;
        self.retry_count = retry_count;
        self.result = None;
        self.error = Some(detail.into());
        self
    }

    /// Whether the job produced an output.
    #[must_use]
    pub fn is_succeeded(&self) -> bool {
        self.status == JobStatus::Succeeded
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_names_are_stable() {
        let names: Vec<&str> = JobKind::MEDIA.iter().map(|k| k.as_str()).collect();

        assert_eq!(names, vec!["image", "video", "3d", "voice"]);
        assert_eq!(
            serde_json::to_value(JobKind::Model3d).unwrap(),
            serde_json::json!("3d")
        );
        assert!(!JobKind::Teaser.is_media());
    }

    #[test]
    fn test_finished_job_clears_result_and_records_detail() {
        let job = ContentJob::pending(Uuid::new_v4(), Uuid::new_v4(), JobKind::Video)
            .finished(JobStatus::TimedOut, 1, "deadline passed");

        assert_eq!(job.status, JobStatus::TimedOut);
        assert!(job.status.is_final());
        assert_eq!(job.retry_count, 1);
        assert_eq!(job.error.as_deref(), Some("deadline passed"));
        assert!(!job.is_succeeded());
    }
}
