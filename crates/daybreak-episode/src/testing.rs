//! Recording publisher for tests in this and downstream crates.

use std::collections::HashSet;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::application::publisher::{
    FailureNotice, PublishError, Publisher, ResultNotice, VoteOpenNotice,
};

/// Which notification a `RecordingPublisher` should refuse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PublishStage {
    /// `publish_vote_open`.
    VoteOpen,
    /// `publish_result`.
    Result,
    /// `publish_failure`.
    Failure,
}

/// A `Publisher` that keeps every notice it accepts.
#[derive(Debug, Default)]
pub struct RecordingPublisher {
    vote_open: Mutex<Vec<VoteOpenNotice>>,
    results: Mutex<Vec<ResultNotice>>,
    failures: Mutex<Vec<FailureNotice>>,
    refused: Mutex<HashSet<PublishStage>>,
}

impl RecordingPublisher {
    /// A publisher that accepts everything.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A publisher that refuses notices of `stage`.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    #[must_use]
    pub fn refusing(stage: PublishStage) -> Self {
        let publisher = Self::default();
        publisher.refused.lock().unwrap().insert(stage);
        publisher
    }

    /// Vote announcements accepted so far.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    #[must_use]
    pub fn vote_open_notices(&self) -> Vec<VoteOpenNotice> {
        self.vote_open.lock().unwrap().clone()
    }

    /// Result announcements accepted so far.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    #[must_use]
    pub fn result_notices(&self) -> Vec<ResultNotice> {
        self.results.lock().unwrap().clone()
    }

    /// Failure announcements accepted so far.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    #[must_use]
    pub fn failure_notices(&self) -> Vec<FailureNotice> {
        self.failures.lock().unwrap().clone()
    }

    fn check(&self, stage: PublishStage) -> Result<(), PublishError> {
        if self.refused.lock().unwrap().contains(&stage) {
            return Err(PublishError(format!("{stage:?} refused")));
        }
        Ok(())
    }
}

#[async_trait]
impl Publisher for RecordingPublisher {
    async fn publish_vote_open(&self, notice: &VoteOpenNotice) -> Result<(), PublishError> {
        self.check(PublishStage::VoteOpen)?;
        self.vote_open.lock().unwrap().push(notice.clone());
        Ok(())
    }

    async fn publish_result(&self, notice: &ResultNotice) -> Result<(), PublishError> {
        self.check(PublishStage::Result)?;
        self.results.lock().unwrap().push(notice.clone());
        Ok(())
    }

    async fn publish_failure(&self, notice: &FailureNotice) -> Result<(), PublishError> {
        self.check(PublishStage::Failure)?;
        self.failures.lock().unwrap().push(notice.clone());
        Ok(())
    }
}
