//! Cooperative cancellation.
//!
//! A `CancellationSource` is owned by whoever may abort work (the session
//! scheduler); `CancellationToken`s are handed to the work itself (episode
//! runner, dispatcher). Cancelling never forces anything to stop: holders
//! observe the signal at their own await points.

use tokio::sync::watch;

/// The owning side of a cancellation signal.
#[derive(Debug)]
pub struct CancellationSource {
    tx: watch::Sender<bool>,
}

impl CancellationSource {
    /// Creates a source that has not been cancelled.
    #[must_use]
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx }
    }

    /// Returns a token observing this source.
    #[must_use]
    pub fn token(&self) -> CancellationToken {
        CancellationToken {
            rx: Some(self.tx.subscribe()),
        }
    }

    /// Signals cancellation to every token. Idempotent.
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    /// Returns `true` once `cancel` has been called.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }
}

impl Default for CancellationSource {
    fn default() -> Self {
        Self::new()
    }
}

/// The observing side of a cancellation signal.
#[derive(Debug, Clone)]
pub struct CancellationToken {
    rx: Option<watch::Receiver<bool>>,
}

impl CancellationToken {
    /// A token that is never cancelled.
    #[must_use]
    pub fn never() -> Self {
        Self { rx: None }
    }

    /// Returns `true` if the source has been cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.rx.as_ref().is_some_and(|rx| *rx.borrow())
    }

    /// Resolves once the source is cancelled. Pends forever for `never()`
    /// tokens and for sources dropped without cancelling.
    pub async fn cancelled(&self) {
        let Some(rx) = &self.rx else {
            return std::future::pending().await;
        };
        let mut rx = rx.clone();
        if rx.wait_for(|cancelled| *cancelled).await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn test_token_observes_cancel() {
        // Arrange
        let source = CancellationSource::new();
        let token = source.token();
        assert!(!token.is_cancelled());

        // Act
        source.cancel();

        // Assert
        assert!(token.is_cancelled());
        token.cancelled().await;
    }

    #[tokio::test]
    async fn test_token_created_after_cancel_is_cancelled() {
        let source = CancellationSource::new();
        source.cancel();
        assert!(source.token().is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn test_never_token_does_not_resolve() {
        let token = CancellationToken::never();
        let waited = tokio::time::timeout(Duration::from_secs(5), token.cancelled()).await;
        assert!(waited.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_source_does_not_cancel() {
        let source = CancellationSource::new();
        let token = source.token();
        drop(source);
        let waited = tokio::time::timeout(Duration::from_secs(5), token.cancelled()).await;
        assert!(waited.is_err());
        assert!(!token.is_cancelled());
    }
}
