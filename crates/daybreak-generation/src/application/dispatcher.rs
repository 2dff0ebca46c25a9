//! The generation dispatcher.
//!
//! Every job runs in its own tokio task. A job's retries, backoff sleeps and
//! timeout are local to that task; the caller joins the handles and always
//! receives one final `ContentJob` per request, in request order.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::task::{Context, Poll};

use daybreak_core::cancel::CancellationToken;
use daybreak_core::rng::DeterministicRng;
use tokio::task::JoinHandle;
use tracing::{Instrument, debug, info_span, warn};
use uuid::Uuid;

use super::retry::RetryPolicy;
use super::service::{GenerationService, ServiceRouter};
use crate::domain::job::{ContentJob, JobKind, JobStatus};
use crate::domain::request::{JobOutput, JobRequest};
use crate::error::ServiceError;

type SharedRng = Arc<Mutex<Box<dyn DeterministicRng>>>;

/// A dispatched job. Resolves to the job's final record.
#[derive(Debug)]
pub struct JobHandle {
    job_id: Uuid,
    episode_id: Uuid,
    kind: JobKind,
    task: JoinHandle<ContentJob>,
}

impl JobHandle {
    /// The dispatched job's id.
    #[must_use]
    pub fn job_id(&self) -> Uuid {
        self.job_id
    }

    /// The dispatched job's kind.
    #[must_use]
    pub fn kind(&self) -> JobKind {
        self.kind
    }
}

impl Future for JobHandle {
    type Output = ContentJob;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.task).poll(cx) {
            Poll::Ready(Ok(job)) => Poll::Ready(job),
            Poll::Ready(Err(e)) => Poll::Ready(
                ContentJob::pending(self.job_id, self.episode_id, self.kind).finished(
                    JobStatus::Failed,
                    0,
                    format!("job task ended abnormally: {e}"),
                ),
            ),
            Poll::Pending => Poll::Pending,
        }
    }
}

/// Fans jobs out to their services under a retry policy.
#[derive(Clone)]
pub struct Dispatcher {
    router: Arc<ServiceRouter>,
    retry: RetryPolicy,
    rng: SharedRng,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("router", &self.router)
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

impl Dispatcher {
    /// Creates a dispatcher. `rng` supplies backoff jitter.
    #[must_use]
    pub fn new(router: ServiceRouter, retry: RetryPolicy, rng: Box<dyn DeterministicRng>) -> Self {
        Self {
            router: Arc::new(router),
            retry,
            rng: Arc::new(Mutex::new(rng)),
        }
    }

    /// The retry policy in force.
    #[must_use]
    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    /// Starts every request in its own task. Jobs still outstanding when
    /// `cancel` fires resolve as `Cancelled`.
    #[must_use]
    pub fn dispatch(&self, requests: Vec<JobRequest>, cancel: &CancellationToken) -> Vec<JobHandle> {
        requests
            .into_iter()
            .map(|request| {
                let job_id = request.job_id;
                let episode_id = request.episode_id;
                let kind = request.kind();
                let span = info_span!("job", %job_id, %episode_id, %kind);
                let task = tokio::spawn(
                    run_job(
                        self.router.service_for(kind),
                        request,
                        self.retry,
                        self.rng.clone(),
                        cancel.clone(),
                    )
                    .instrument(span),
                );
                JobHandle {
                    job_id,
                    episode_id,
                    kind,
                    task,
                }
            })
            .collect()
    }

    /// Waits for every handle and returns the final records in handle order.
    pub async fn join(handles: Vec<JobHandle>) -> Vec<ContentJob> {
        futures::future::join_all(handles).await
    }

    /// Dispatches `requests` and joins them.
    pub async fn run_batch(&self, requests: Vec<JobRequest>, cancel: &CancellationToken) -> Vec<ContentJob> {
        Self::join(self.dispatch(requests, cancel)).await
    }
}

async fn run_job(
    service: Option<Arc<dyn GenerationService>>,
    request: JobRequest,
    retry: RetryPolicy,
    rng: SharedRng,
    cancel: CancellationToken,
) -> ContentJob {
    let job = ContentJob::pending(request.job_id, request.episode_id, request.kind());
    let Some(service) = service else {
        warn!("no service routed for job kind");
        return job.finished(
            JobStatus::Failed,
            0,
            format!("no service routed for {}", request.kind()),
        );
    };

    let attempts = AtomicU32::new(0);
    let outcome = tokio::select! {
        biased;
        () = cancel.cancelled() => None,
        result = tokio::time::timeout(
            request.timeout,
            attempt_until_settled(service.as_ref(), &request, &retry, &rng, &attempts),
        ) => Some(result),
    };
    let retry_count = attempts.load(Ordering::SeqCst).saturating_sub(1);

    match outcome {
        None => {
            debug!(retry_count, "job cancelled");
            job.finished(JobStatus::Cancelled, retry_count, "episode aborted")
        }
        Some(Err(_elapsed)) => {
            warn!(retry_count, timeout = ?request.timeout, "job timed out");
            job.finished(
                JobStatus::TimedOut,
                retry_count,
                format!("no result within {:?}", request.timeout),
            )
        }
        Some(Ok(Err(e))) => {
            warn!(retry_count, error = %e, "job failed");
            job.finished(JobStatus::Failed, retry_count, e.to_string())
        }
        Some(Ok(Ok(output))) => {
            debug!(retry_count, "job succeeded");
            job.succeeded(output, retry_count)
        }
    }
}

async fn attempt_until_settled(
    service: &dyn GenerationService,
    request: &JobRequest,
    retry: &RetryPolicy,
    rng: &SharedRng,
    attempts: &AtomicU32,
) -> Result<JobOutput, ServiceError> {
    let kind = request.kind();
    loop {
        let attempt = attempts.fetch_add(1, Ordering::SeqCst) + 1;
        debug!(attempt, "job attempt");

        let error = match service.generate(request).await {
            Ok(output) if output.fits(kind) => return Ok(output),
            Ok(_) => ServiceError::Permanent(format!("service returned the wrong output for {kind}")),
            Err(e) => e,
        };
        if !error.is_transient() || !retry.allows_retry_after(attempt) {
            return Err(error);
        }

        let delay = {
            let mut rng = rng.lock().unwrap_or_else(PoisonError::into_inner);
            retry.delay_after(attempt, &mut **rng)
        };
        warn!(attempt, ?delay, error = %error, "transient failure, backing off");
        tokio::time::sleep(delay).await;
    }
}
