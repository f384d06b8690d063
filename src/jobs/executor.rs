use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::Instrument;

use crate::error::AppError;
use crate::jobs::error::{JobError, JobResult};
use crate::jobs::gate::ConcurrencyGate;
use crate::jobs::registry::{JobRegistry, JobState};
use crate::jobs::types::{JobContext, JobOutcome, JobTask, SkipReason};
use crate::utils::Clock;

/// Runs registered jobs one invocation at a time.
///
/// Every run holds the job's lease for its whole duration, so two
/// processes sharing a database never execute the same job together.
pub struct JobExecutor {
    registry: Arc<JobRegistry>,
    gate: ConcurrencyGate,
    clock: Arc<dyn Clock>,
    shutdown: CancellationToken,
    tracker: TaskTracker,
}

impl JobExecutor {
    pub fn new(registry: Arc<JobRegistry>, gate: ConcurrencyGate, clock: Arc<dyn Clock>) -> Self {
        Self {
            registry,
            gate,
            clock,
            shutdown: CancellationToken::new(),
            tracker: TaskTracker::new(),
        }
    }

    pub fn registry(&self) -> &JobRegistry {
        &self.registry
    }

    /// Runs the job registered under `name`.
    pub async fn run(&self, name: &str) -> JobResult<JobOutcome> {
        let entry = self
            .registry
            .get(name)
            .ok_or_else(|| JobError::NotFound(name.to_string()))?;

        let outcome = match &entry.state {
            JobState::Ready(task) => self.execute(task.clone()).await,
            JobState::Disabled => JobOutcome::Skipped(SkipReason::Disabled),
            JobState::Misconfigured(reason) => {
                JobOutcome::Skipped(SkipReason::Misconfigured(reason.clone()))
            }
        };
        if let JobOutcome::Skipped(reason) = &outcome {
            tracing::info!(job = %entry.name, %reason, "Job skipped");
        }
        Ok(outcome)
    }

    /// Runs one task under its lease. Never panics: a panicking task is
    /// reported as a fatal outcome.
    pub async fn execute(&self, task: Arc<dyn JobTask>) -> JobOutcome {
        let ctx = JobContext::new(task.name(), self.clock.clone())
            .with_cancellation(self.shutdown.child_token());
        let span = tracing::info_span!("job", job = %task.name(), execution_id = %ctx.execution_id);

        self.tracker
            .track_future(self.execute_leased(task, ctx).instrument(span))
            .await
    }

    async fn execute_leased(&self, task: Arc<dyn JobTask>, ctx: JobContext) -> JobOutcome {
        let lease = match self.gate.try_acquire(task.name(), task.lease_timeout()).await {
            Ok(Some(lease)) => lease,
            Ok(None) => {
                tracing::info!("Previous run still holds the lease, skipping");
                return JobOutcome::Skipped(SkipReason::AlreadyRunning);
            }
            Err(e) => {
                tracing::error!(error = %e, "Could not acquire lease");
                return JobOutcome::from_error(e);
            }
        };

        tracing::info!("Job started");
        let started = Instant::now();
        let result = AssertUnwindSafe(task.execute(&ctx)).catch_unwind().await;

        if let Err(e) = self.gate.release(&lease).await {
            tracing::warn!(error = %e, expires_at = %lease.expires_at, "Could not release lease");
        }

        let outcome = match result {
            Ok(Ok(summary)) => JobOutcome::Completed(summary),
            Ok(Err(e)) => JobOutcome::from_error(e),
            Err(panic) => JobOutcome::Fatal(AppError::Internal {
                source: anyhow::anyhow!("job panicked: {}", panic_message(&*panic)),
            }),
        };

        let elapsed_ms = started.elapsed().as_millis() as u64;
        match &outcome {
            JobOutcome::Completed(summary) => {
                tracing::info!(elapsed_ms, %summary, "Job completed")
            }
            JobOutcome::Transient(e) => {
                tracing::warn!(elapsed_ms, error = %e, "Job failed, next run will retry")
            }
            JobOutcome::Fatal(e) => tracing::error!(elapsed_ms, error = %e, "Job failed"),
            JobOutcome::Skipped(_) => {}
        }
        outcome
    }

    /// Asks running batch loops to stop after their current page.
    pub fn cancel(&self) {
        self.shutdown.cancel();
    }

    /// Cancels running jobs and waits for them to finish.
    pub async fn drain(&self) {
        self.cancel();
        self.tracker.close();
        if !self.tracker.is_empty() {
            tracing::info!(running = self.tracker.len(), "Waiting for running jobs to stop");
        }
        self.tracker.wait().await;
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message
    } else {
        "unknown panic payload"
    }
}
