//! Runs every registered one-time task that has not completed yet.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::config::OneTimeConfig;
use crate::error::{AppError, AppResult};
use crate::jobs::once::{OneTimeRunner, RunOnceOutcome};
use crate::jobs::types::{JobContext, JobSummary, JobTask};

pub const JOB_NAME: &str = "OneTime";

/// A task that must succeed once and then never run again. Bodies may be
/// retried after a failure, so they must be safe to repeat.
#[async_trait]
pub trait OneTimeTask: Send + Sync {
    /// Stable identifier, used as the completion marker key
    fn id(&self) -> &str;

    async fn run(&self, ctx: &JobContext) -> AppResult<()>;
}

pub struct OneTimeJob {
    config: OneTimeConfig,
    runner: OneTimeRunner,
    tasks: Vec<Arc<dyn OneTimeTask>>,
}

impl OneTimeJob {
    pub fn new(config: OneTimeConfig, runner: OneTimeRunner) -> Self {
        Self {
            config,
            runner,
            tasks: Vec::new(),
        }
    }

    /// Tasks run in registration order.
    pub fn with_task(mut self, task: Arc<dyn OneTimeTask>) -> Self {
        self.tasks.push(task);
        self
    }
}

impl fmt::Debug for OneTimeJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ids: Vec<&str> = self.tasks.iter().map(|t| t.id()).collect();
        f.debug_struct("OneTimeJob")
            .field("config", &self.config)
            .field("tasks", &ids)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl JobTask for OneTimeJob {
    fn name(&self) -> &str {
        JOB_NAME
    }

    fn lease_timeout(&self) -> Duration {
        Duration::from_secs(self.config.concurrency_timeout_secs)
    }

    async fn execute(&self, ctx: &JobContext) -> AppResult<JobSummary> {
        let mut summary = JobSummary::default();
        let mut already_done = 0usize;
        let mut first_error: Option<AppError> = None;

        for task in &self.tasks {
            if ctx.is_cancelled() {
                summary.cancelled = true;
                break;
            }
            match self.runner.run_once(task.id(), || task.run(ctx)).await {
                Ok(RunOnceOutcome::Completed) => summary.processed += 1,
                Ok(RunOnceOutcome::AlreadyCompleted) => already_done += 1,
                Err(e) => {
                    tracing::error!(task = task.id(), error = %e, "One-time task failed, will retry next run");
                    summary.failed += 1;
                    first_error.get_or_insert(e);
                }
            }
        }

        let summary = summary.with_note(format!("{already_done} already completed"));
        match first_error {
            Some(e) => {
                tracing::warn!(%summary, "One-time tasks incomplete");
                Err(e)
            }
            None => Ok(summary),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repositories::MemoryStore;
    use crate::utils::FakeClock;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingTask {
        id: &'static str,
        calls: AtomicUsize,
        failures_left: AtomicUsize,
    }

    impl CountingTask {
        fn new(id: &'static str, failures: usize) -> Arc<Self> {
            Arc::new(Self {
                id,
                calls: AtomicUsize::new(0),
                failures_left: AtomicUsize::new(failures),
            })
        }
    }

    #[async_trait]
    impl OneTimeTask for CountingTask {
        fn id(&self) -> &str {
            self.id
        }

        async fn run(&self, _ctx: &JobContext) -> AppResult<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.failures_left.load(Ordering::SeqCst) > 0 {
                self.failures_left.fetch_sub(1, Ordering::SeqCst);
                return Err(AppError::external("patient", "unavailable"));
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_failing_task_does_not_block_others() {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(FakeClock::default());
        let flaky = CountingTask::new("Flaky", 1);
        let steady = CountingTask::new("Steady", 0);
        let job = OneTimeJob::new(OneTimeConfig::default(), OneTimeRunner::new(store.clone(), clock.clone()))
            .with_task(flaky.clone())
            .with_task(steady.clone());
        let ctx = JobContext::new(JOB_NAME, clock);

        let err = job.execute(&ctx).await.unwrap_err();
        assert!(err.is_transient());
        assert_eq!(steady.calls.load(Ordering::SeqCst), 1);

        let summary = job.execute(&ctx).await.unwrap();
        assert_eq!(summary.processed, 1);
        assert_eq!(summary.note.as_deref(), Some("1 already completed"));
        assert_eq!(flaky.calls.load(Ordering::SeqCst), 2);
        assert_eq!(steady.calls.load(Ordering::SeqCst), 1);

        let summary = job.execute(&ctx).await.unwrap();
        assert_eq!(summary.processed, 0);
        assert_eq!(flaky.calls.load(Ordering::SeqCst), 2);
    }
}
