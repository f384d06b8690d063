use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_cron_scheduler::{Job, JobScheduler as TokioCronScheduler};

use crate::jobs::error::{JobError, JobResult};
use crate::jobs::executor::JobExecutor;
use crate::jobs::registry::JobState;

/// Wrapper around tokio-cron-scheduler that fires registered jobs on their
/// cron schedules
pub struct JobScheduler {
    scheduler: Arc<Mutex<TokioCronScheduler>>,
    executor: Arc<JobExecutor>,
}

impl JobScheduler {
    pub async fn new(executor: Arc<JobExecutor>) -> JobResult<Self> {
        let scheduler = TokioCronScheduler::new().await?;

        Ok(Self {
            scheduler: Arc::new(Mutex::new(scheduler)),
            executor,
        })
    }

    /// Schedules every ready job that has a schedule. Returns how many
    /// were scheduled.
    pub async fn schedule_all(&self) -> JobResult<usize> {
        let mut scheduled = 0;
        for entry in self.executor.registry().entries() {
            let (JobState::Ready(_), Some(schedule)) = (&entry.state, entry.schedule.as_deref()) else {
                continue;
            };
            self.schedule_job(&entry.name, schedule).await?;
            tracing::info!(job = %entry.name, schedule, "Job scheduled");
            scheduled += 1;
        }
        Ok(scheduled)
    }

    /// Schedule a single job
    async fn schedule_job(&self, name: &str, schedule: &str) -> JobResult<()> {
        let executor = Arc::clone(&self.executor);
        let job_name = name.to_string();

        let cron_job = Job::new_async(schedule, move |_uuid, _lock| {
            let executor = Arc::clone(&executor);
            let job_name = job_name.clone();

            Box::pin(async move {
                match executor.run(&job_name).await {
                    Ok(outcome) => {
                        tracing::debug!(job = %job_name, outcome = outcome.kind(), "Scheduled run finished")
                    }
                    Err(e) => tracing::error!(job = %job_name, error = %e, "Scheduled run failed"),
                }
            })
        })
        .map_err(|e| JobError::InvalidSchedule {
            job: name.to_string(),
            reason: e.to_string(),
        })?;

        self.scheduler.lock().await.add(cron_job).await?;
        Ok(())
    }

    pub async fn start(&self) -> JobResult<()> {
        self.scheduler.lock().await.start().await?;
        Ok(())
    }

    /// Stops firing new runs, then lets running jobs stop after their
    /// current page.
    pub async fn shutdown(&self) -> JobResult<()> {
        self.scheduler.lock().await.shutdown().await?;
        self.executor.drain().await;
        Ok(())
    }
}
