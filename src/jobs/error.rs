use thiserror::Error;
use tokio_cron_scheduler::JobSchedulerError;

/// Failures of the scheduling layer itself, as opposed to job runs
#[derive(Debug, Error)]
pub enum JobError {
    #[error("Unknown job: {0}")]
    NotFound(String),

    #[error("Job already registered: {0}")]
    AlreadyExists(String),

    #[error("Invalid schedule for {job}: {reason}")]
    InvalidSchedule { job: String, reason: String },

    #[error("Scheduler error: {0}")]
    Scheduler(#[from] JobSchedulerError),
}

pub type JobResult<T> = Result<T, JobError>;
