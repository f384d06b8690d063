//! Recurring background jobs and the machinery that runs them.

pub mod batch;
pub mod error;
pub mod executor;
pub mod gate;
pub mod once;
pub mod registry;
pub mod scheduler;
pub mod tasks;
pub mod types;

pub use batch::{BatchProcessor, BatchReport, PagedWork};
pub use error::{JobError, JobResult};
pub use executor::JobExecutor;
pub use gate::ConcurrencyGate;
pub use once::{OneTimeRunner, RunOnceOutcome};
pub use registry::{JobDependencies, JobEntry, JobRegistry, JobState};
pub use scheduler::JobScheduler;
pub use types::{JobContext, JobOutcome, JobSummary, JobTask, SkipReason};
