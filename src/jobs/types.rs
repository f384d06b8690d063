use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::utils::Clock;

/// Job execution context passed to tasks
#[derive(Clone)]
pub struct JobContext {
    pub execution_id: Uuid,
    pub job_name: String,
    pub cancellation_token: CancellationToken,
    pub clock: Arc<dyn Clock>,
}

impl JobContext {
    pub fn new(job_name: impl Into<String>, clock: Arc<dyn Clock>) -> Self {
        Self {
            execution_id: Uuid::new_v4(),
            job_name: job_name.into(),
            cancellation_token: CancellationToken::new(),
            clock,
        }
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation_token = token;
        self
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation_token.is_cancelled()
    }
}

impl fmt::Debug for JobContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobContext")
            .field("execution_id", &self.execution_id)
            .field("job_name", &self.job_name)
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

/// What a finished run did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobSummary {
    pub processed: usize,
    pub failed: usize,
    /// Stopped early on a cancellation request
    pub cancelled: bool,
    pub note: Option<String>,
}

impl JobSummary {
    pub fn processed(processed: usize) -> Self {
        Self {
            processed,
            ..Self::default()
        }
    }

    pub fn with_failed(mut self, failed: usize) -> Self {
        self.failed = failed;
        self
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }
}

impl fmt::Display for JobSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "processed={} failed={}", self.processed, self.failed)?;
        if self.cancelled {
            write!(f, " (cancelled)")?;
        }
        if let Some(note) = &self.note {
            write!(f, ": {note}")?;
        }
        Ok(())
    }
}

/// Why a run did not start
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    Disabled,
    Misconfigured(String),
    AlreadyRunning,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::Disabled => write!(f, "disabled"),
            SkipReason::Misconfigured(reason) => write!(f, "misconfigured: {reason}"),
            SkipReason::AlreadyRunning => write!(f, "already running"),
        }
    }
}

/// Result of one job invocation, as seen by whoever triggered it
#[derive(Debug)]
pub enum JobOutcome {
    Completed(JobSummary),
    Skipped(SkipReason),
    /// A later run may succeed unchanged
    Transient(AppError),
    /// Needs a code or configuration change
    Fatal(AppError),
}

impl JobOutcome {
    /// Sorts a job-level error into `Transient` or `Fatal`.
    pub fn from_error(error: AppError) -> Self {
        if error.is_transient() {
            JobOutcome::Transient(error)
        } else {
            JobOutcome::Fatal(error)
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, JobOutcome::Transient(_) | JobOutcome::Fatal(_))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            JobOutcome::Completed(_) => "completed",
            JobOutcome::Skipped(_) => "skipped",
            JobOutcome::Transient(_) => "transient",
            JobOutcome::Fatal(_) => "fatal",
        }
    }
}

impl fmt::Display for JobOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobOutcome::Completed(summary) => write!(f, "completed, {summary}"),
            JobOutcome::Skipped(reason) => write!(f, "skipped, {reason}"),
            JobOutcome::Transient(error) => write!(f, "transient failure: {error:#}"),
            JobOutcome::Fatal(error) => write!(f, "fatal failure: {error:#}"),
        }
    }
}

/// Trait that all job tasks must implement
#[async_trait]
pub trait JobTask: Send + Sync + fmt::Debug {
    /// Stable job key, also used as the lease key
    fn name(&self) -> &str;

    /// How long a crashed run may block the next one
    fn lease_timeout(&self) -> Duration;

    async fn execute(&self, ctx: &JobContext) -> AppResult<JobSummary>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_classification() {
        let outcome = JobOutcome::from_error(AppError::external("keycloak", "down"));
        assert_eq!(outcome.kind(), "transient");
        assert!(outcome.is_failure());

        let outcome = JobOutcome::from_error(AppError::configuration("email", "no template"));
        assert_eq!(outcome.kind(), "fatal");

        assert!(!JobOutcome::Skipped(SkipReason::AlreadyRunning).is_failure());
    }

    #[test]
    fn test_summary_display() {
        let summary = JobSummary::processed(12).with_failed(1).with_note("3 pages");
        assert_eq!(summary.to_string(), "processed=12 failed=1: 3 pages");
    }
}
