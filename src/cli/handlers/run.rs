//! Run command handler
//!
//! Invokes one job by name, outside any schedule, and reports its outcome.

use std::process::ExitCode;

use crate::config::settings::Settings;
use crate::error::AppResult;
use crate::jobs::{JobExecutor, JobOutcome};
use crate::state::AppState;

pub struct RunCommandHandler {
    config: Settings,
}

impl RunCommandHandler {
    pub fn new(config: Settings) -> Self {
        Self { config }
    }

    /// Runs `job` once. Ctrl-C cancels it between pages.
    pub async fn execute(&self, job: &str) -> AppResult<ExitCode> {
        let state = AppState::build(&self.config).await?;
        let executor = state.executor.clone();

        let run = execute_job(&executor, job);
        tokio::pin!(run);
        let outcome = tokio::select! {
            outcome = &mut run => outcome?,
            _ = tokio::signal::ctrl_c() => {
                tracing::info!(job, "Received Ctrl+C, stopping after the current page");
                executor.cancel();
                run.await?
            }
        };

        println!("{}: {}", job, outcome);
        Ok(exit_code(&outcome))
    }
}

async fn execute_job(executor: &JobExecutor, job: &str) -> AppResult<JobOutcome> {
    Ok(executor.run(job).await?)
}

/// Zero unless the run failed.
pub fn exit_code(outcome: &JobOutcome) -> ExitCode {
    match outcome {
        JobOutcome::Completed(_) | JobOutcome::Skipped(_) => ExitCode::SUCCESS,
        JobOutcome::Transient(_) => ExitCode::from(75),
        JobOutcome::Fatal(_) => ExitCode::FAILURE,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;
    use crate::jobs::{JobSummary, SkipReason};

    #[test]
    fn test_exit_codes() {
        assert_eq!(exit_code(&JobOutcome::Completed(JobSummary::processed(1))), ExitCode::SUCCESS);
        assert_eq!(exit_code(&JobOutcome::Skipped(SkipReason::AlreadyRunning)), ExitCode::SUCCESS);
        assert_eq!(
            exit_code(&JobOutcome::Transient(AppError::external("patient", "503"))),
            ExitCode::from(75)
        );
        assert_eq!(
            exit_code(&JobOutcome::Fatal(AppError::configuration("jobs", "bad"))),
            ExitCode::FAILURE
        );
    }
}
