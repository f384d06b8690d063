use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::config::DeleteEmailsConfig;
use crate::error::{AppError, AppResult};
use crate::jobs::types::{JobContext, JobSummary, JobTask};
use crate::repositories::EmailStore;
use crate::utils::days_before;

pub const JOB_NAME: &str = "DeleteEmails";

/// Purges email rows older than the retention period, whatever their status.
pub struct DeleteEmailsJob {
    config: DeleteEmailsConfig,
    emails: Arc<dyn EmailStore>,
}

impl DeleteEmailsJob {
    pub fn new(config: DeleteEmailsConfig, emails: Arc<dyn EmailStore>) -> Self {
        Self { config, emails }
    }
}

impl fmt::Debug for DeleteEmailsJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeleteEmailsJob")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl JobTask for DeleteEmailsJob {
    fn name(&self) -> &str {
        JOB_NAME
    }

    fn lease_timeout(&self) -> Duration {
        Duration::from_secs(self.config.concurrency_timeout_secs)
    }

    async fn execute(&self, ctx: &JobContext) -> AppResult<JobSummary> {
        let cutoff = days_before(ctx.now(), self.config.delete_after_days).ok_or_else(|| {
            AppError::configuration("jobs.delete_emails", "delete_after_days is out of range")
        })?;
        let deleted = self
            .emails
            .delete_created_before(cutoff, self.config.delete_max_rows)
            .await?;
        tracing::info!(deleted, %cutoff, "Old emails removed");
        Ok(JobSummary::processed(deleted))
    }
}
