use std::fmt;
use std::time::Duration;

use async_trait::async_trait;

use crate::config::SendEmailsConfig;
use crate::error::AppResult;
use crate::jobs::types::{JobContext, JobSummary, JobTask};
use crate::services::EmailSender;

pub const JOB_NAME: &str = "SendEmails";

/// One delivery sweep of at most `max_retry_fetch_size` pending emails.
pub struct SendEmailsJob {
    config: SendEmailsConfig,
    sender: EmailSender,
}

impl SendEmailsJob {
    pub fn new(config: SendEmailsConfig, sender: EmailSender) -> Self {
        Self { config, sender }
    }
}

impl fmt::Debug for SendEmailsJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SendEmailsJob")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl JobTask for SendEmailsJob {
    fn name(&self) -> &str {
        JOB_NAME
    }

    fn lease_timeout(&self) -> Duration {
        Duration::from_secs(self.config.concurrency_timeout_secs)
    }

    async fn execute(&self, _ctx: &JobContext) -> AppResult<JobSummary> {
        let report = self.sender.send_pending(self.config.max_retry_fetch_size).await?;
        let failed = report.retrying + report.gave_up + report.errors;
        Ok(JobSummary::processed(report.sent)
            .with_failed(failed)
            .with_note(format!("{} fetched, {} gave up", report.fetched, report.gave_up)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Email;
    use crate::repositories::{EmailStore, MemoryStore};
    use crate::services::testing::ScriptedTransport;
    use crate::utils::{Clock, FakeClock};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_summary_counts_failures() {
        let clock = FakeClock::default();
        let store = Arc::new(MemoryStore::new());
        for n in 0..3 {
            let email = Email::new("from@gov", format!("u{n}@example.com"), "s", "b", clock.now());
            store.insert(&email).await.unwrap();
        }
        let transport = Arc::new(ScriptedTransport::new().then_reject(550));
        let config = SendEmailsConfig {
            enabled: true,
            ..SendEmailsConfig::default()
        };
        let sender = EmailSender::new(store.clone(), transport, Arc::new(clock.clone()), config.max_retries);
        let job = SendEmailsJob::new(config, sender);

        let summary = job
            .execute(&JobContext::new(JOB_NAME, Arc::new(clock)))
            .await
            .unwrap();

        assert_eq!(summary.processed, 2);
        assert_eq!(summary.failed, 1);
    }
}
