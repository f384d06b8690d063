//! Turns broadcast email communications into one queued email per user.
//!
//! Each communication is walked page by page over active users with an
//! email address and no link to it yet. A page's emails and their links
//! commit together, so a rerun after a crash picks up where the last
//! committed page left off. A communication that fails is marked `Error`
//! and the run moves on to the next one.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::config::CommunicationEmailsConfig;
use crate::error::AppResult;
use crate::jobs::batch::{BatchProcessor, BatchReport, PagedWork};
use crate::jobs::types::{JobContext, JobSummary, JobTask};
use crate::models::{Communication, CommunicationEmail, CommunicationStatus, EmailFormat, UserProfile};
use crate::repositories::{ChangeSet, CommunicationStore, ProfileFilter, ProfileStore, UnitOfWork};
use crate::services::EmailQueueService;

pub const JOB_NAME: &str = "CreateCommunicationEmails";

pub struct CommunicationEmailsJob {
    config: CommunicationEmailsConfig,
    communications: Arc<dyn CommunicationStore>,
    profiles: Arc<dyn ProfileStore>,
    unit_of_work: Arc<dyn UnitOfWork>,
    email_queue: EmailQueueService,
}

impl CommunicationEmailsJob {
    pub fn new(
        config: CommunicationEmailsConfig,
        communications: Arc<dyn CommunicationStore>,
        profiles: Arc<dyn ProfileStore>,
        unit_of_work: Arc<dyn UnitOfWork>,
        email_queue: EmailQueueService,
    ) -> Self {
        Self {
            config,
            communications,
            profiles,
            unit_of_work,
            email_queue,
        }
    }

    async fn fan_out(&self, communication: &Communication, ctx: &JobContext) -> AppResult<BatchReport> {
        if communication.status != CommunicationStatus::Processing {
            self.communications
                .set_status(communication.id, CommunicationStatus::Processing, ctx.now())
                .await?;
        }

        let report = BatchProcessor::new(self.unit_of_work.clone(), self.config.max_fetch_size)
            .with_cancellation(ctx.cancellation_token.clone())
            .run(&Recipients {
                job: self,
                communication,
            })
            .await?;

        if !report.cancelled {
            self.communications
                .set_status(communication.id, CommunicationStatus::Processed, ctx.now())
                .await?;
        }
        Ok(report)
    }
}

impl fmt::Debug for CommunicationEmailsJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommunicationEmailsJob")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

struct Recipients<'a> {
    job: &'a CommunicationEmailsJob,
    communication: &'a Communication,
}

#[async_trait]
impl PagedWork for Recipients<'_> {
    type Item = UserProfile;
    type Cursor = String;

    async fn fetch(&self, after: Option<&String>, limit: i64) -> AppResult<Vec<UserProfile>> {
        let filter = ProfileFilter::AwaitingCommunication(self.communication.id);
        self.job
            .profiles
            .page(&filter, after.map(String::as_str), limit)
            .await
    }

    fn cursor(&self, profile: &UserProfile) -> String {
        profile.hdid.clone()
    }

    async fn process(&self, profile: &UserProfile, changes: &mut ChangeSet) -> AppResult<()> {
        let Some(to) = profile.email.as_deref() else {
            return Ok(());
        };
        let email = self
            .job
            .email_queue
            .message(to, &self.communication.subject, &self.communication.body)
            .with_format(EmailFormat::Html)
            .with_priority(self.communication.priority);

        changes.link_communication_email(CommunicationEmail {
            communication_id: self.communication.id,
            hdid: profile.hdid.clone(),
            email_id: email.id,
            created_at: email.created_at,
        });
        changes.queue_email(email);
        Ok(())
    }
}

#[async_trait]
impl JobTask for CommunicationEmailsJob {
    fn name(&self) -> &str {
        JOB_NAME
    }

    fn lease_timeout(&self) -> Duration {
        Duration::from_secs(self.config.concurrency_timeout_secs)
    }

    async fn execute(&self, ctx: &JobContext) -> AppResult<JobSummary> {
        let communications = self.communications.pending_email(ctx.now()).await?;
        if communications.is_empty() {
            return Ok(JobSummary::default().with_note("no communications to send"));
        }
        tracing::info!(count = communications.len(), "Found communications to process");

        let mut summary = JobSummary::default();
        let mut queued = 0;
        for communication in &communications {
            if ctx.is_cancelled() {
                summary.cancelled = true;
                break;
            }

            match self.fan_out(communication, ctx).await {
                Ok(report) => {
                    queued += report.succeeded;
                    if report.cancelled {
                        tracing::info!(communication_id = %communication.id, "Cancelled, left in processing");
                        summary.cancelled = true;
                        break;
                    }
                    summary.processed += 1;
                    tracing::info!(
                        communication_id = %communication.id,
                        emails = report.succeeded,
                        pages = report.pages,
                        "Communication processed"
                    );
                }
                Err(e) => {
                    summary.failed += 1;
                    tracing::warn!(
                        communication_id = %communication.id,
                        error = %e,
                        "Error creating emails for communication, skipping"
                    );
                    if let Err(e) = self
                        .communications
                        .set_status(communication.id, CommunicationStatus::Error, ctx.now())
                        .await
                    {
                        tracing::warn!(
                            communication_id = %communication.id,
                            error = %e,
                            "Could not mark communication as failed"
                        );
                    }
                }
            }
        }

        Ok(summary.with_note(format!("{queued} email(s) queued")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EmailConfig;
    use crate::error::AppError;
    use crate::models::{Email, EmailPriority, EmailStatus};
    use crate::repositories::MemoryStore;
    use crate::utils::{Clock, FakeClock};
    use chrono::{DateTime, Utc};
    use tokio_util::sync::CancellationToken;
    use uuid::Uuid;

    /// Fails the `Processing` transition for one communication.
    struct BrokenCommunication {
        store: Arc<MemoryStore>,
        broken: Uuid,
    }

    #[async_trait]
    impl CommunicationStore for BrokenCommunication {
        async fn pending_email(&self, now: DateTime<Utc>) -> AppResult<Vec<Communication>> {
            self.store.pending_email(now).await
        }

        async fn set_status(
            &self,
            id: Uuid,
            status: CommunicationStatus,
            now: DateTime<Utc>,
        ) -> AppResult<()> {
            if id == self.broken && status == CommunicationStatus::Processing {
                return Err(AppError::Database {
                    operation: "update communication".to_string(),
                    source: anyhow::anyhow!("deadlock detected"),
                });
            }
            self.store.set_status(id, status, now).await
        }
    }

    fn job_with(
        store: &Arc<MemoryStore>,
        communications: Arc<dyn CommunicationStore>,
        clock: &FakeClock,
    ) -> CommunicationEmailsJob {
        let config = CommunicationEmailsConfig {
            enabled: true,
            max_fetch_size: 2,
            ..CommunicationEmailsConfig::default()
        };
        let email = EmailConfig {
            from: "noreply@gov".to_string(),
            ..EmailConfig::default()
        };
        let queue = EmailQueueService::new(email, store.clone(), Arc::new(clock.clone()));
        CommunicationEmailsJob::new(config, communications, store.clone(), store.clone(), queue)
    }

    fn job(store: &Arc<MemoryStore>, clock: &FakeClock) -> CommunicationEmailsJob {
        job_with(store, store.clone(), clock)
    }

    fn seed_users(store: &MemoryStore, clock: &FakeClock) {
        for hdid in ["A", "B", "C", "D", "E"] {
            let mut profile = UserProfile::new(hdid, clock.now());
            profile.email = Some(format!("{hdid}@example.com"));
            store.insert_profile(profile).unwrap();
        }
        store.insert_profile(UserProfile::new("NOEMAIL", clock.now())).unwrap();
        let mut closed = UserProfile::new("CLOSED", clock.now());
        closed.email = Some("closed@example.com".to_string());
        closed.closed_at = Some(clock.now());
        store.insert_profile(closed).unwrap();
    }

    fn communication(clock: &FakeClock, subject: &str) -> Communication {
        Communication::email(
            subject,
            "<p>Scheduled maintenance</p>",
            clock.now() - chrono::Duration::hours(1),
            clock.now() + chrono::Duration::days(1),
        )
    }

    #[tokio::test]
    async fn test_queues_one_email_per_reachable_user() {
        let clock = FakeClock::default();
        let store = Arc::new(MemoryStore::new());
        seed_users(&store, &clock);
        let mut outage = communication(&clock, "Outage");
        outage.priority = EmailPriority::High;
        let outage_id = outage.id;
        store.insert_communication(outage).unwrap();
        let ctx = JobContext::new(JOB_NAME, Arc::new(clock.clone()));

        let summary = job(&store, &clock).execute(&ctx).await.unwrap();

        assert_eq!(summary.processed, 1);
        assert_eq!(summary.note.as_deref(), Some("5 email(s) queued"));
        assert_eq!(
            store.communication(outage_id).unwrap().unwrap().status,
            CommunicationStatus::Processed
        );

        let emails = store.emails().unwrap();
        assert_eq!(emails.len(), 5);
        assert!(emails.iter().all(|e| e.subject == "Outage"
            && e.format == EmailFormat::Html
            && e.priority == EmailPriority::High
            && e.status == EmailStatus::New
            && e.from_address == "noreply@gov"));
        assert_eq!(store.communication_emails().unwrap().len(), 5);
        // five users over pages of two
        assert_eq!(store.commit_count().unwrap(), 3);
    }

    #[tokio::test]
    async fn test_failing_communication_does_not_stop_the_others() {
        let clock = FakeClock::default();
        let store = Arc::new(MemoryStore::new());
        seed_users(&store, &clock);
        let broken = communication(&clock, "Broken");
        let healthy = Communication {
            effective_at: clock.now() - chrono::Duration::minutes(30),
            ..communication(&clock, "Healthy")
        };
        let (broken_id, healthy_id) = (broken.id, healthy.id);
        store.insert_communication(broken).unwrap();
        store.insert_communication(healthy).unwrap();
        let communications = Arc::new(BrokenCommunication {
            store: store.clone(),
            broken: broken_id,
        });
        let ctx = JobContext::new(JOB_NAME, Arc::new(clock.clone()));

        let summary = job_with(&store, communications, &clock)
            .execute(&ctx)
            .await
            .unwrap();

        assert_eq!(summary.processed, 1);
        assert_eq!(summary.failed, 1);
        assert_eq!(
            store.communication(broken_id).unwrap().unwrap().status,
            CommunicationStatus::Error
        );
        assert_eq!(
            store.communication(healthy_id).unwrap().unwrap().status,
            CommunicationStatus::Processed
        );
        let emails = store.emails().unwrap();
        assert_eq!(emails.len(), 5);
        assert!(emails.iter().all(|e| e.subject == "Healthy"));
    }

    #[tokio::test]
    async fn test_processing_communication_resumes_with_unreached_users() {
        let clock = FakeClock::default();
        let store = Arc::new(MemoryStore::new());
        seed_users(&store, &clock);
        let mut resumed = communication(&clock, "Resumed");
        resumed.status = CommunicationStatus::Processing;
        let resumed_id = resumed.id;
        store.insert_communication(resumed).unwrap();

        let mut earlier = ChangeSet::default();
        for hdid in ["A", "B"] {
            let email = Email::new("noreply@gov", format!("{hdid}@example.com"), "Resumed", "", clock.now());
            earlier.link_communication_email(CommunicationEmail {
                communication_id: resumed_id,
                hdid: hdid.to_string(),
                email_id: email.id,
                created_at: clock.now(),
            });
            earlier.queue_email(email);
        }
        store.commit(earlier).await.unwrap();
        let ctx = JobContext::new(JOB_NAME, Arc::new(clock.clone()));

        let summary = job(&store, &clock).execute(&ctx).await.unwrap();

        assert_eq!(summary.note.as_deref(), Some("3 email(s) queued"));
        let mut reached: Vec<String> = store
            .communication_emails()
            .unwrap()
            .into_iter()
            .map(|link| link.hdid)
            .collect();
        reached.sort();
        assert_eq!(reached, vec!["A", "B", "C", "D", "E"]);
        assert_eq!(store.emails().unwrap().len(), 5);
    }

    #[tokio::test]
    async fn test_cancelled_run_leaves_communication_processing() {
        let clock = FakeClock::default();
        let store = Arc::new(MemoryStore::new());
        seed_users(&store, &clock);
        let outage = communication(&clock, "Outage");
        let outage_id = outage.id;
        store.insert_communication(outage).unwrap();
        let token = CancellationToken::new();
        token.cancel();
        let ctx = JobContext::new(JOB_NAME, Arc::new(clock.clone())).with_cancellation(token);

        let summary = job(&store, &clock).execute(&ctx).await.unwrap();

        assert!(summary.cancelled);
        assert_eq!(
            store.communication(outage_id).unwrap().unwrap().status,
            CommunicationStatus::New
        );
        assert!(store.emails().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_expired_and_future_communications_are_ignored() {
        let clock = FakeClock::default();
        let store = Arc::new(MemoryStore::new());
        seed_users(&store, &clock);
        let expired = Communication::email(
            "Expired",
            "",
            clock.now() - chrono::Duration::days(3),
            clock.now() - chrono::Duration::days(1),
        );
        let future = Communication::email(
            "Future",
            "",
            clock.now() + chrono::Duration::days(1),
            clock.now() + chrono::Duration::days(3),
        );
        store.insert_communication(expired).unwrap();
        store.insert_communication(future).unwrap();
        let ctx = JobContext::new(JOB_NAME, Arc::new(clock.clone()));

        let summary = job(&store, &clock).execute(&ctx).await.unwrap();

        assert_eq!(summary.note.as_deref(), Some("no communications to send"));
        assert!(store.emails().unwrap().is_empty());
    }
}
