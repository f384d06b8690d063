//! Deletes profiles that have been closed for longer than the grace period.
//!
//! Per page: the profiles are deleted and farewell emails queued in one
//! commit, then each user is removed from the identity provider. A failed
//! identity-provider call is logged and never undoes the local delete.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::config::CloseAccountsConfig;
use crate::error::{AppError, AppResult};
use crate::jobs::batch::{BatchProcessor, PagedWork};
use crate::jobs::types::{JobContext, JobSummary, JobTask};
use crate::models::UserProfile;
use crate::repositories::{ChangeSet, ProfileFilter, ProfileStore, UnitOfWork};
use crate::services::{EmailQueueService, IdentityAdmin, Substitutions};
use crate::utils::hours_before;

pub const JOB_NAME: &str = "CloseAccounts";

pub struct CloseAccountsJob {
    config: CloseAccountsConfig,
    profiles: Arc<dyn ProfileStore>,
    unit_of_work: Arc<dyn UnitOfWork>,
    email_queue: EmailQueueService,
    identity: Arc<dyn IdentityAdmin>,
}

impl CloseAccountsJob {
    pub fn new(
        config: CloseAccountsConfig,
        profiles: Arc<dyn ProfileStore>,
        unit_of_work: Arc<dyn UnitOfWork>,
        email_queue: EmailQueueService,
        identity: Arc<dyn IdentityAdmin>,
    ) -> Self {
        Self {
            config,
            profiles,
            unit_of_work,
            email_queue,
            identity,
        }
    }
}

impl fmt::Debug for CloseAccountsJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CloseAccountsJob")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

struct ClosedProfiles<'a> {
    job: &'a CloseAccountsJob,
    cutoff: DateTime<Utc>,
}

#[async_trait]
impl PagedWork for ClosedProfiles<'_> {
    type Item = UserProfile;
    type Cursor = String;

    async fn fetch(&self, after: Option<&String>, limit: i64) -> AppResult<Vec<UserProfile>> {
        self.job
            .profiles
            .page(&ProfileFilter::ClosedBefore(self.cutoff), after.map(String::as_str), limit)
            .await
    }

    fn cursor(&self, profile: &UserProfile) -> String {
        profile.hdid.clone()
    }

    async fn process(&self, profile: &UserProfile, changes: &mut ChangeSet) -> AppResult<()> {
        changes.delete_profile(&profile.hdid);
        if let Some(email) = profile.email.as_deref().filter(|e| !e.trim().is_empty()) {
            self.job.email_queue.stage(
                changes,
                email,
                &self.job.config.email_template,
                &Substitutions::new(),
            )?;
        }
        Ok(())
    }

    async fn after_commit(&self, profiles: &[&UserProfile]) {
        for profile in profiles {
            let Some(user_id) = profile.identity_management_id else {
                tracing::warn!(hdid = %profile.hdid, "Closed profile has no identity provider id");
                continue;
            };
            if let Err(e) = self.job.identity.delete_user(user_id).await {
                tracing::error!(
                    hdid = %profile.hdid,
                    identity_id = %user_id,
                    error = %e,
                    "Error deleting user from identity provider"
                );
            }
        }
    }
}

#[async_trait]
impl JobTask for CloseAccountsJob {
    fn name(&self) -> &str {
        JOB_NAME
    }

    fn lease_timeout(&self) -> Duration {
        Duration::from_secs(self.config.concurrency_timeout_secs)
    }

    async fn execute(&self, ctx: &JobContext) -> AppResult<JobSummary> {
        let cutoff = hours_before(ctx.now(), self.config.hours_before_deletion).ok_or_else(|| {
            AppError::configuration("jobs.close_accounts", "hours_before_deletion is out of range")
        })?;
        tracing::info!(%cutoff, "Looking for accounts closed before cutoff");

        let report = BatchProcessor::new(self.unit_of_work.clone(), self.config.profiles_page_size)
            .with_cancellation(ctx.cancellation_token.clone())
            .run(&ClosedProfiles { job: self, cutoff })
            .await?;

        tracing::info!(
            removed = report.succeeded,
            failed = report.failed,
            pages = report.pages,
            page_size = self.config.profiles_page_size,
            "Closed accounts removed"
        );
        Ok(report.into())
    }
}
