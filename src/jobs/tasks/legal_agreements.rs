//! Emails active users when a newer legal agreement takes effect.
//!
//! A high-water mark in application settings records when the job last
//! checked. Users are notified only for an agreement that became effective
//! after the mark, and the mark only moves once every page has committed.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::config::LegalAgreementsConfig;
use crate::error::{AppError, AppResult};
use crate::jobs::batch::{BatchProcessor, PagedWork};
use crate::jobs::types::{JobContext, JobSummary, JobTask};
use crate::models::{ApplicationSetting, LegalAgreement, SettingKey, UserProfile};
use crate::repositories::{
    ChangeSet, LegalAgreementStore, ProfileFilter, ProfileStore, SettingStore, UnitOfWork,
};
use crate::services::{EmailQueueService, Substitutions};

pub const JOB_NAME: &str = "NotifyUpdatedLegalAgreements";

pub struct LegalAgreementNotifierJob {
    config: LegalAgreementsConfig,
    agreements: Arc<dyn LegalAgreementStore>,
    profiles: Arc<dyn ProfileStore>,
    settings: Arc<dyn SettingStore>,
    unit_of_work: Arc<dyn UnitOfWork>,
    email_queue: EmailQueueService,
}

impl LegalAgreementNotifierJob {
    pub fn new(
        config: LegalAgreementsConfig,
        agreements: Arc<dyn LegalAgreementStore>,
        profiles: Arc<dyn ProfileStore>,
        settings: Arc<dyn SettingStore>,
        unit_of_work: Arc<dyn UnitOfWork>,
        email_queue: EmailQueueService,
    ) -> Self {
        Self {
            config,
            agreements,
            profiles,
            settings,
            unit_of_work,
            email_queue,
        }
    }

    pub fn mark_key(agreement_type: &str) -> SettingKey {
        SettingKey::job(JOB_NAME, format!("{agreement_type}-LastCheck"))
    }

    async fn last_check(&self, key: &SettingKey, default: DateTime<Utc>) -> AppResult<DateTime<Utc>> {
        match self.settings.get(key).await? {
            Some(setting) => DateTime::parse_from_rfc3339(&setting.value)
                .map(|mark| mark.with_timezone(&Utc))
                .map_err(|e| AppError::Validation {
                    field: key.to_string(),
                    reason: format!("'{}' is not an RFC 3339 timestamp: {e}", setting.value),
                }),
            None => Ok(default),
        }
    }
}

impl fmt::Debug for LegalAgreementNotifierJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LegalAgreementNotifierJob")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

struct ProfilesToNotify<'a> {
    job: &'a LegalAgreementNotifierJob,
    agreement: &'a LegalAgreement,
    substitutions: Substitutions,
}

#[async_trait]
impl PagedWork for ProfilesToNotify<'_> {
    type Item = UserProfile;
    type Cursor = String;

    async fn fetch(&self, after: Option<&String>, limit: i64) -> AppResult<Vec<UserProfile>> {
        let filter = ProfileFilter::ReachableCreatedBefore(self.agreement.effective_date);
        self.job
            .profiles
            .page(&filter, after.map(String::as_str), limit)
            .await
    }

    fn cursor(&self, profile: &UserProfile) -> String {
        profile.hdid.clone()
    }

    async fn process(&self, profile: &UserProfile, changes: &mut ChangeSet) -> AppResult<()> {
        let Some(email) = profile.email.as_deref().filter(|e| !e.trim().is_empty()) else {
            return Ok(());
        };
        self.job.email_queue.stage(
            changes,
            email,
            &self.job.config.email_template,
            &self.substitutions,
        )?;
        Ok(())
    }
}

#[async_trait]
impl JobTask for LegalAgreementNotifierJob {
    fn name(&self) -> &str {
        JOB_NAME
    }

    fn lease_timeout(&self) -> Duration {
        Duration::from_secs(self.config.concurrency_timeout_secs)
    }

    async fn execute(&self, ctx: &JobContext) -> AppResult<JobSummary> {
        let started = ctx.now();
        let agreement_type = self.config.agreement_type.as_str();
        let key = Self::mark_key(agreement_type);
        let last_check = self.last_check(&key, started).await?;

        let summary = match self.agreements.latest_effective(agreement_type, started).await? {
            Some(agreement) if agreement.effective_date > last_check => {
                tracing::info!(
                    agreement_type,
                    effective_date = %agreement.effective_date,
                    %last_check,
                    "Agreement changed since last check, notifying users"
                );
                let work = ProfilesToNotify {
                    job: self,
                    agreement: &agreement,
                    substitutions: Substitutions::from([(
                        "effectiveDate".to_string(),
                        agreement.effective_date.format("%B %-d, %Y").to_string(),
                    )]),
                };
                let report = BatchProcessor::new(self.unit_of_work.clone(), self.config.profiles_page_size)
                    .with_cancellation(ctx.cancellation_token.clone())
                    .run(&work)
                    .await?;
                JobSummary::from(report)
            }
            Some(_) => JobSummary::default().with_note("no agreement change since last check"),
            None => JobSummary::default().with_note(format!("no {agreement_type} agreement in effect")),
        };

        if summary.cancelled {
            tracing::info!(%last_check, "Run cancelled, last check left unchanged");
        } else {
            self.settings
                .upsert(&ApplicationSetting::new(&key, started.to_rfc3339(), started))
                .await?;
        }
        Ok(summary)
    }
}
