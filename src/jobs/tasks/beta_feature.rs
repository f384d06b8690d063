//! Grants a beta feature to active users who do not have it yet.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::config::BetaFeatureConfig;
use crate::error::AppResult;
use crate::jobs::batch::{BatchProcessor, PagedWork};
use crate::jobs::types::{JobContext, JobSummary, JobTask};
use crate::models::{BetaFeatureAccess, UserProfile};
use crate::repositories::{ChangeSet, ProfileFilter, ProfileStore, UnitOfWork};

pub const JOB_NAME: &str = "AssignBetaFeature";

pub struct BetaFeatureJob {
    config: BetaFeatureConfig,
    profiles: Arc<dyn ProfileStore>,
    unit_of_work: Arc<dyn UnitOfWork>,
}

impl BetaFeatureJob {
    pub fn new(
        config: BetaFeatureConfig,
        profiles: Arc<dyn ProfileStore>,
        unit_of_work: Arc<dyn UnitOfWork>,
    ) -> Self {
        Self {
            config,
            profiles,
            unit_of_work,
        }
    }
}

impl fmt::Debug for BetaFeatureJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BetaFeatureJob")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

struct ProfilesLackingFeature<'a> {
    job: &'a BetaFeatureJob,
    filter: ProfileFilter,
    now: DateTime<Utc>,
}

#[async_trait]
impl PagedWork for ProfilesLackingFeature<'_> {
    type Item = UserProfile;
    type Cursor = String;

    async fn fetch(&self, after: Option<&String>, limit: i64) -> AppResult<Vec<UserProfile>> {
        self.job
            .profiles
            .page(&self.filter, after.map(String::as_str), limit)
            .await
    }

    fn cursor(&self, profile: &UserProfile) -> String {
        profile.hdid.clone()
    }

    async fn process(&self, profile: &UserProfile, changes: &mut ChangeSet) -> AppResult<()> {
        changes.grant(BetaFeatureAccess {
            hdid: profile.hdid.clone(),
            feature: self.job.config.feature.clone(),
            created_at: self.now,
        });
        Ok(())
    }
}

#[async_trait]
impl JobTask for BetaFeatureJob {
    fn name(&self) -> &str {
        JOB_NAME
    }

    fn lease_timeout(&self) -> Duration {
        Duration::from_secs(self.config.concurrency_timeout_secs)
    }

    async fn execute(&self, ctx: &JobContext) -> AppResult<JobSummary> {
        let work = ProfilesLackingFeature {
            job: self,
            filter: ProfileFilter::LackingFeature(self.config.feature.clone()),
            now: ctx.now(),
        };

        let report = BatchProcessor::new(self.unit_of_work.clone(), self.config.max_batch_size)
            .with_max_items(self.config.user_count)
            .with_cancellation(ctx.cancellation_token.clone())
            .run(&work)
            .await?;

        tracing::info!(
            feature = %self.config.feature,
            granted = report.succeeded,
            pages = report.pages,
            "Beta feature assigned"
        );
        Ok(report.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repositories::MemoryStore;
    use crate::utils::{Clock, FakeClock};

    fn seed(store: &MemoryStore, count: usize) {
        let clock = FakeClock::default();
        for n in 0..count {
            store
                .insert_profile(UserProfile::new(format!("HDID{n:03}"), clock.now()))
                .unwrap();
        }
    }

    fn job(store: &Arc<MemoryStore>, max_batch_size: i64, user_count: i64) -> BetaFeatureJob {
        let config = BetaFeatureConfig {
            enabled: true,
            feature: "Salesforce".to_string(),
            max_batch_size,
            user_count,
            ..BetaFeatureConfig::default()
        };
        BetaFeatureJob::new(config, store.clone(), store.clone())
    }

    #[tokio::test]
    async fn test_user_count_limits_each_run() {
        let store = Arc::new(MemoryStore::new());
        seed(&store, 40);
        let job = job(&store, 10, 25);
        let ctx = JobContext::new(JOB_NAME, Arc::new(FakeClock::default()));

        let first = job.execute(&ctx).await.unwrap();
        assert_eq!(first.processed, 25);
        assert_eq!(store.beta_grant_count().unwrap(), 25);
        assert_eq!(store.commit_count().unwrap(), 3);

        let second = job.execute(&ctx).await.unwrap();
        assert_eq!(second.processed, 15);
        assert_eq!(store.beta_grant_count().unwrap(), 40);

        let third = job.execute(&ctx).await.unwrap();
        assert_eq!(third.processed, 0);
    }

    #[tokio::test]
    async fn test_closed_profiles_are_skipped() {
        let store = Arc::new(MemoryStore::new());
        seed(&store, 2);
        let mut closed = UserProfile::new("CLOSED", FakeClock::default().now());
        closed.closed_at = Some(FakeClock::default().now());
        store.insert_profile(closed).unwrap();
        let ctx = JobContext::new(JOB_NAME, Arc::new(FakeClock::default()));

        job(&store, 10, 100).execute(&ctx).await.unwrap();

        assert!(store.has_feature("HDID000", "Salesforce").unwrap());
        assert!(!store.has_feature("CLOSED", "Salesforce").unwrap());
    }
}
