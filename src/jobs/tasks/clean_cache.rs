use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::config::CleanCacheConfig;
use crate::error::AppResult;
use crate::jobs::types::{JobContext, JobSummary, JobTask};
use crate::repositories::CacheStore;

pub const JOB_NAME: &str = "CleanCache";

/// Evicts expired generic-cache rows, at most `delete_max_rows` per run.
pub struct CleanCacheJob {
    config: CleanCacheConfig,
    cache: Arc<dyn CacheStore>,
}

impl CleanCacheJob {
    pub fn new(config: CleanCacheConfig, cache: Arc<dyn CacheStore>) -> Self {
        Self { config, cache }
    }
}

impl fmt::Debug for CleanCacheJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CleanCacheJob")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl JobTask for CleanCacheJob {
    fn name(&self) -> &str {
        JOB_NAME
    }

    fn lease_timeout(&self) -> Duration {
        Duration::from_secs(self.config.concurrency_timeout_secs)
    }

    async fn execute(&self, ctx: &JobContext) -> AppResult<JobSummary> {
        let deleted = self
            .cache
            .delete_expired(ctx.now(), self.config.delete_max_rows)
            .await?;
        tracing::info!(deleted, max_rows = self.config.delete_max_rows, "Expired cache entries removed");
        Ok(JobSummary::processed(deleted))
    }
}
