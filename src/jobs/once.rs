//! Runs a task at most once successfully over the life of the system.
//!
//! Completion is recorded as an application setting written only after the
//! task body returns `Ok`. A failed body leaves no marker and runs again on
//! the next invocation, so bodies must be safe to repeat.

use std::future::Future;
use std::sync::Arc;

use crate::error::AppResult;
use crate::models::{ApplicationSetting, SettingKey};
use crate::repositories::SettingStore;
use crate::utils::Clock;

pub const ONE_TIME_COMPONENT: &str = "OneTimeTask";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOnceOutcome {
    /// Marker already present; the body was not called
    AlreadyCompleted,
    Completed,
}

#[derive(Clone)]
pub struct OneTimeRunner {
    settings: Arc<dyn SettingStore>,
    clock: Arc<dyn Clock>,
}

impl OneTimeRunner {
    pub fn new(settings: Arc<dyn SettingStore>, clock: Arc<dyn Clock>) -> Self {
        Self { settings, clock }
    }

    pub fn marker_key(task_id: &str) -> SettingKey {
        SettingKey::job(ONE_TIME_COMPONENT, task_id)
    }

    pub async fn is_completed(&self, task_id: &str) -> AppResult<bool> {
        Ok(self.settings.get(&Self::marker_key(task_id)).await?.is_some())
    }

    pub async fn run_once<F, Fut>(&self, task_id: &str, body: F) -> AppResult<RunOnceOutcome>
    where
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = AppResult<()>> + Send,
    {
        let key = Self::marker_key(task_id);
        if let Some(marker) = self.settings.get(&key).await? {
            tracing::info!(task = task_id, completed_at = %marker.value, "One-time task already completed");
            return Ok(RunOnceOutcome::AlreadyCompleted);
        }

        tracing::info!(task = task_id, "Running one-time task");
        body().await?;

        let now = self.clock.now();
        let marker = ApplicationSetting::new(&key, now.to_rfc3339(), now);
        if !self.settings.insert_if_absent(&marker).await? {
            // a run that slipped in through an expired lease finished first
            tracing::warn!(task = task_id, "Completion marker was written concurrently");
        }
        tracing::info!(task = task_id, "One-time task completed");
        Ok(RunOnceOutcome::Completed)
    }
}
