//! Backfills `year_of_birth` on profiles from the patient service.
//!
//! Populated profiles drop out of the filter, so a retry only revisits the
//! ones still missing a year.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Datelike;

use super::one_time::OneTimeTask;
use crate::error::{AppError, AppResult};
use crate::jobs::batch::{BatchProcessor, PagedWork};
use crate::jobs::types::JobContext;
use crate::models::UserProfile;
use crate::repositories::{ChangeSet, ProfileFilter, ProfileStore, UnitOfWork};
use crate::services::PatientLookup;

pub const TASK_ID: &str = "PopulateYearOfBirth";

pub struct PopulateYearOfBirth {
    profiles: Arc<dyn ProfileStore>,
    unit_of_work: Arc<dyn UnitOfWork>,
    patients: Arc<dyn PatientLookup>,
    batch_size: i64,
}

impl PopulateYearOfBirth {
    pub fn new(
        profiles: Arc<dyn ProfileStore>,
        unit_of_work: Arc<dyn UnitOfWork>,
        patients: Arc<dyn PatientLookup>,
        batch_size: i64,
    ) -> Self {
        Self {
            profiles,
            unit_of_work,
            patients,
            batch_size,
        }
    }
}

#[async_trait]
impl PagedWork for PopulateYearOfBirth {
    type Item = UserProfile;
    type Cursor = String;

    async fn fetch(&self, after: Option<&String>, limit: i64) -> AppResult<Vec<UserProfile>> {
        self.profiles
            .page(&ProfileFilter::MissingYearOfBirth, after.map(String::as_str), limit)
            .await
    }

    fn cursor(&self, profile: &UserProfile) -> String {
        profile.hdid.clone()
    }

    async fn process(&self, profile: &UserProfile, changes: &mut ChangeSet) -> AppResult<()> {
        match self.patients.birth_date(&profile.hdid).await? {
            Some(birth_date) => {
                let mut updated = profile.clone();
                updated.year_of_birth = Some(birth_date.year());
                changes.update_profile(updated);
            }
            None => tracing::debug!(hdid = %profile.hdid, "No birth date on file"),
        }
        Ok(())
    }
}

#[async_trait]
impl OneTimeTask for PopulateYearOfBirth {
    fn id(&self) -> &str {
        TASK_ID
    }

    async fn run(&self, ctx: &JobContext) -> AppResult<()> {
        let report = BatchProcessor::new(self.unit_of_work.clone(), self.batch_size)
            .with_cancellation(ctx.cancellation_token.clone())
            .run(self)
            .await?;

        tracing::info!(
            updated = report.succeeded,
            failed = report.failed,
            pages = report.pages,
            "Year of birth backfill pass finished"
        );

        if report.cancelled {
            return Err(AppError::Cancelled {
                operation: TASK_ID.to_string(),
            });
        }
        if report.failed > 0 {
            return Err(AppError::external(
                "patient",
                format!("{} birth date lookups failed", report.failed),
            ));
        }
        Ok(())
    }
}
