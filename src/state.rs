//! Application state shared by the CLI commands.
//!
//! Owns the database pool and the executor built over every registered job.

use std::sync::Arc;

use crate::config::Settings;
use crate::db::{AsyncDbPool, establish_async_connection_pool};
use crate::error::AppResult;
use crate::jobs::{ConcurrencyGate, JobDependencies, JobExecutor, JobRegistry};
use crate::repositories::Repositories;
use crate::services::{HttpFileFetcher, KeycloakAdmin, NotifyTransport, PatientClient};
use crate::utils::{Clock, SystemClock};

/// Application state containing the pool and the job executor.
///
/// Cloning is cheap since every field is reference counted.
#[derive(Clone)]
pub struct AppState {
    pub db_pool: AsyncDbPool,
    pub executor: Arc<JobExecutor>,
}

impl AppState {
    /// Connects to the database and builds every job from `settings`.
    pub async fn build(settings: &Settings) -> AppResult<Self> {
        let pool = establish_async_connection_pool(&settings.database).await?;
        let repositories = Repositories::postgres(pool.clone());
        let executor = Self::executor(settings, repositories)?;
        Ok(Self {
            db_pool: pool,
            executor: Arc::new(executor),
        })
    }

    /// Builds the registry and executor over `repositories` with the live
    /// outbound clients.
    pub fn executor(settings: &Settings, repositories: Repositories) -> AppResult<JobExecutor> {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let deps = JobDependencies {
            clock: clock.clone(),
            transport: Arc::new(NotifyTransport::new(&settings.notify)?),
            identity: Arc::new(KeycloakAdmin::new(settings.identity.clone())?),
            patients: Arc::new(PatientClient::new(&settings.patient)?),
            fetcher: Arc::new(HttpFileFetcher::new()?),
            repositories,
        };

        let registry = JobRegistry::from_settings(settings, &deps)?;
        let gate = ConcurrencyGate::new(deps.repositories.leases.clone(), clock.clone());
        Ok(JobExecutor::new(Arc::new(registry), gate, clock))
    }
}
