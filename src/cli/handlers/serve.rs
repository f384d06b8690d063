//! Serve command handler
//!
//! Schedules every ready job and runs until a shutdown signal arrives.

use std::sync::Arc;

use tokio::signal;

use super::list::ListCommandHandler;
use crate::config::Environment;
use crate::config::settings::Settings;
use crate::db::run_pending_migrations;
use crate::error::AppResult;
use crate::jobs::JobScheduler;
use crate::state::AppState;

/// Handler for the serve command
pub struct ServeCommandHandler {
    config: Settings,
    environment: Environment,
}

impl ServeCommandHandler {
    pub fn new(config: Settings, environment: Environment) -> Self {
        Self { config, environment }
    }

    /// Execute the serve command with optional dry-run support
    ///
    /// # Errors
    /// - Configuration validation errors
    /// - Database or scheduler startup errors (if not dry-run)
    pub async fn execute(&self, dry_run: bool) -> AppResult<()> {
        if dry_run {
            self.validate_only()
        } else {
            self.run().await
        }
    }

    /// Validate configuration and print the job table without connecting
    pub fn validate_only(&self) -> AppResult<()> {
        self.config.validate()?;
        println!("Configuration is valid ({})", self.environment);
        ListCommandHandler::new(self.config.clone()).execute()?;
        println!("Dry run completed successfully");
        Ok(())
    }

    async fn run(&self) -> AppResult<()> {
        tracing::info!(
            app_name = %self.config.application.name,
            app_version = %self.config.application.version,
            environment = %self.environment,
            "Application starting"
        );
        tracing::info!(
            max_connections = %self.config.database.max_connections,
            min_connections = %self.config.database.min_connections,
            connection_timeout = %self.config.database.connection_timeout,
            "Database configuration loaded"
        );

        if self.config.database.auto_migrate {
            let applied = run_pending_migrations(&self.config.database.url).await?;
            tracing::info!(applied = applied.len(), "Database migrations applied");
        }

        let state = AppState::build(&self.config).await?;
        let scheduler = JobScheduler::new(Arc::clone(&state.executor)).await?;
        let scheduled = scheduler.schedule_all().await?;
        scheduler.start().await?;
        tracing::info!(scheduled, "Scheduler started");

        shutdown_signal().await;

        scheduler.shutdown().await?;
        tracing::info!("Shutdown complete");
        Ok(())
    }
}

/// Waits for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}
