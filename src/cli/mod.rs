//! CLI module for gateway-jobs
//!
//! This module provides command-line interface functionality including:
//! - Argument parsing with clap
//! - Configuration loading with CLI overrides
//! - Command handlers for serve, run, list and migrate

pub mod executor;
pub mod handlers;
pub mod parser;
pub mod validation;

pub use executor::{dispatch, execute_command};
pub use parser::{Cli, Commands, Environment};

use anyhow::Context;

use crate::config::{ConfigLoader, Environment as AppEnvironment, Settings};
use crate::logger::init_logger;

/// Load settings honoring `--config`, `--env`, `--verbose` and `--quiet`.
///
/// Returns the settings with the environment they were loaded for.
pub fn load_settings(cli: &Cli) -> anyhow::Result<(Settings, AppEnvironment)> {
    let mut loader = ConfigLoader::new()?;
    if let Some(path) = &cli.config {
        loader = loader.with_config_file(path);
    }
    if let Some(env) = cli.env {
        loader = loader.with_environment(env.into());
    }

    let environment = loader.environment();
    let mut settings = loader
        .load()
        .with_context(|| format!("Failed to load {} configuration", environment))?;
    if let Some(level) = cli.log_level_override() {
        settings.logger.level = level.to_string();
    }
    Ok((settings, environment))
}

/// Initialize the global logger from settings
pub fn init_logging(settings: &Settings) -> anyhow::Result<()> {
    let config = settings
        .logger
        .clone()
        .into_logger_config()
        .context("Logger configuration error")?;
    init_logger(config).context("Logger initialization error")?;
    Ok(())
}
