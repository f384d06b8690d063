//! CLI argument parsing with clap
//!
//! This module defines the command-line interface structure using clap,
//! including all commands, arguments, and their documentation.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::build;

/// Recurring background jobs for the Health Gateway
#[derive(Parser, Debug)]
#[command(name = "gateway-jobs")]
#[command(about = "Recurring background jobs for the Health Gateway")]
#[command(long_about = "
gateway-jobs runs the Health Gateway's recurring batch jobs: account
closure, legal agreement notifications, beta feature assignment, cache and
email retention, outbound email delivery, one-time data fixes and drug
file imports. Each job runs on its own cron schedule and never overlaps
with itself, even across processes sharing a database.

EXAMPLES:
    # Schedule every enabled job and run until Ctrl-C
    gateway-jobs serve

    # Check configuration and print the job table
    gateway-jobs serve --dry-run

    # Run one job now
    gateway-jobs run CloseAccounts

    # Show every job with its state and schedule
    gateway-jobs list

    # Use a custom configuration file in production mode
    gateway-jobs --config /etc/gateway/jobs.toml --env production serve

    # Preview pending migrations
    gateway-jobs migrate --dry-run

    # Rollback last 2 migrations
    gateway-jobs migrate --rollback 2
")]
#[command(version = build::CLAP_LONG_VERSION)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Configuration file path
    ///
    /// Use a single TOML file instead of the layered files under config/.
    /// The file must exist and be readable.
    ///
    /// Example: --config /etc/gateway/jobs.toml
    #[arg(short, long, value_name = "FILE", value_parser = super::validation::validate_config_file_path)]
    pub config: Option<PathBuf>,

    /// Override environment detection
    ///
    /// Selects which {environment}.toml layer is loaded.
    ///
    /// Available values: development (dev), test, staging (stage), production (prod)
    #[arg(short, long, value_enum)]
    pub env: Option<Environment>,

    /// Enable verbose logging
    ///
    /// Increases log output to debug level. Cannot be used with --quiet.
    #[arg(short, long)]
    pub verbose: bool,

    /// Suppress non-error output
    ///
    /// Reduces log output to error level only. Cannot be used with --verbose.
    #[arg(short, long, conflicts_with = "verbose")]
    pub quiet: bool,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Schedule enabled jobs and run until shutdown (default)
    ///
    /// Applies migrations first when database.auto_migrate is set. On Ctrl-C
    /// or SIGTERM, running jobs stop after their current page.
    ///
    /// Examples:
    ///   gateway-jobs serve             # Start the scheduler
    ///   gateway-jobs serve --dry-run   # Validate config and list jobs
    Serve {
        /// Validate configuration and exit
        ///
        /// Prints every job with its state and schedule without connecting
        /// to the database. Returns exit code 0 if valid.
        #[arg(long)]
        dry_run: bool,
    },
    /// Run a single job immediately
    ///
    /// Exits non-zero when the run fails. A run skipped because the job is
    /// disabled, misconfigured or already running exits zero.
    ///
    /// Example:
    ///   gateway-jobs run SendEmails
    Run {
        /// Job name (case-insensitive), as shown by `list`
        #[arg(value_name = "JOB", value_parser = super::validation::validate_job_name)]
        job: String,
    },
    /// List registered jobs with their state and schedule
    List,
    /// Database migration operations
    ///
    /// Examples:
    ///   gateway-jobs migrate                    # Apply all pending migrations
    ///   gateway-jobs migrate --dry-run          # Show pending migrations without applying
    ///   gateway-jobs migrate --rollback 3       # Rollback the last 3 migrations
    Migrate {
        /// Show pending migrations without applying
        #[arg(long, conflicts_with = "rollback")]
        dry_run: bool,

        /// Number of migrations to rollback
        ///
        /// Reverts the specified number of most recent migrations.
        /// Must be between 1 and 100. Cannot be used with --dry-run.
        #[arg(long, value_name = "STEPS", conflicts_with = "dry_run", value_parser = super::validation::validate_rollback_steps)]
        rollback: Option<u32>,
    },
}

/// Environment options
#[derive(ValueEnum, Clone, Copy, Debug)]
pub enum Environment {
    #[value(name = "development", alias = "dev")]
    Development,
    #[value(name = "test")]
    Test,
    #[value(name = "staging", alias = "stage")]
    Staging,
    #[value(name = "production", alias = "prod")]
    Production,
}

impl Cli {
    /// Log level forced by --verbose or --quiet, if any
    pub fn log_level_override(&self) -> Option<&'static str> {
        if self.verbose {
            Some("debug")
        } else if self.quiet {
            Some("error")
        } else {
            None
        }
    }
}

impl From<Environment> for crate::config::Environment {
    fn from(env: Environment) -> Self {
        match env {
            Environment::Development => crate::config::Environment::Development,
            Environment::Test => crate::config::Environment::Test,
            Environment::Staging => crate::config::Environment::Staging,
            Environment::Production => crate::config::Environment::Production,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn verify_cli() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_version_flag() {
        let err = Cli::try_parse_from(["gateway-jobs", "--version"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::DisplayVersion);
    }

    #[test]
    fn test_default_behavior() {
        let cli = Cli::try_parse_from(["gateway-jobs"]).unwrap();
        assert!(cli.command.is_none());
        assert!(cli.config.is_none());
        assert!(cli.env.is_none());
        assert_eq!(cli.log_level_override(), None);
    }

    #[test]
    fn test_run_command() {
        let cli = Cli::try_parse_from(["gateway-jobs", "-v", "run", "CloseAccounts"]).unwrap();
        match cli.command {
            Some(Commands::Run { ref job }) => assert_eq!(job, "CloseAccounts"),
            ref other => panic!("Expected Run command, got {other:?}"),
        }
        assert_eq!(cli.log_level_override(), Some("debug"));
    }

    #[test]
    fn test_run_requires_job() {
        let err = Cli::try_parse_from(["gateway-jobs", "run"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::MissingRequiredArgument);
    }

    #[test]
    fn test_serve_dry_run_and_env_alias() {
        let cli = Cli::try_parse_from(["gateway-jobs", "--env", "prod", "serve", "--dry-run"]).unwrap();
        assert!(matches!(cli.command, Some(Commands::Serve { dry_run: true })));
        assert!(matches!(cli.env, Some(Environment::Production)));
    }

    #[test]
    fn test_migrate_command() {
        let cli = Cli::try_parse_from(["gateway-jobs", "migrate", "--rollback", "2"]).unwrap();
        assert!(matches!(
            cli.command,
            Some(Commands::Migrate {
                dry_run: false,
                rollback: Some(2)
            })
        ));
    }

    #[test]
    fn test_migrate_flags_conflict() {
        let err = Cli::try_parse_from(["gateway-jobs", "migrate", "--dry-run", "--rollback", "1"])
            .unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::ArgumentConflict);
    }

    #[test]
    fn test_conflicting_verbose_quiet() {
        let err = Cli::try_parse_from(["gateway-jobs", "--verbose", "--quiet"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::ArgumentConflict);
    }
}
