//! Command executor for dispatching CLI commands

use std::process::ExitCode;

use super::handlers::{
    ListCommandHandler, MigrateCommandHandler, RunCommandHandler, ServeCommandHandler,
};
use super::parser::{Cli, Commands};
use super::{init_logging, load_settings};
use crate::config::Environment;
use crate::config::settings::Settings;
use crate::error::AppResult;

/// Load configuration, start logging and run the selected command
pub async fn execute_command(cli: &Cli) -> anyhow::Result<ExitCode> {
    let (settings, environment) = load_settings(cli)?;
    init_logging(&settings)?;
    Ok(dispatch(cli, settings, environment).await?)
}

/// Run the selected command (`serve` when none is given)
pub async fn dispatch(cli: &Cli, settings: Settings, environment: Environment) -> AppResult<ExitCode> {
    match &cli.command {
        Some(Commands::Serve { dry_run }) => {
            ServeCommandHandler::new(settings, environment)
                .execute(*dry_run)
                .await?;
        }
        None => ServeCommandHandler::new(settings, environment).execute(false).await?,
        Some(Commands::Run { job }) => return RunCommandHandler::new(settings).execute(job).await,
        Some(Commands::List) => ListCommandHandler::new(settings).execute()?,
        Some(Commands::Migrate { dry_run, rollback }) => {
            MigrateCommandHandler::new(settings)
                .execute(*dry_run, *rollback)
                .await?;
        }
    }
    Ok(ExitCode::SUCCESS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    fn valid_config() -> Settings {
        let mut config = Settings::default();
        config.database.url = "postgres://localhost/test".to_string();
        config
    }

    #[tokio::test]
    async fn test_dispatch_serve_dry_run() {
        let cli = Cli::try_parse_from(["gateway-jobs", "serve", "--dry-run"]).unwrap();
        let code = dispatch(&cli, valid_config(), Environment::Test).await.unwrap();
        assert_eq!(code, ExitCode::SUCCESS);
    }

    #[tokio::test]
    async fn test_dispatch_list() {
        let cli = Cli::try_parse_from(["gateway-jobs", "list"]).unwrap();
        let code = dispatch(&cli, valid_config(), Environment::Test).await.unwrap();
        assert_eq!(code, ExitCode::SUCCESS);
    }

    #[tokio::test]
    async fn test_dispatch_zero_rollback_fails() {
        let cli = Cli {
            command: Some(Commands::Migrate {
                dry_run: false,
                rollback: Some(0),
            }),
            config: None,
            env: None,
            verbose: false,
            quiet: false,
        };
        assert!(dispatch(&cli, valid_config(), Environment::Test).await.is_err());
    }
}
