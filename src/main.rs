use std::process::ExitCode;

use clap::Parser;
use gateway_jobs::cli::{Cli, execute_command};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match execute_command(&cli).await {
        Ok(code) => code,
        Err(e) => {
            tracing::error!(error = %format!("{e:#}"), "Command failed");
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}
