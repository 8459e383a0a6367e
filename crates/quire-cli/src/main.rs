//! Quire CLI - keep editor drafts persisted against a draft API

mod cli;
mod commands;
mod config_profiles;
mod error;
mod form_file;

#[cfg(test)]
mod tests;

use std::time::Duration;

use clap::Parser;
use tracing_subscriber::filter::Directive;
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Commands};
use crate::commands::common::resolve_settings;
use crate::error::CliError;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("Error: {error}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), CliError> {
    dotenvy::dotenv().ok();

    let directive = "quire=info"
        .parse::<Directive>()
        .map_err(|error| CliError::Config(format!("Invalid log directive: {error}")))?;
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(directive))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Save {
            form,
            on_conflict,
            json,
        } => {
            let settings = resolve_settings(&cli.globals)?;
            commands::save::run_save(&settings, &form, on_conflict, json).await
        }
        Commands::Watch { form, poll_ms } => {
            let settings = resolve_settings(&cli.globals)?;
            commands::watch::run_watch(&settings, &form, Duration::from_millis(poll_ms)).await
        }
        Commands::Status { json } => {
            let settings = resolve_settings(&cli.globals)?;
            commands::status::run_status(&settings, json)
        }
        Commands::Clear => {
            let settings = resolve_settings(&cli.globals)?;
            commands::clear::run_clear(&settings).await
        }
        Commands::Config { command } => {
            commands::config::run_config(command, cli.globals.profile.as_deref())
        }
    }
}
