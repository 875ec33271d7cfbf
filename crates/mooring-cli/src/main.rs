//! Mooring CLI - offline-first records from the command line
//!
//! Every write lands locally first; `sync` reconciles with the remote.

mod cli;
mod commands;
mod config_profiles;
mod error;
#[cfg(test)]
mod tests;

use clap::Parser;

use crate::cli::{Cli, Commands};
use crate::commands::common::{open_core, resolve_db_path, Core};
use crate::commands::completions::run_completions;
use crate::commands::config::run_config;
use crate::commands::conflicts::run_conflicts;
use crate::commands::entity::{run_add, run_delete, run_list, run_show, run_update};
use crate::commands::log::run_log;
use crate::commands::queue::run_queue;
use crate::commands::sync::{run_bootstrap, run_pull, run_push, run_status, run_sync};
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

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("mooring=info".parse().map_err(|error| {
                    CliError::Config(format!("invalid log directive: {error}"))
                })?),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Completions { shell, output } => run_completions(shell, output.as_deref()),
        Commands::Config { command } => run_config(command, cli.profile.as_deref()),
        command => {
            let db_path = resolve_db_path(cli.db_path)?;
            let core = open_core(&db_path, cli.profile.as_deref(), cli.online).await?;
            let result = run_store_command(&core, command).await;
            core.close().await?;
            result
        }
    }
}

async fn run_store_command(core: &Core, command: Commands) -> Result<(), CliError> {
    match command {
        Commands::Add { kind, fields, id } => {
            run_add(core, kind, &fields, id.as_deref()).await.map(drop)
        }
        Commands::Update { kind, id, changes } => {
            run_update(core, kind, &id, &changes).await.map(drop)
        }
        Commands::Delete { kind, id } => run_delete(core, kind, &id).await,
        Commands::List { kind, limit, json } => run_list(core, kind, limit, json).await,
        Commands::Show {
            kind,
            id,
            history,
            json,
        } => run_show(core, kind, &id, history, json).await,
        Commands::Queue { command } => run_queue(core, command).await,
        Commands::Conflicts { command } => run_conflicts(core, command).await,
        Commands::Status { json } => run_status(core, json).await,
        Commands::Bootstrap => run_bootstrap(core).await,
        Commands::Pull { since } => run_pull(core, since.as_deref()).await,
        Commands::Push => run_push(core).await,
        Commands::Sync => run_sync(core).await,
        Commands::Log { limit, json } => run_log(core, limit, json).await,
        Commands::Completions { .. } | Commands::Config { .. } => Ok(()),
    }
}
