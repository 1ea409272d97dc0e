//! Inkpost CLI - write blog posts anywhere and sync them when you're back online
//!
//! Edits are queued locally first; a sync pass pushes them to the blog API
//! whenever it is reachable.

mod cli;
mod commands;
mod config_profiles;
mod connectivity;
mod error;


use clap::Parser;
use tracing_subscriber::filter::LevelFilter;

use crate::cli::{Cli, Commands};
use crate::commands::cache::{run_cached, run_preload, run_show};
use crate::commands::clear::run_clear;
use crate::commands::common::{open_app, resolve_db_path};
use crate::commands::completions::run_completions;
use crate::commands::config::run_config;
use crate::commands::drafts::{run_discard, run_drafts, run_retry};
use crate::commands::edit::{run_edit, run_new};
use crate::commands::status::run_status;
use crate::commands::sync::run_sync;
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

    let filter = match "inkpost=info".parse() {
        Ok(directive) => tracing_subscriber::EnvFilter::from_default_env().add_directive(directive),
        Err(_) => tracing_subscriber::EnvFilter::from_default_env()
            .add_directive(LevelFilter::INFO.into()),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let command = match cli.command {
        Commands::Config { command } => return run_config(command, cli.profile.as_deref()),
        Commands::Completions { shell, output } => {
            return run_completions(shell, output.as_deref());
        }
        command => command,
    };

    let db_path = resolve_db_path(cli.db_path)?;
    let app = open_app(&db_path, cli.profile.as_deref(), cli.offline).await?;
    let facade = &app.facade;

    match command {
        Commands::Status { json } => run_status(&app, json)?,
        Commands::Drafts { json } => run_drafts(facade, json)?,
        Commands::New { post } => run_new(facade, &post).await?,
        Commands::Edit { blog_id, post } => run_edit(facade, &blog_id, &post).await?,
        Commands::Retry { id } => run_retry(facade, &id).await?,
        Commands::Discard { id } => run_discard(facade, &id)?,
        Commands::Sync => run_sync(facade).await?,
        Commands::Preload { blog_ids } => run_preload(facade, &blog_ids).await?,
        Commands::Cached { json } => run_cached(facade, json)?,
        Commands::Show { blog_id, json } => run_show(facade, &blog_id, json).await?,
        Commands::Clear { yes } => run_clear(facade, yes)?,
        Commands::Config { .. } | Commands::Completions { .. } => {}
    }

    Ok(())
}
