//! The `caravan` binary.
//!
//! Subcommands mirror the operator workflow: `import` accounts and spare
//! proxies, `generate` routes from a preset, `run` them (optionally only
//! the failed actions), and inspect progress with `status`.

mod accounts;
mod commands;

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};

use caravan_config::Settings;

#[derive(Debug, Parser)]
#[command(name = "caravan", version, about = "Route execution engine for account fleets")]
struct Cli {
    /// Settings file (defaults to ./caravan.toml when present).
    #[arg(long, global = true, env = "CARAVAN_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Load accounts and spare proxies from a TOML file into the store.
    Import {
        /// Accounts file.
        #[arg(long)]
        accounts: PathBuf,
    },

    /// Generate a route for every account that has none yet.
    Generate {
        /// Route preset file.
        #[arg(long)]
        preset: PathBuf,

        /// Delete all existing routes first.
        #[arg(long)]
        fresh: bool,
    },

    /// Run all eligible routes, flow by flow.
    Run {
        /// Re-execute only the failed actions of failed routes.
        #[arg(long)]
        rerun_failed: bool,
    },

    /// Show route counts by status and a page of routes.
    Status {
        /// Page number (1-based).
        #[arg(long, default_value_t = 1)]
        page: u32,

        /// Routes per page.
        #[arg(long, default_value_t = 20)]
        per_page: u32,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let settings = Settings::load(cli.config.as_deref()).context("loading settings")?;
    caravan_log::init(&settings.logging).context("installing logger")?;

    match cli.command {
        Command::Import { accounts } => commands::import(&settings, &accounts).await,
        Command::Generate { preset, fresh } => {
            commands::generate(&settings, &preset, fresh).await
        }
        Command::Run { rerun_failed } => commands::run(&settings, rerun_failed).await,
        Command::Status { page, per_page } => {
            commands::status(&settings, page, per_page).await
        }
    }
}
