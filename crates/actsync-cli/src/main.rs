mod collect;
mod db;
mod providers;
mod runs;
mod schedule;

use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use crate::collect::CollectArgs;
use crate::runs::RunsCommands;

#[derive(Debug, Parser)]
#[command(name = "actsync-cli")]
#[command(about = "Harvest and reconcile recreation-provider activity listings")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run one harvest-and-reconcile pass per provider
    Collect(CollectArgs),
    /// Inspect recorded scrape runs
    Runs {
        #[command(subcommand)]
        command: RunsCommands,
    },
    /// Inspect configured providers
    Providers {
        #[command(subcommand)]
        command: ProvidersCommands,
    },
    /// Database maintenance
    Db {
        #[command(subcommand)]
        command: DbCommands,
    },
    /// Run collections on a cron schedule until interrupted
    Schedule(ScheduleArgs),
}

#[derive(Debug, Subcommand)]
enum ProvidersCommands {
    /// List providers from the providers file
    List,
}

#[derive(Debug, Subcommand)]
enum DbCommands {
    /// Check database connectivity
    Ping,
    /// Apply pending migrations
    Migrate,
    /// Upsert providers from the providers file
    Seed,
}

#[derive(Debug, Args)]
struct ScheduleArgs {
    /// Six-field cron expression (sec min hour day month weekday), UTC
    #[arg(long)]
    cron: String,

    /// Restrict scheduled runs to one provider (by slug)
    #[arg(long, conflicts_with = "all", required_unless_present = "all")]
    provider: Option<String>,

    /// Run every active provider
    #[arg(long)]
    all: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    let Some(command) = cli.command else {
        println!("actsync-cli: run with --help to list commands");
        return Ok(ExitCode::SUCCESS);
    };

    let config = actsync_core::load_app_config()?;
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.log_level.clone()))?;
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let ok = match command {
        Commands::Collect(args) => collect::run_collect(&config, &args).await?,
        Commands::Runs { command } => {
            runs::run_runs(&config, command).await?;
            true
        }
        Commands::Providers {
            command: ProvidersCommands::List,
        } => {
            providers::list_providers(&config)?;
            true
        }
        Commands::Db { command } => {
            match command {
                DbCommands::Ping => db::ping(&config).await?,
                DbCommands::Migrate => db::migrate(&config).await?,
                DbCommands::Seed => db::seed(&config).await?,
            }
            true
        }
        Commands::Schedule(args) => {
            schedule::run_schedule(config, args.cron, args.provider).await?;
            true
        }
    };

    Ok(if ok {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
