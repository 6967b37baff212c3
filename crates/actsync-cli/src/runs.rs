//! `runs` subcommands: read-only views over `scrape_runs`.

use clap::Subcommand;

use actsync_core::AppConfig;
use actsync_db::ScrapeRunRow;

#[derive(Debug, Subcommand)]
pub enum RunsCommands {
    /// List recent runs, newest first
    List {
        /// Only runs of this provider (by slug)
        #[arg(long)]
        provider: Option<String>,

        #[arg(long, default_value_t = 20)]
        limit: i64,
    },
    /// Show one run in full
    Show {
        /// Run id as printed by `runs list`
        id: i64,

        /// Print the run row as JSON
        #[arg(long)]
        json: bool,
    },
}

pub(crate) async fn run_runs(config: &AppConfig, command: RunsCommands) -> anyhow::Result<()> {
    let pool = crate::db::connect(config).await?;
    match command {
        RunsCommands::List { provider, limit } => {
            let provider_id = match provider.as_deref() {
                Some(slug) => Some(
                    actsync_db::get_provider_by_slug(&pool, slug)
                        .await?
                        .ok_or_else(|| anyhow::anyhow!("provider '{slug}' not found"))?
                        .id,
                ),
                None => None,
            };
            let rows = actsync_db::list_scrape_runs(&pool, provider_id, limit).await?;
            if rows.is_empty() {
                println!("no runs recorded");
                return Ok(());
            }
            println!(
                "{:>6}  {:<9} {:>8} {:<10} {:>6} {:>7} {:>7} {:>7}  STARTED",
                "ID", "STATUS", "PROVIDER", "TRIGGER", "FOUND", "CREATED", "UPDATED", "REMOVED"
            );
            for row in &rows {
                println!("{}", summary_line(row));
            }
        }
        RunsCommands::Show { id, json } => {
            let row = actsync_db::get_scrape_run(&pool, id).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&row)?);
            } else {
                println!("{}", detail(&row));
            }
        }
    }
    Ok(())
}

pub(crate) fn summary_line(row: &ScrapeRunRow) -> String {
    let started = row
        .started_at
        .map_or_else(|| "-".to_string(), |t| t.format("%Y-%m-%d %H:%M").to_string());
    format!(
        "{:>6}  {:<9} {:>8} {:<10} {:>6} {:>7} {:>7} {:>7}  {started}",
        row.id,
        row.status,
        row.provider_id,
        row.trigger_source,
        row.activities_found,
        row.activities_created,
        row.activities_updated,
        row.activities_removed,
    )
}

pub(crate) fn detail(row: &ScrapeRunRow) -> String {
    let mut out = format!(
        "run {} ({})\n  provider:   {}\n  trigger:    {}\n  status:     {}\n",
        row.id, row.public_id, row.provider_id, row.trigger_source, row.status
    );
    if let Some(started) = row.started_at {
        out.push_str(&format!("  started:    {}\n", started.to_rfc3339()));
    }
    if let Some(completed) = row.completed_at {
        out.push_str(&format!("  completed:  {}\n", completed.to_rfc3339()));
    }
    if let Some(duration) = row.duration() {
        out.push_str(&format!("  duration:   {}s\n", duration.num_seconds()));
    }
    let c = row.counts();
    out.push_str(&format!(
        "  activities: found {} / created {} / updated {} / removed {} / purged {}\n",
        c.found, c.created, c.updated, c.removed, c.purged
    ));
    out.push_str(&format!(
        "  sections:   {} ok, {} failed; {} warning(s)\n",
        c.sections_succeeded, c.sections_failed, c.warnings
    ));
    if let Some(err) = &row.error_message {
        out.push_str(&format!("  error:      {err}\n"));
    }
    out
}
