//! `schedule` command: fire collections on a cron schedule until Ctrl-C.
//!
//! A tick that overlaps a still-running collection of the same provider is
//! rejected by the provider lock and recorded as a failed run.

use std::sync::Arc;

use anyhow::Context;
use tokio_cron_scheduler::{Job, JobScheduler};

use actsync_core::{AppConfig, TriggerSource};

use crate::collect::{run_providers, select_providers, session_factory};

/// Builds the scheduler, registers one collection job and blocks until
/// interrupted.
///
/// # Errors
///
/// Returns an error if the providers file is invalid, the provider filter
/// matches nothing, the database is unreachable, or the cron expression is
/// rejected.
pub(crate) async fn run_schedule(
    config: AppConfig,
    cron: String,
    provider: Option<String>,
) -> anyhow::Result<()> {
    let file = Arc::new(actsync_core::load_providers(&config.providers_path)?);
    // Fail fast on a bad slug instead of at the first tick.
    select_providers(&file, provider.as_deref())?;

    let pool = crate::db::connect(&config).await?;
    let factory = session_factory(&config);
    let config = Arc::new(config);

    let mut scheduler = JobScheduler::new().await?;
    let job = Job::new_async(cron.as_str(), move |_uuid, _lock| {
        let pool = pool.clone();
        let config = Arc::clone(&config);
        let file = Arc::clone(&file);
        let factory = Arc::clone(&factory);
        let provider = provider.clone();
        Box::pin(async move {
            let providers = match select_providers(&file, provider.as_deref()) {
                Ok(providers) => providers,
                Err(err) => {
                    tracing::error!(error = %format!("{err:#}"), "scheduled collection skipped");
                    return;
                }
            };
            tracing::info!(providers = providers.len(), "scheduled collection starting");
            let ok =
                run_providers(&pool, &config, &providers, factory, TriggerSource::Scheduler).await;
            tracing::info!(ok, "scheduled collection finished");
        })
    })
    .with_context(|| format!("invalid cron expression '{cron}'"))?;

    scheduler.add(job).await?;
    scheduler.start().await?;
    tracing::info!(%cron, "scheduler running; press Ctrl-C to stop");

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutting down scheduler");
    scheduler.shutdown().await?;
    Ok(())
}
