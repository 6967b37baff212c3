//! Job Tracker: one `scrape_runs` row per provider run.

use actsync_core::{RunCounts, TriggerSource};
use actsync_db::DbError;
use sqlx::PgPool;

/// A run that has been created and moved to `running`.
///
/// Consumed by exactly one of [`JobTracker::finalize_success`] or
/// [`JobTracker::finalize_failure`]. A tracker that is dropped instead
/// leaves the row `running`; the next run of the provider fails it as
/// abandoned.
pub(crate) struct JobTracker<'p> {
    pool: &'p PgPool,
    run_id: i64,
}

impl<'p> JobTracker<'p> {
    /// Creates a `pending` run and moves it to `running`.
    pub(crate) async fn start(
        pool: &'p PgPool,
        provider_id: i64,
        trigger: TriggerSource,
    ) -> Result<Self, DbError> {
        let run = actsync_db::create_scrape_run(pool, provider_id, trigger).await?;
        if let Err(e) = actsync_db::start_scrape_run(pool, run.id).await {
            fail_run_best_effort(pool, run.id, &format!("{e:#}"), &RunCounts::default()).await;
            return Err(e);
        }
        tracing::info!(
            run_id = run.id,
            provider_id,
            trigger = trigger.as_str(),
            "scrape run started"
        );
        Ok(Self {
            pool,
            run_id: run.id,
        })
    }

    pub(crate) fn run_id(&self) -> i64 {
        self.run_id
    }

    /// Marks the run `completed` with `counts`.
    ///
    /// If that update fails the run is marked failed instead, best effort.
    pub(crate) async fn finalize_success(self, counts: &RunCounts) -> Result<(), DbError> {
        if let Err(err) = actsync_db::complete_scrape_run(self.pool, self.run_id, counts).await {
            fail_run_best_effort(self.pool, self.run_id, &format!("{err:#}"), counts).await;
            return Err(err);
        }
        tracing::info!(
            run_id = self.run_id,
            found = counts.found,
            created = counts.created,
            updated = counts.updated,
            removed = counts.removed,
            purged = counts.purged,
            "scrape run completed"
        );
        Ok(())
    }

    /// Marks the run `failed` with the full error chain.
    pub(crate) async fn finalize_failure(self, error: &anyhow::Error, counts: &RunCounts) {
        let message = format!("{error:#}");
        tracing::error!(run_id = self.run_id, error = %message, "scrape run failed");
        fail_run_best_effort(self.pool, self.run_id, &message, counts).await;
    }
}

/// Records a run that never got to start, e.g. because the provider lock
/// was held. Best effort.
pub(crate) async fn record_rejected_run(
    pool: &PgPool,
    provider_id: i64,
    trigger: TriggerSource,
    message: &str,
) {
    match actsync_db::create_scrape_run(pool, provider_id, trigger).await {
        Ok(run) => fail_run_best_effort(pool, run.id, message, &RunCounts::default()).await,
        Err(err) => tracing::error!(provider_id, error = %err, "failed to record rejected run"),
    }
}

async fn fail_run_best_effort(pool: &PgPool, run_id: i64, message: &str, counts: &RunCounts) {
    if let Err(mark_err) = actsync_db::fail_scrape_run(pool, run_id, message, counts).await {
        tracing::error!(
            run_id,
            error = %mark_err,
            "failed to mark scrape run as failed"
        );
    }
}
