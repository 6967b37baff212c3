//! One provider run: lock, track, harvest, reconcile, finalize.

use std::fmt;
use std::sync::Arc;

use anyhow::Context;
use sqlx::PgPool;

use actsync_core::{AppConfig, ProviderConfig, RunCounts, TriggerSource};
use actsync_db::{DbError, ProviderLock, ProviderRow};
use actsync_scraper::SessionFactory;

use super::pipeline::{assess, count, harvest, Plan};
use super::tracker::{record_rejected_run, JobTracker};
use super::RunAbortError;

/// Result of a completed provider run.
#[derive(Debug, Clone)]
pub(crate) struct RunSummary {
    pub slug: String,
    pub run_id: i64,
    pub plan: Plan,
    pub counts: RunCounts,
    pub duplicates: usize,
    pub dropped: usize,
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let c = &self.counts;
        write!(
            f,
            "{}: run {} completed: found {}, created {}, updated {}, removed {}, purged {} \
             (sections ok {}, failed {}; warnings {}; dropped {}; duplicates {})",
            self.slug,
            self.run_id,
            c.found,
            c.created,
            c.updated,
            c.removed,
            c.purged,
            c.sections_succeeded,
            c.sections_failed,
            c.warnings,
            self.dropped,
            self.duplicates,
        )?;
        if self.plan == Plan::SkipWrites {
            f.write_str(" [zero results, no writes]")?;
        }
        Ok(())
    }
}

/// Runs one provider end to end under its advisory lock.
///
/// # Errors
///
/// Returns an error if the provider is not seeded, another run holds the
/// lock, or the run failed. Every failure after the run row exists is
/// recorded on that row before returning.
pub(crate) async fn run_provider(
    pool: &PgPool,
    config: &AppConfig,
    provider: &ProviderConfig,
    factory: Arc<dyn SessionFactory>,
    trigger: TriggerSource,
) -> anyhow::Result<RunSummary> {
    let slug = provider.slug();
    let row = actsync_db::get_provider_by_slug(pool, &slug)
        .await?
        .with_context(|| format!("provider '{slug}' is not seeded; run `actsync-cli db seed`"))?;

    let lock = match ProviderLock::try_acquire(pool, row.id).await {
        Ok(lock) => lock,
        Err(DbError::LockHeld { .. }) => {
            let err = RunAbortError::LockHeld {
                provider: slug.clone(),
            };
            record_rejected_run(pool, row.id, trigger, &err.to_string()).await;
            return Err(err.into());
        }
        Err(err) => return Err(err.into()),
    };

    let result = run_locked(pool, config, provider, &row, factory, trigger).await;

    if let Err(err) = lock.release().await {
        tracing::warn!(provider = %slug, error = %err, "failed to release provider lock");
    }
    result
}

async fn run_locked(
    pool: &PgPool,
    config: &AppConfig,
    provider: &ProviderConfig,
    row: &ProviderRow,
    factory: Arc<dyn SessionFactory>,
    trigger: TriggerSource,
) -> anyhow::Result<RunSummary> {
    // Holding the lock means no other run of this provider is alive.
    let abandoned = actsync_db::fail_abandoned_runs(pool, row.id).await?;
    if abandoned > 0 {
        tracing::warn!(provider = %row.slug, abandoned, "marked abandoned runs as failed");
    }

    let tracker = JobTracker::start(pool, row.id, trigger).await?;
    let run_id = tracker.run_id();

    let harvested = harvest(config, provider, factory).await;

    let mut counts = harvested.counts();
    let plan = match assess(&harvested, config.zero_result_policy) {
        Ok(plan) => plan,
        Err(abort) => {
            let err = anyhow::Error::new(abort);
            tracker.finalize_failure(&err, &counts).await;
            return Err(err);
        }
    };

    match plan {
        Plan::Reconcile => {
            match actsync_db::reconcile_provider(
                pool,
                row.id,
                &harvested.activities,
                config.retention(),
            )
            .await
            {
                Ok(outcome) => {
                    counts.created = count(outcome.created);
                    counts.updated = count(outcome.updated);
                    counts.removed = count(outcome.removed);
                    counts.purged = count(outcome.purged);
                }
                Err(db_err) => {
                    let err = anyhow::Error::new(RunAbortError::Storage(db_err));
                    tracker.finalize_failure(&err, &counts).await;
                    return Err(err);
                }
            }
        }
        Plan::SkipWrites => {
            tracing::warn!(
                run_id,
                provider = %row.slug,
                sections = counts.sections_succeeded,
                "zero activities found; completing without writes"
            );
        }
    }

    tracker.finalize_success(&counts).await?;

    Ok(RunSummary {
        slug: row.slug.clone(),
        run_id,
        plan,
        counts,
        duplicates: harvested.duplicates,
        dropped: harvested.dropped,
    })
}

#[cfg(test)]
#[path = "runner_test.rs"]
mod tests;
