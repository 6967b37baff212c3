//! Database operations for `scrape_runs`.
//!
//! Status transitions are guarded in SQL: an update that finds the run in
//! the wrong state affects zero rows and surfaces as
//! [`DbError::InvalidRunTransition`].

use actsync_core::{RunCounts, RunStatus, TriggerSource};
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::PgPool;
use uuid::Uuid;

use crate::DbError;

const RUN_COLUMNS: &str = "id, public_id, provider_id, trigger_source, status, started_at, \
     completed_at, activities_found, activities_created, activities_updated, \
     activities_removed, activities_purged, sections_succeeded, sections_failed, \
     warnings_count, error_message, created_at";

// ---------------------------------------------------------------------------
// Row type
// ---------------------------------------------------------------------------

/// A row from the `scrape_runs` table.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct ScrapeRunRow {
    pub id: i64,
    pub public_id: Uuid,
    pub provider_id: i64,
    pub trigger_source: String,
    pub status: String,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub activities_found: i32,
    pub activities_created: i32,
    pub activities_updated: i32,
    pub activities_removed: i32,
    pub activities_purged: i32,
    pub sections_succeeded: i32,
    pub sections_failed: i32,
    pub warnings_count: i32,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl ScrapeRunRow {
    /// The parsed status, or `None` if the column holds an unknown value.
    #[must_use]
    pub fn run_status(&self) -> Option<RunStatus> {
        self.status.parse().ok()
    }

    #[must_use]
    pub fn counts(&self) -> RunCounts {
        RunCounts {
            found: self.activities_found,
            created: self.activities_created,
            updated: self.activities_updated,
            removed: self.activities_removed,
            purged: self.activities_purged,
            sections_succeeded: self.sections_succeeded,
            sections_failed: self.sections_failed,
            warnings: self.warnings_count,
        }
    }

    /// Wall-clock duration, once the run has both started and finished.
    #[must_use]
    pub fn duration(&self) -> Option<chrono::Duration> {
        Some(self.completed_at? - self.started_at?)
    }
}

// ---------------------------------------------------------------------------
// Transitions
// ---------------------------------------------------------------------------

/// Creates a new run in `pending` status.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the insert fails.
pub async fn create_scrape_run(
    pool: &PgPool,
    provider_id: i64,
    trigger: TriggerSource,
) -> Result<ScrapeRunRow, DbError> {
    let row = sqlx::query_as::<_, ScrapeRunRow>(&format!(
        "INSERT INTO scrape_runs (public_id, provider_id, trigger_source, status) \
         VALUES ($1, $2, $3, 'pending') \
         RETURNING {RUN_COLUMNS}"
    ))
    .bind(Uuid::new_v4())
    .bind(provider_id)
    .bind(trigger.as_str())
    .fetch_one(pool)
    .await?;

    Ok(row)
}

/// Moves a run from `pending` to `running` and sets `started_at = NOW()`.
///
/// # Errors
///
/// Returns [`DbError::InvalidRunTransition`] if the run is not pending, or
/// [`DbError::Sqlx`] if the update fails.
pub async fn start_scrape_run(pool: &PgPool, id: i64) -> Result<(), DbError> {
    let result = sqlx::query(
        "UPDATE scrape_runs \
         SET status = 'running', started_at = NOW() \
         WHERE id = $1 AND status = 'pending'",
    )
    .bind(id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::InvalidRunTransition {
            id,
            expected_status: "pending",
        });
    }

    Ok(())
}

/// Moves a run from `running` to `completed`, recording its counts.
///
/// # Errors
///
/// Returns [`DbError::InvalidRunTransition`] if the run is not running, or
/// [`DbError::Sqlx`] if the update fails.
pub async fn complete_scrape_run(pool: &PgPool, id: i64, counts: &RunCounts) -> Result<(), DbError> {
    let result = sqlx::query(
        "UPDATE scrape_runs \
         SET status = 'completed', completed_at = NOW(), \
             activities_found = $2, activities_created = $3, activities_updated = $4, \
             activities_removed = $5, activities_purged = $6, \
             sections_succeeded = $7, sections_failed = $8, warnings_count = $9 \
         WHERE id = $1 AND status = 'running'",
    )
    .bind(id)
    .bind(counts.found)
    .bind(counts.created)
    .bind(counts.updated)
    .bind(counts.removed)
    .bind(counts.purged)
    .bind(counts.sections_succeeded)
    .bind(counts.sections_failed)
    .bind(counts.warnings)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::InvalidRunTransition {
            id,
            expected_status: "running",
        });
    }

    Ok(())
}

/// Moves a `pending` or `running` run to `failed` with `error_message`.
///
/// The section and warning counts gathered before the failure are kept so
/// the run still shows how far it got.
///
/// # Errors
///
/// Returns [`DbError::InvalidRunTransition`] if the run is already terminal,
/// or [`DbError::Sqlx`] if the update fails.
pub async fn fail_scrape_run(
    pool: &PgPool,
    id: i64,
    error_message: &str,
    counts: &RunCounts,
) -> Result<(), DbError> {
    let result = sqlx::query(
        "UPDATE scrape_runs \
         SET status = 'failed', completed_at = NOW(), error_message = $2, \
             activities_found = $3, sections_succeeded = $4, sections_failed = $5, \
             warnings_count = $6 \
         WHERE id = $1 AND status IN ('pending', 'running')",
    )
    .bind(id)
    .bind(error_message)
    .bind(counts.found)
    .bind(counts.sections_succeeded)
    .bind(counts.sections_failed)
    .bind(counts.warnings)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::InvalidRunTransition {
            id,
            expected_status: "pending or running",
        });
    }

    Ok(())
}

/// Fails every non-terminal run of a provider.
///
/// Only safe while holding the provider's run lock: a run left `pending` or
/// `running` then belongs to a process that exited without finalizing it.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the update fails.
pub async fn fail_abandoned_runs(pool: &PgPool, provider_id: i64) -> Result<u64, DbError> {
    let result = sqlx::query(
        "UPDATE scrape_runs \
         SET status = 'failed', completed_at = NOW(), \
             error_message = 'abandoned: the process running it exited before finalizing' \
         WHERE provider_id = $1 AND status IN ('pending', 'running')",
    )
    .bind(provider_id)
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}

// ---------------------------------------------------------------------------
// Queries
// ---------------------------------------------------------------------------

/// Fetches a single run by its internal `id`.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if no row exists with the given `id`, or
/// [`DbError::Sqlx`] if the query fails.
pub async fn get_scrape_run(pool: &PgPool, id: i64) -> Result<ScrapeRunRow, DbError> {
    sqlx::query_as::<_, ScrapeRunRow>(&format!(
        "SELECT {RUN_COLUMNS} FROM scrape_runs WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or(DbError::NotFound)
}

/// Returns the most recent `limit` runs, newest first, optionally for one
/// provider only.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_scrape_runs(
    pool: &PgPool,
    provider_id: Option<i64>,
    limit: i64,
) -> Result<Vec<ScrapeRunRow>, DbError> {
    let rows = sqlx::query_as::<_, ScrapeRunRow>(&format!(
        "SELECT {RUN_COLUMNS} FROM scrape_runs \
         WHERE ($1::BIGINT IS NULL OR provider_id = $1) \
         ORDER BY created_at DESC, id DESC \
         LIMIT $2"
    ))
    .bind(provider_id)
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// The newest run of a provider, if any.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn latest_scrape_run(
    pool: &PgPool,
    provider_id: i64,
) -> Result<Option<ScrapeRunRow>, DbError> {
    Ok(list_scrape_runs(pool, Some(provider_id), 1)
        .await?
        .into_iter()
        .next())
}
