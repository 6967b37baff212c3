//! Read access to the `activities` table.
//!
//! Writes go through [`crate::store::PgActivityStore`] inside a reconcile
//! transaction; nothing here mutates.

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;
use uuid::Uuid;

use actsync_core::{NormalizedActivity, WeekdaySet};

use crate::store::MemoryActivityRow;
use crate::DbError;

const ACTIVITY_COLUMNS: &str = "id, public_id, provider_id, external_id, name, category, \
     subcategory, cost_amount, age_min, age_max, schedule_days, start_time, end_time, \
     date_start, date_end, location_name, registration_status, registration_url, \
     content_hash, is_active, last_seen_at, created_at, updated_at";

/// A row from the `activities` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ActivityRow {
    pub id: i64,
    pub public_id: Uuid,
    pub provider_id: i64,
    pub external_id: String,
    pub name: String,
    pub category: Option<String>,
    pub subcategory: Option<String>,
    pub cost_amount: Option<Decimal>,
    pub age_min: Option<i32>,
    pub age_max: Option<i32>,
    /// Lowercase three-letter day codes, Monday first.
    pub schedule_days: Vec<String>,
    pub start_time: Option<NaiveTime>,
    pub end_time: Option<NaiveTime>,
    pub date_start: Option<NaiveDate>,
    pub date_end: Option<NaiveDate>,
    pub location_name: Option<String>,
    pub registration_status: String,
    pub registration_url: Option<String>,
    pub content_hash: String,
    pub is_active: bool,
    pub last_seen_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ActivityRow {
    /// Rebuilds the normalized activity this row was written from.
    ///
    /// An unrecognised status column reads back as `Unknown`.
    #[must_use]
    pub fn to_normalized(&self) -> NormalizedActivity {
        NormalizedActivity {
            external_id: self.external_id.clone(),
            name: self.name.clone(),
            category: self.category.clone(),
            subcategory: self.subcategory.clone(),
            cost_amount: self.cost_amount,
            age_min: self.age_min,
            age_max: self.age_max,
            schedule_days: WeekdaySet::from_codes(&self.schedule_days),
            start_time: self.start_time,
            end_time: self.end_time,
            date_start: self.date_start,
            date_end: self.date_end,
            location_name: self.location_name.clone(),
            registration_status: self.registration_status.parse().unwrap_or_default(),
            registration_url: self.registration_url.clone(),
        }
    }

    /// The row as a [`MemoryActivityRow`], keeping the stored content hash so
    /// an in-memory reconcile classifies updates the same way Postgres would.
    #[must_use]
    pub fn to_memory_row(&self) -> MemoryActivityRow {
        MemoryActivityRow {
            activity: self.to_normalized(),
            content_hash: self.content_hash.clone(),
            is_active: self.is_active,
            last_seen_at: self.last_seen_at,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

/// Returns every activity of a provider, active or not, ordered by external id.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_activities(pool: &PgPool, provider_id: i64) -> Result<Vec<ActivityRow>, DbError> {
    let rows = sqlx::query_as::<_, ActivityRow>(&format!(
        "SELECT {ACTIVITY_COLUMNS} FROM activities \
         WHERE provider_id = $1 \
         ORDER BY external_id"
    ))
    .bind(provider_id)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Returns the active activities of a provider ordered by external id.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_active_activities(
    pool: &PgPool,
    provider_id: i64,
) -> Result<Vec<ActivityRow>, DbError> {
    let rows = sqlx::query_as::<_, ActivityRow>(&format!(
        "SELECT {ACTIVITY_COLUMNS} FROM activities \
         WHERE provider_id = $1 AND is_active \
         ORDER BY external_id"
    ))
    .bind(provider_id)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Fetches one activity by its natural key, active or not.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn get_activity(
    pool: &PgPool,
    provider_id: i64,
    external_id: &str,
) -> Result<Option<ActivityRow>, DbError> {
    let row = sqlx::query_as::<_, ActivityRow>(&format!(
        "SELECT {ACTIVITY_COLUMNS} FROM activities \
         WHERE provider_id = $1 AND external_id = $2"
    ))
    .bind(provider_id)
    .bind(external_id)
    .fetch_optional(pool)
    .await?;

    Ok(row)
}

/// Returns `(active, inactive)` row counts for a provider.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn count_activities(pool: &PgPool, provider_id: i64) -> Result<(i64, i64), DbError> {
    let counts: (i64, i64) = sqlx::query_as(
        "SELECT COUNT(*) FILTER (WHERE is_active), COUNT(*) FILTER (WHERE NOT is_active) \
         FROM activities WHERE provider_id = $1",
    )
    .bind(provider_id)
    .fetch_one(pool)
    .await?;

    Ok(counts)
}
