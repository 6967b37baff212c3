//! Storage seam for reconciliation.
//!
//! [`ActivityStore`] exposes the three primitives reconciliation needs:
//! bulk set-inactive, upsert by natural key, and delete-inactive-older-than.
//! [`PgActivityStore`] runs them inside one Postgres transaction;
//! [`MemoryActivityStore`] keeps rows in a map for dry-runs and tests.

use std::collections::{BTreeMap, HashSet};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use actsync_core::NormalizedActivity;

use crate::DbError;

/// What an upsert did to the stored row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Created,
    /// The row existed and its content changed.
    Updated,
    /// The row existed with identical content; only liveness was refreshed.
    Unchanged,
}

#[async_trait]
pub trait ActivityStore: Send {
    /// Marks every row of the provider inactive.
    ///
    /// Returns the external ids of the rows that were active beforehand.
    async fn deactivate_all(&mut self, provider_id: i64) -> Result<HashSet<String>, DbError>;

    /// Inserts or updates the row for `(provider_id, activity.external_id)`,
    /// leaving it active with `last_seen_at = seen_at`.
    async fn upsert(
        &mut self,
        provider_id: i64,
        activity: &NormalizedActivity,
        seen_at: DateTime<Utc>,
    ) -> Result<UpsertOutcome, DbError>;

    /// Hard-deletes inactive rows last seen before `cutoff`. Returns the count.
    async fn purge_inactive_before(
        &mut self,
        provider_id: i64,
        cutoff: DateTime<Utc>,
    ) -> Result<u64, DbError>;
}

// ---------------------------------------------------------------------------
// Postgres
// ---------------------------------------------------------------------------

/// An [`ActivityStore`] bound to one open transaction.
///
/// Nothing is visible to other connections until [`PgActivityStore::commit`];
/// dropping the store rolls everything back.
pub struct PgActivityStore {
    tx: Transaction<'static, Postgres>,
}

impl PgActivityStore {
    /// Begins a transaction on `pool`.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Sqlx`] if no connection can be acquired.
    pub async fn begin(pool: &PgPool) -> Result<Self, DbError> {
        Ok(Self {
            tx: pool.begin().await?,
        })
    }

    /// Takes the transaction-scoped advisory lock for `key`, waiting if
    /// another transaction holds it.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Sqlx`] if the lock query fails.
    pub async fn lock_xact(&mut self, key: i64) -> Result<(), DbError> {
        sqlx::query("SELECT pg_advisory_xact_lock($1)")
            .bind(key)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    /// # Errors
    ///
    /// Returns [`DbError::Sqlx`] if the commit fails.
    pub async fn commit(self) -> Result<(), DbError> {
        self.tx.commit().await?;
        Ok(())
    }
}

#[async_trait]
impl ActivityStore for PgActivityStore {
    async fn deactivate_all(&mut self, provider_id: i64) -> Result<HashSet<String>, DbError> {
        let ids: Vec<String> = sqlx::query_scalar(
            "UPDATE activities SET is_active = FALSE \
             WHERE provider_id = $1 AND is_active \
             RETURNING external_id",
        )
        .bind(provider_id)
        .fetch_all(&mut *self.tx)
        .await?;

        Ok(ids.into_iter().collect())
    }

    async fn upsert(
        &mut self,
        provider_id: i64,
        activity: &NormalizedActivity,
        seen_at: DateTime<Utc>,
    ) -> Result<UpsertOutcome, DbError> {
        let hash = activity.content_hash();

        // `prev` reads the pre-statement snapshot, so it still holds the old hash.
        let (is_new, previous_hash): (bool, Option<String>) = sqlx::query_as(
            "WITH prev AS ( \
                 SELECT content_hash FROM activities \
                 WHERE provider_id = $2 AND external_id = $3 \
             ) \
             INSERT INTO activities \
                 (public_id, provider_id, external_id, name, category, subcategory, \
                  cost_amount, age_min, age_max, schedule_days, start_time, end_time, \
                  date_start, date_end, location_name, registration_status, \
                  registration_url, content_hash, is_active, last_seen_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, \
                     $13, $14, $15, $16, $17, $18, TRUE, $19) \
             ON CONFLICT (provider_id, external_id) DO UPDATE SET \
                 name                = EXCLUDED.name, \
                 category            = EXCLUDED.category, \
                 subcategory         = EXCLUDED.subcategory, \
                 cost_amount         = EXCLUDED.cost_amount, \
                 age_min             = EXCLUDED.age_min, \
                 age_max             = EXCLUDED.age_max, \
                 schedule_days       = EXCLUDED.schedule_days, \
                 start_time          = EXCLUDED.start_time, \
                 end_time            = EXCLUDED.end_time, \
                 date_start          = EXCLUDED.date_start, \
                 date_end            = EXCLUDED.date_end, \
                 location_name       = EXCLUDED.location_name, \
                 registration_status = EXCLUDED.registration_status, \
                 registration_url    = EXCLUDED.registration_url, \
                 content_hash        = EXCLUDED.content_hash, \
                 is_active           = TRUE, \
                 last_seen_at        = EXCLUDED.last_seen_at, \
                 updated_at          = CASE \
                     WHEN activities.content_hash IS DISTINCT FROM EXCLUDED.content_hash \
                     THEN NOW() ELSE activities.updated_at END \
             RETURNING (xmax = 0) AS is_new, (SELECT content_hash FROM prev)",
        )
        .bind(Uuid::new_v4())
        .bind(provider_id)
        .bind(&activity.external_id)
        .bind(&activity.name)
        .bind(&activity.category)
        .bind(&activity.subcategory)
        .bind(activity.cost_amount)
        .bind(activity.age_min)
        .bind(activity.age_max)
        .bind(activity.schedule_days.to_codes())
        .bind(activity.start_time)
        .bind(activity.end_time)
        .bind(activity.date_start)
        .bind(activity.date_end)
        .bind(&activity.location_name)
        .bind(activity.registration_status.as_str())
        .bind(&activity.registration_url)
        .bind(&hash)
        .bind(seen_at)
        .fetch_one(&mut *self.tx)
        .await?;

        Ok(if is_new {
            UpsertOutcome::Created
        } else if previous_hash.as_deref() == Some(hash.as_str()) {
            UpsertOutcome::Unchanged
        } else {
            UpsertOutcome::Updated
        })
    }

    async fn purge_inactive_before(
        &mut self,
        provider_id: i64,
        cutoff: DateTime<Utc>,
    ) -> Result<u64, DbError> {
        let result = sqlx::query(
            "DELETE FROM activities \
             WHERE provider_id = $1 AND NOT is_active AND last_seen_at < $2",
        )
        .bind(provider_id)
        .bind(cutoff)
        .execute(&mut *self.tx)
        .await?;

        Ok(result.rows_affected())
    }
}

// ---------------------------------------------------------------------------
// In-memory
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryActivityRow {
    pub activity: NormalizedActivity,
    pub content_hash: String,
    pub is_active: bool,
    pub last_seen_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Map-backed [`ActivityStore`] keyed by `(provider_id, external_id)`.
///
/// Writes apply immediately; there is no rollback.
#[derive(Debug, Default, Clone)]
pub struct MemoryActivityStore {
    rows: BTreeMap<(i64, String), MemoryActivityRow>,
}

impl MemoryActivityStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a row directly, bypassing reconciliation.
    pub fn insert_row(
        &mut self,
        provider_id: i64,
        activity: NormalizedActivity,
        is_active: bool,
        last_seen_at: DateTime<Utc>,
    ) {
        let key = (provider_id, activity.external_id.clone());
        self.rows.insert(
            key,
            MemoryActivityRow {
                content_hash: activity.content_hash(),
                activity,
                is_active,
                last_seen_at,
                created_at: last_seen_at,
                updated_at: last_seen_at,
            },
        );
    }

    /// Restores a row exactly as it was stored elsewhere.
    pub fn insert_stored(&mut self, provider_id: i64, row: MemoryActivityRow) {
        self.rows
            .insert((provider_id, row.activity.external_id.clone()), row);
    }

    #[must_use]
    pub fn get(&self, provider_id: i64, external_id: &str) -> Option<&MemoryActivityRow> {
        self.rows.get(&(provider_id, external_id.to_owned()))
    }

    /// All rows of a provider, ordered by external id.
    pub fn rows(&self, provider_id: i64) -> impl Iterator<Item = &MemoryActivityRow> {
        self.rows
            .iter()
            .filter(move |((p, _), _)| *p == provider_id)
            .map(|(_, row)| row)
    }

    /// External ids of the provider's active rows, ordered.
    #[must_use]
    pub fn active_ids(&self, provider_id: i64) -> Vec<String> {
        self.rows(provider_id)
            .filter(|r| r.is_active)
            .map(|r| r.activity.external_id.clone())
            .collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[async_trait]
impl ActivityStore for MemoryActivityStore {
    async fn deactivate_all(&mut self, provider_id: i64) -> Result<HashSet<String>, DbError> {
        let mut previously_active = HashSet::new();
        for ((p, external_id), row) in &mut self.rows {
            if *p == provider_id && row.is_active {
                row.is_active = false;
                previously_active.insert(external_id.clone());
            }
        }
        Ok(previously_active)
    }

    async fn upsert(
        &mut self,
        provider_id: i64,
        activity: &NormalizedActivity,
        seen_at: DateTime<Utc>,
    ) -> Result<UpsertOutcome, DbError> {
        let hash = activity.content_hash();
        let key = (provider_id, activity.external_id.clone());

        let Some(row) = self.rows.get_mut(&key) else {
            self.insert_row(provider_id, activity.clone(), true, seen_at);
            return Ok(UpsertOutcome::Created);
        };

        row.is_active = true;
        row.last_seen_at = seen_at;
        if row.content_hash == hash {
            return Ok(UpsertOutcome::Unchanged);
        }
        row.activity = activity.clone();
        row.content_hash = hash;
        row.updated_at = seen_at;
        Ok(UpsertOutcome::Updated)
    }

    async fn purge_inactive_before(
        &mut self,
        provider_id: i64,
        cutoff: DateTime<Utc>,
    ) -> Result<u64, DbError> {
        let before = self.rows.len();
        self.rows
            .retain(|(p, _), row| *p != provider_id || row.is_active || row.last_seen_at >= cutoff);
        Ok(u64::try_from(before - self.rows.len()).unwrap_or(u64::MAX))
    }
}
