//! Reconciliation of one provider's full per-run activity set against storage.
//!
//! Snapshot (everything inactive) → upsert every activity found → purge rows
//! inactive past the retention window. Run against a [`PgActivityStore`] the
//! three steps share one transaction, so readers see either the previous
//! state or the fully reconciled one.

use std::collections::HashSet;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use sqlx::PgPool;

use actsync_core::NormalizedActivity;

use crate::lock::lock_key;
use crate::store::{ActivityStore, PgActivityStore, UpsertOutcome};
use crate::DbError;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileOutcome {
    /// Distinct activities in the input set.
    pub found: u64,
    pub created: u64,
    pub updated: u64,
    pub unchanged: u64,
    /// Rows active before this run that were not seen in it.
    pub removed: u64,
    pub purged: u64,
}

/// Applies `activities` as the complete current set for `provider_id`.
///
/// Duplicate external ids in the input are skipped after the first. After a
/// successful return, a row of the provider is active exactly when its
/// external id is in `activities`.
///
/// # Errors
///
/// Returns [`DbError::EmptyActivitySet`] without touching the store when
/// `activities` is empty; an empty set never deactivates anything. Store
/// errors are propagated as-is.
pub async fn reconcile<S: ActivityStore + ?Sized>(
    store: &mut S,
    provider_id: i64,
    activities: &[NormalizedActivity],
    now: DateTime<Utc>,
    retention: Duration,
) -> Result<ReconcileOutcome, DbError> {
    if activities.is_empty() {
        return Err(DbError::EmptyActivitySet { provider_id });
    }

    let previously_active = store.deactivate_all(provider_id).await?;

    let mut outcome = ReconcileOutcome::default();
    let mut seen: HashSet<&str> = HashSet::with_capacity(activities.len());
    for activity in activities {
        if !seen.insert(activity.external_id.as_str()) {
            tracing::warn!(
                provider_id,
                external_id = %activity.external_id,
                "duplicate external id in reconcile input; keeping the first"
            );
            continue;
        }
        match store.upsert(provider_id, activity, now).await? {
            UpsertOutcome::Created => outcome.created += 1,
            UpsertOutcome::Updated => outcome.updated += 1,
            UpsertOutcome::Unchanged => outcome.unchanged += 1,
        }
    }
    outcome.found = u64::try_from(seen.len()).unwrap_or(u64::MAX);
    let removed = previously_active
        .iter()
        .filter(|id| !seen.contains(id.as_str()))
        .count();
    outcome.removed = u64::try_from(removed).unwrap_or(u64::MAX);

    outcome.purged = store
        .purge_inactive_before(provider_id, now - retention)
        .await?;

    tracing::info!(
        provider_id,
        found = outcome.found,
        created = outcome.created,
        updated = outcome.updated,
        unchanged = outcome.unchanged,
        removed = outcome.removed,
        purged = outcome.purged,
        "reconciled"
    );
    Ok(outcome)
}

/// Reconciles against Postgres in a single transaction holding the
/// provider's transaction-scoped advisory lock.
///
/// # Errors
///
/// Same as [`reconcile`]; on any error the transaction is rolled back.
pub async fn reconcile_provider(
    pool: &PgPool,
    provider_id: i64,
    activities: &[NormalizedActivity],
    retention: Duration,
) -> Result<ReconcileOutcome, DbError> {
    if activities.is_empty() {
        return Err(DbError::EmptyActivitySet { provider_id });
    }

    let mut store = PgActivityStore::begin(pool).await?;
    store.lock_xact(lock_key(provider_id)).await?;
    let outcome = reconcile(&mut store, provider_id, activities, Utc::now(), retention).await?;
    store.commit().await?;
    Ok(outcome)
}
