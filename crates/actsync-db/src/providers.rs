//! Database operations for `providers`.

use actsync_core::ProviderConfig;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::DbError;

/// A row from the `providers` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ProviderRow {
    pub id: i64,
    pub slug: String,
    pub name: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Upsert providers from config into the database.
///
/// Returns the number of providers processed (inserted or updated). All
/// upserts run inside a single transaction.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if any database operation fails.
pub async fn seed_providers(pool: &PgPool, providers: &[ProviderConfig]) -> Result<usize, DbError> {
    let mut tx = pool.begin().await?;
    let mut count = 0usize;

    for provider in providers {
        sqlx::query(
            "INSERT INTO providers (slug, name, is_active) \
             VALUES ($1, $2, $3) \
             ON CONFLICT (slug) DO UPDATE SET \
                 name = EXCLUDED.name, \
                 is_active = EXCLUDED.is_active, \
                 updated_at = NOW()",
        )
        .bind(provider.slug())
        .bind(&provider.name)
        .bind(provider.is_active)
        .execute(&mut *tx)
        .await?;
        count += 1;
    }

    tx.commit().await?;
    Ok(count)
}

/// Fetches a provider by slug, or `None` if it has not been seeded.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn get_provider_by_slug(pool: &PgPool, slug: &str) -> Result<Option<ProviderRow>, DbError> {
    let row = sqlx::query_as::<_, ProviderRow>(
        "SELECT id, slug, name, is_active, created_at, updated_at \
         FROM providers \
         WHERE slug = $1",
    )
    .bind(slug)
    .fetch_optional(pool)
    .await?;

    Ok(row)
}

/// Returns every provider ordered by slug.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_providers(pool: &PgPool) -> Result<Vec<ProviderRow>, DbError> {
    let rows = sqlx::query_as::<_, ProviderRow>(
        "SELECT id, slug, name, is_active, created_at, updated_at \
         FROM providers \
         ORDER BY slug",
    )
    .fetch_all(pool)
    .await?;

    Ok(rows)
}
