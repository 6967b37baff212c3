//! Per-provider run lock backed by a Postgres session advisory lock.

use sqlx::pool::PoolConnection;
use sqlx::{PgPool, Postgres};

use crate::DbError;

/// Upper 32 bits of every provider lock key, so the keys cannot collide with
/// advisory locks taken by anything else sharing the database.
const LOCK_NAMESPACE: i64 = 0x4143_5359 << 32;

/// The advisory-lock key guarding `provider_id`.
///
/// Used both for the run-wide session lock and the reconcile transaction's
/// `pg_advisory_xact_lock`.
#[must_use]
pub fn lock_key(provider_id: i64) -> i64 {
    LOCK_NAMESPACE | (provider_id & 0xFFFF_FFFF)
}

/// Exclusive claim on a provider for the duration of one run.
///
/// The lock lives on a dedicated pooled connection. [`ProviderLock::release`]
/// unlocks and returns the connection; dropping the guard instead closes the
/// connection, which makes Postgres drop the lock with it.
pub struct ProviderLock {
    provider_id: i64,
    conn: Option<PoolConnection<Postgres>>,
}

impl ProviderLock {
    /// Tries to take the lock without waiting.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::LockHeld`] if another session holds it, or
    /// [`DbError::Sqlx`] if the query fails.
    pub async fn try_acquire(pool: &PgPool, provider_id: i64) -> Result<Self, DbError> {
        let mut conn = pool.acquire().await?;
        let acquired: bool = sqlx::query_scalar("SELECT pg_try_advisory_lock($1)")
            .bind(lock_key(provider_id))
            .fetch_one(&mut *conn)
            .await?;

        if !acquired {
            return Err(DbError::LockHeld { provider_id });
        }
        tracing::debug!(provider_id, "provider lock acquired");
        Ok(Self {
            provider_id,
            conn: Some(conn),
        })
    }

    #[must_use]
    pub fn provider_id(&self) -> i64 {
        self.provider_id
    }

    /// Unlocks explicitly.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Sqlx`] if the unlock query fails; the connection is
    /// then closed, which releases the lock regardless.
    pub async fn release(mut self) -> Result<(), DbError> {
        let Some(mut conn) = self.conn.take() else {
            return Ok(());
        };
        let unlocked = sqlx::query_scalar::<_, bool>("SELECT pg_advisory_unlock($1)")
            .bind(lock_key(self.provider_id))
            .fetch_one(&mut *conn)
            .await;
        match unlocked {
            Ok(_) => Ok(()),
            Err(err) => {
                conn.close_on_drop();
                Err(err.into())
            }
        }
    }
}

impl Drop for ProviderLock {
    fn drop(&mut self) {
        if let Some(mut conn) = self.conn.take() {
            tracing::warn!(
                provider_id = self.provider_id,
                "provider lock dropped without release; closing its connection"
            );
            conn.close_on_drop();
        }
    }
}
