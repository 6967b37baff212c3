//! Bounded pool of browser sessions.
//!
//! A semaphore caps the number of live sessions; idle sessions sit on a
//! mutex-guarded free list and are reused before new ones are spawned. A
//! session checked out of the pool is wrapped in a [`PooledSession`] which
//! tracks consecutive navigation failures and decides on release whether the
//! underlying browser goes back on the free list or is torn down.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use actsync_core::AppConfig;

use crate::browser::{BrowserSession, ExtractQuery, ExtractedNode, SessionFactory};
use crate::error::ScraperError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolConfig {
    pub max_sessions: usize,
    pub acquire_timeout: Duration,
    /// A session is retired once this many navigation failures happen in a
    /// row on it.
    pub max_consecutive_failures: u32,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_sessions: 4,
            acquire_timeout: Duration::from_secs(120),
            max_consecutive_failures: 3,
        }
    }
}

impl PoolConfig {
    #[must_use]
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            max_sessions: config.browser_max_sessions,
            acquire_timeout: Duration::from_secs(config.browser_acquire_timeout_secs),
            max_consecutive_failures: config.browser_max_consecutive_failures,
        }
    }
}

/// Point-in-time pool counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    pub idle: usize,
    pub checked_out: usize,
    pub spawned: u64,
    pub retired: u64,
}

struct IdleSession {
    id: u64,
    session: Box<dyn BrowserSession>,
    consecutive_failures: u32,
}

struct PoolInner {
    factory: Arc<dyn SessionFactory>,
    config: PoolConfig,
    permits: Arc<Semaphore>,
    idle: Mutex<Vec<IdleSession>>,
    next_id: AtomicU64,
    spawned: AtomicU64,
    retired: AtomicU64,
    closed: AtomicBool,
}

impl PoolInner {
    fn idle(&self) -> std::sync::MutexGuard<'_, Vec<IdleSession>> {
        self.idle.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Cheaply cloneable handle to a shared session pool.
#[derive(Clone)]
pub struct BrowserPool {
    inner: Arc<PoolInner>,
}

impl BrowserPool {
    /// Creates an empty pool. Sessions are spawned lazily on first acquire.
    #[must_use]
    pub fn new(factory: Arc<dyn SessionFactory>, config: PoolConfig) -> Self {
        let max_sessions = config.max_sessions.max(1);
        Self {
            inner: Arc::new(PoolInner {
                factory,
                config: PoolConfig {
                    max_sessions,
                    ..config
                },
                permits: Arc::new(Semaphore::new(max_sessions)),
                idle: Mutex::new(Vec::new()),
                next_id: AtomicU64::new(1),
                spawned: AtomicU64::new(0),
                retired: AtomicU64::new(0),
                closed: AtomicBool::new(false),
            }),
        }
    }

    #[must_use]
    pub fn max_sessions(&self) -> usize {
        self.inner.config.max_sessions
    }

    /// Checks out a session, reusing an idle one when available.
    ///
    /// Waits up to the configured acquire timeout for a free slot.
    ///
    /// # Errors
    ///
    /// - [`ScraperError::PoolExhausted`] if no slot frees up in time.
    /// - [`ScraperError::PoolClosed`] after [`BrowserPool::shutdown`].
    /// - [`ScraperError::Launch`] if a new session cannot be spawned.
    pub async fn acquire(&self) -> Result<PooledSession, ScraperError> {
        if self.inner.closed.load(Ordering::Acquire) {
            return Err(ScraperError::PoolClosed);
        }

        let timeout = self.inner.config.acquire_timeout;
        let permit = match tokio::time::timeout(
            timeout,
            Arc::clone(&self.inner.permits).acquire_owned(),
        )
        .await
        {
            Ok(Ok(permit)) => permit,
            Ok(Err(_)) => return Err(ScraperError::PoolClosed),
            Err(_) => {
                return Err(ScraperError::PoolExhausted {
                    waited_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
                })
            }
        };

        if self.inner.closed.load(Ordering::Acquire) {
            return Err(ScraperError::PoolClosed);
        }

        let reused = self.inner.idle().pop();
        let slot = if let Some(idle) = reused {
            tracing::debug!(session_id = idle.id, "reusing idle browser session");
            idle
        } else {
            let session = self.inner.factory.spawn().await?;
            let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
            self.inner.spawned.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(session_id = id, "spawned browser session");
            IdleSession {
                id,
                session,
                consecutive_failures: 0,
            }
        };

        Ok(PooledSession {
            pool: Arc::clone(&self.inner),
            slot: Some(slot),
            _permit: permit,
        })
    }

    /// Closes every idle session and refuses further acquisitions.
    ///
    /// Sessions still checked out are closed when they are released.
    pub async fn shutdown(&self) {
        self.inner.closed.store(true, Ordering::Release);
        self.inner.permits.close();
        let idle: Vec<IdleSession> = std::mem::take(&mut *self.inner.idle());
        let count = idle.len();
        for slot in idle {
            slot.session.close().await;
        }
        tracing::debug!(closed = count, "browser pool shut down");
    }

    #[must_use]
    pub fn stats(&self) -> PoolStats {
        let idle = self.inner.idle().len();
        let available = self.inner.permits.available_permits();
        PoolStats {
            idle,
            checked_out: self.inner.config.max_sessions.saturating_sub(available),
            spawned: self.inner.spawned.load(Ordering::Relaxed),
            retired: self.inner.retired.load(Ordering::Relaxed),
        }
    }
}

/// A checked-out browser session.
///
/// Call [`PooledSession::release`] when done. Dropping it instead treats the
/// session as unhealthy: it is closed in the background and its slot freed.
pub struct PooledSession {
    pool: Arc<PoolInner>,
    slot: Option<IdleSession>,
    _permit: OwnedSemaphorePermit,
}

impl PooledSession {
    #[must_use]
    pub fn id(&self) -> u64 {
        self.slot.as_ref().map_or(0, |s| s.id)
    }

    fn slot_mut(&mut self) -> Result<&mut IdleSession, ScraperError> {
        self.slot
            .as_mut()
            .ok_or_else(|| ScraperError::SessionCrashed("session already released".to_owned()))
    }

    /// Records the outcome of a navigation-class call.
    ///
    /// Consecutive transient failures beyond the configured limit are
    /// escalated to [`ScraperError::SessionCrashed`] so callers recycle the
    /// session instead of retrying on it.
    fn record<T>(&mut self, result: Result<T, ScraperError>) -> Result<T, ScraperError> {
        let limit = self.pool.config.max_consecutive_failures;
        let Some(slot) = self.slot.as_mut() else {
            return result;
        };
        match result {
            Ok(value) => {
                slot.consecutive_failures = 0;
                Ok(value)
            }
            Err(err) if err.is_transient() => {
                slot.consecutive_failures += 1;
                if limit > 0 && slot.consecutive_failures >= limit {
                    tracing::warn!(
                        session_id = slot.id,
                        failures = slot.consecutive_failures,
                        error = %err,
                        "retiring browser session after consecutive failures"
                    );
                    Err(ScraperError::SessionCrashed(format!(
                        "retired after {} consecutive failures: {err}",
                        slot.consecutive_failures
                    )))
                } else {
                    Err(err)
                }
            }
            Err(err) => Err(err),
        }
    }

    /// Whether this session has hit its consecutive-failure limit.
    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        let limit = self.pool.config.max_consecutive_failures;
        self.slot
            .as_ref()
            .is_some_and(|s| limit > 0 && s.consecutive_failures >= limit)
    }

    /// # Errors
    ///
    /// Propagates the session's navigation error.
    pub async fn navigate(&mut self, url: &str, timeout: Duration) -> Result<(), ScraperError> {
        let result = self.slot_mut()?.session.navigate(url, timeout).await;
        self.record(result)
    }

    /// # Errors
    ///
    /// Propagates the session's wait error.
    pub async fn wait_for(&mut self, selector: &str, timeout: Duration) -> Result<(), ScraperError> {
        let result = self.slot_mut()?.session.wait_for(selector, timeout).await;
        self.record(result)
    }

    /// # Errors
    ///
    /// Propagates the session's click error.
    pub async fn click(
        &mut self,
        selector: &str,
        index: usize,
        timeout: Duration,
    ) -> Result<(), ScraperError> {
        let result = self
            .slot_mut()?
            .session
            .click(selector, index, timeout)
            .await;
        self.record(result)
    }

    /// # Errors
    ///
    /// Propagates the session's extraction error.
    pub async fn extract(
        &mut self,
        query: &ExtractQuery,
        timeout: Duration,
    ) -> Result<Vec<ExtractedNode>, ScraperError> {
        let result = self.slot_mut()?.session.extract(query, timeout).await;
        self.record(result)
    }

    /// Returns the session to the pool, or closes it when `healthy` is false
    /// or it has exhausted its failure budget.
    pub async fn release(mut self, healthy: bool) {
        let exhausted = self.is_exhausted();
        let Some(slot) = self.slot.take() else {
            return;
        };
        if healthy && !exhausted && !self.pool.closed.load(Ordering::Acquire) {
            self.pool.idle().push(slot);
        } else {
            self.pool.retired.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(session_id = slot.id, healthy, "closing browser session");
            slot.session.close().await;
        }
    }
}

impl Drop for PooledSession {
    fn drop(&mut self) {
        let Some(slot) = self.slot.take() else {
            return;
        };
        self.pool.retired.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(
            session_id = slot.id,
            "browser session dropped without release; closing"
        );
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(async move {
                slot.session.close().await;
            });
        }
    }
}
