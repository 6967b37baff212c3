//! Integration tests for `BrowserPool` against the scripted fake browser.

mod support;

use std::sync::Arc;
use std::time::Duration;

use actsync_scraper::{BrowserPool, PoolConfig, ScraperError};

use support::{FakeFactory, FakePage, FakeSite};

const NAV: Duration = Duration::from_secs(5);

fn pool_with(factory: &FakeFactory, max_sessions: usize, max_failures: u32) -> BrowserPool {
    BrowserPool::new(
        Arc::new(factory.clone()),
        PoolConfig {
            max_sessions,
            acquire_timeout: Duration::from_secs(2),
            max_consecutive_failures: max_failures,
        },
    )
}

fn site() -> Arc<FakeSite> {
    let site = FakeSite::new();
    site.page("https://x.test/", FakePage::new().ready("body"));
    site
}

// ---------------------------------------------------------------------------
// Reuse and recycling
// ---------------------------------------------------------------------------

#[tokio::test]
async fn healthy_release_reuses_session() {
    let factory = FakeFactory::new(site());
    let pool = pool_with(&factory, 2, 3);

    let session = pool.acquire().await.unwrap();
    let first_id = session.id();
    session.release(true).await;

    let session = pool.acquire().await.unwrap();
    assert_eq!(session.id(), first_id);
    session.release(true).await;

    assert_eq!(factory.spawned(), 1);
    assert_eq!(factory.closed(), 0);
    assert_eq!(pool.stats().idle, 1);
}

#[tokio::test]
async fn unhealthy_release_closes_and_next_acquire_spawns() {
    let factory = FakeFactory::new(site());
    let pool = pool_with(&factory, 1, 3);

    let session = pool.acquire().await.unwrap();
    let first_id = session.id();
    session.release(false).await;
    assert_eq!(factory.closed(), 1);

    let session = pool.acquire().await.unwrap();
    assert_ne!(session.id(), first_id);
    session.release(true).await;

    assert_eq!(factory.spawned(), 2);
    assert_eq!(pool.stats().retired, 1);
}

#[tokio::test]
async fn dropped_session_is_closed_and_slot_freed() {
    let factory = FakeFactory::new(site());
    let pool = pool_with(&factory, 1, 3);

    let session = pool.acquire().await.unwrap();
    drop(session);

    let session = pool.acquire().await.unwrap();
    session.release(true).await;

    tokio::task::yield_now().await;
    assert_eq!(factory.spawned(), 2);
    assert_eq!(factory.closed(), 1);
}

// ---------------------------------------------------------------------------
// Capacity
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn acquire_times_out_when_all_sessions_checked_out() {
    let factory = FakeFactory::new(site());
    let pool = pool_with(&factory, 1, 3);

    let held = pool.acquire().await.unwrap();
    assert_eq!(pool.stats().checked_out, 1);

    let err = pool.acquire().await.err().expect("second acquire should fail");
    assert!(matches!(err, ScraperError::PoolExhausted { waited_ms: 2_000 }));

    held.release(true).await;
    assert!(pool.acquire().await.is_ok());
}

#[tokio::test]
async fn waiting_acquire_gets_released_session() {
    let factory = FakeFactory::new(site());
    let pool = pool_with(&factory, 1, 3);

    let held = pool.acquire().await.unwrap();
    let waiter = {
        let pool = pool.clone();
        tokio::spawn(async move { pool.acquire().await.map(|s| s.id()) })
    };
    tokio::task::yield_now().await;
    let held_id = held.id();
    held.release(true).await;

    assert_eq!(waiter.await.unwrap().unwrap(), held_id);
    assert_eq!(factory.spawned(), 1);
}

// ---------------------------------------------------------------------------
// Failure accounting
// ---------------------------------------------------------------------------

#[tokio::test]
async fn consecutive_failures_retire_the_session() {
    let site = site();
    site.timeout_on("https://x.test/slow", 10);
    let factory = FakeFactory::new(Arc::clone(&site));
    let pool = pool_with(&factory, 1, 2);

    let mut session = pool.acquire().await.unwrap();
    let first = session.navigate("https://x.test/slow", NAV).await.unwrap_err();
    assert!(first.is_transient());
    let second = session.navigate("https://x.test/slow", NAV).await.unwrap_err();
    assert!(matches!(second, ScraperError::SessionCrashed(_)));
    assert!(session.is_exhausted());

    // Even a "healthy" release closes an exhausted session.
    session.release(true).await;
    assert_eq!(factory.closed(), 1);
}

#[tokio::test]
async fn success_resets_failure_count() {
    let site = site();
    site.timeout_on("https://x.test/", 1);
    let factory = FakeFactory::new(Arc::clone(&site));
    let pool = pool_with(&factory, 1, 2);

    let mut session = pool.acquire().await.unwrap();
    assert!(session.navigate("https://x.test/", NAV).await.is_err());
    session.navigate("https://x.test/", NAV).await.unwrap();
    site.timeout_on("https://x.test/", 1);
    let err = session.navigate("https://x.test/", NAV).await.unwrap_err();
    assert!(err.is_transient());
    assert!(!session.is_exhausted());
    session.release(true).await;
    assert_eq!(factory.closed(), 0);
}

// ---------------------------------------------------------------------------
// Shutdown
// ---------------------------------------------------------------------------

#[tokio::test]
async fn shutdown_closes_idle_and_refuses_acquire() {
    let factory = FakeFactory::new(site());
    let pool = pool_with(&factory, 2, 3);

    let a = pool.acquire().await.unwrap();
    let b = pool.acquire().await.unwrap();
    a.release(true).await;

    pool.shutdown().await;
    assert_eq!(factory.closed(), 1);
    assert!(matches!(pool.acquire().await, Err(ScraperError::PoolClosed)));

    // Sessions checked out during shutdown are closed on release.
    b.release(true).await;
    assert_eq!(factory.closed(), 2);
}
