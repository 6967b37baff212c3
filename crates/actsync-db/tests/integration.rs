//! Offline unit tests for actsync-db pool configuration and row types.
//! These tests do not require a live database connection.

use std::path::PathBuf;

use actsync_core::{AppConfig, Environment, RunStatus, ZeroResultPolicy};
use actsync_db::{PoolConfig, ScrapeRunRow};
use chrono::{Duration, Utc};
use uuid::Uuid;

#[test]
fn pool_config_from_app_config_uses_core_values() {
    let app_config = AppConfig {
        database_url: "postgres://example".to_string(),
        env: Environment::Test,
        log_level: "info".to_string(),
        providers_path: PathBuf::from("./config/providers.yaml"),
        db_max_connections: 42,
        db_min_connections: 7,
        db_acquire_timeout_secs: 9,
        browser_max_sessions: 4,
        browser_acquire_timeout_secs: 120,
        browser_nav_timeout_secs: 30,
        browser_max_consecutive_failures: 3,
        browser_headless: true,
        chrome_path: None,
        scraper_max_retries: 2,
        scraper_retry_backoff_base_ms: 500,
        section_timeout_secs: 900,
        run_timeout_secs: 7200,
        retention_days: 365,
        zero_result_policy: ZeroResultPolicy::Fail,
        enrich_details: true,
    };

    let pool_config = PoolConfig::from_app_config(&app_config);
    assert_eq!(pool_config.max_connections, 42);
    assert_eq!(pool_config.min_connections, 7);
    assert_eq!(pool_config.acquire_timeout_secs, 9);
}

fn run_row(status: &str) -> ScrapeRunRow {
    let now = Utc::now();
    ScrapeRunRow {
        id: 1,
        public_id: Uuid::new_v4(),
        provider_id: 3,
        trigger_source: "cli".to_string(),
        status: status.to_string(),
        started_at: Some(now - Duration::minutes(12)),
        completed_at: Some(now),
        activities_found: 2_841,
        activities_created: 12,
        activities_updated: 40,
        activities_removed: 3,
        activities_purged: 1,
        sections_succeeded: 14,
        sections_failed: 1,
        warnings_count: 27,
        error_message: None,
        created_at: now - Duration::minutes(12),
    }
}

#[test]
fn scrape_run_row_exposes_typed_views() {
    let row = run_row("completed");
    assert_eq!(row.run_status(), Some(RunStatus::Completed));
    assert_eq!(row.duration(), Some(Duration::minutes(12)));

    let counts = row.counts();
    assert_eq!(counts.found, 2_841);
    assert_eq!(counts.sections_failed, 1);
    assert_eq!(counts.warnings, 27);
}

#[test]
fn unknown_status_and_unfinished_runs_have_no_typed_view() {
    let mut row = run_row("exploded");
    assert_eq!(row.run_status(), None);
    row.completed_at = None;
    assert_eq!(row.duration(), None);
}
