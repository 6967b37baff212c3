use std::path::PathBuf;
use std::time::Duration;

use crate::runs::ZeroResultPolicy;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Environment {
    Development,
    Test,
    Production,
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Environment::Development => write!(f, "development"),
            Environment::Test => write!(f, "test"),
            Environment::Production => write!(f, "production"),
        }
    }
}

#[derive(Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub env: Environment,
    pub log_level: String,
    pub providers_path: PathBuf,
    pub db_max_connections: u32,
    pub db_min_connections: u32,
    pub db_acquire_timeout_secs: u64,
    pub browser_max_sessions: usize,
    pub browser_acquire_timeout_secs: u64,
    pub browser_nav_timeout_secs: u64,
    pub browser_max_consecutive_failures: u32,
    pub browser_headless: bool,
    pub chrome_path: Option<PathBuf>,
    pub scraper_max_retries: u32,
    pub scraper_retry_backoff_base_ms: u64,
    pub section_timeout_secs: u64,
    pub run_timeout_secs: u64,
    pub retention_days: u32,
    pub zero_result_policy: ZeroResultPolicy,
    pub enrich_details: bool,
}

impl AppConfig {
    #[must_use]
    pub fn nav_timeout(&self) -> Duration {
        Duration::from_secs(self.browser_nav_timeout_secs)
    }

    #[must_use]
    pub fn section_timeout(&self) -> Duration {
        Duration::from_secs(self.section_timeout_secs)
    }

    #[must_use]
    pub fn run_timeout(&self) -> Duration {
        Duration::from_secs(self.run_timeout_secs)
    }

    /// Retention window for inactive activities, as a signed `chrono` duration
    /// so it can be subtracted from `Utc::now()`.
    #[must_use]
    pub fn retention(&self) -> chrono::Duration {
        chrono::Duration::days(i64::from(self.retention_days))
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("env", &self.env)
            .field("log_level", &self.log_level)
            .field("providers_path", &self.providers_path)
            .field("database_url", &"[redacted]")
            .field("db_max_connections", &self.db_max_connections)
            .field("db_min_connections", &self.db_min_connections)
            .field("db_acquire_timeout_secs", &self.db_acquire_timeout_secs)
            .field("browser_max_sessions", &self.browser_max_sessions)
            .field(
                "browser_acquire_timeout_secs",
                &self.browser_acquire_timeout_secs,
            )
            .field("browser_nav_timeout_secs", &self.browser_nav_timeout_secs)
            .field(
                "browser_max_consecutive_failures",
                &self.browser_max_consecutive_failures,
            )
            .field("browser_headless", &self.browser_headless)
            .field("chrome_path", &self.chrome_path)
            .field("scraper_max_retries", &self.scraper_max_retries)
            .field(
                "scraper_retry_backoff_base_ms",
                &self.scraper_retry_backoff_base_ms,
            )
            .field("section_timeout_secs", &self.section_timeout_secs)
            .field("run_timeout_secs", &self.run_timeout_secs)
            .field("retention_days", &self.retention_days)
            .field("zero_result_policy", &self.zero_result_policy)
            .field("enrich_details", &self.enrich_details)
            .finish()
    }
}
