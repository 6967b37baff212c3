use std::path::PathBuf;
use std::str::FromStr;

use crate::app_config::{AppConfig, Environment};
use crate::runs::ZeroResultPolicy;
use crate::ConfigError;

/// Load application configuration from environment variables.
///
/// Calls `dotenvy::dotenv().ok()` to load `.env` files before reading env vars.
///
/// # Errors
///
/// Returns `ConfigError` if required env vars are missing or values are invalid.
pub fn load_app_config() -> Result<AppConfig, ConfigError> {
    dotenvy::dotenv().ok();
    load_app_config_from_env()
}

/// Load application configuration from environment variables already in the process.
///
/// Unlike [`load_app_config`], this does NOT load `.env` files.
///
/// # Errors
///
/// Returns `ConfigError` if required env vars are missing or values are invalid.
pub fn load_app_config_from_env() -> Result<AppConfig, ConfigError> {
    build_app_config(|key| std::env::var(key))
}

/// Build application configuration using the provided env-var lookup function.
///
/// Decoupled from the process environment so it can be tested with a plain
/// `HashMap` lookup.
fn build_app_config<F>(lookup: F) -> Result<AppConfig, ConfigError>
where
    F: Fn(&str) -> Result<String, std::env::VarError>,
{
    let require = |var: &str| -> Result<String, ConfigError> {
        lookup(var).map_err(|_| ConfigError::MissingEnvVar(var.to_string()))
    };

    let or_default = |var: &str, default: &str| -> String {
        lookup(var).unwrap_or_else(|_| default.to_string())
    };

    let database_url = require("DATABASE_URL")?;

    let env = parse_environment(&or_default("ACTSYNC_ENV", "development"))?;
    let log_level = or_default("ACTSYNC_LOG_LEVEL", "info");
    let providers_path = PathBuf::from(or_default(
        "ACTSYNC_PROVIDERS_PATH",
        "./config/providers.yaml",
    ));

    let db_max_connections = parse_var(&lookup, "ACTSYNC_DB_MAX_CONNECTIONS", "10")?;
    let db_min_connections = parse_var(&lookup, "ACTSYNC_DB_MIN_CONNECTIONS", "1")?;
    let db_acquire_timeout_secs = parse_var(&lookup, "ACTSYNC_DB_ACQUIRE_TIMEOUT_SECS", "10")?;

    let browser_max_sessions: usize = parse_var(&lookup, "ACTSYNC_BROWSER_MAX_SESSIONS", "4")?;
    if browser_max_sessions == 0 {
        return Err(ConfigError::InvalidEnvVar {
            var: "ACTSYNC_BROWSER_MAX_SESSIONS".to_string(),
            reason: "must be at least 1".to_string(),
        });
    }
    let browser_acquire_timeout_secs =
        parse_var(&lookup, "ACTSYNC_BROWSER_ACQUIRE_TIMEOUT_SECS", "120")?;
    let browser_nav_timeout_secs = parse_var(&lookup, "ACTSYNC_BROWSER_NAV_TIMEOUT_SECS", "30")?;
    let browser_max_consecutive_failures =
        parse_var(&lookup, "ACTSYNC_BROWSER_MAX_CONSECUTIVE_FAILURES", "3")?;
    let browser_headless = parse_bool(&lookup, "ACTSYNC_BROWSER_HEADLESS", true)?;
    let chrome_path = lookup("ACTSYNC_CHROME_PATH").ok().map(PathBuf::from);

    let scraper_max_retries = parse_var(&lookup, "ACTSYNC_SCRAPER_MAX_RETRIES", "2")?;
    let scraper_retry_backoff_base_ms =
        parse_var(&lookup, "ACTSYNC_SCRAPER_RETRY_BACKOFF_BASE_MS", "500")?;
    let section_timeout_secs = parse_var(&lookup, "ACTSYNC_SECTION_TIMEOUT_SECS", "900")?;
    let run_timeout_secs = parse_var(&lookup, "ACTSYNC_RUN_TIMEOUT_SECS", "7200")?;
    let retention_days = parse_var(&lookup, "ACTSYNC_RETENTION_DAYS", "365")?;
    let zero_result_policy = parse_var(&lookup, "ACTSYNC_ZERO_RESULT_POLICY", "fail")?;
    let enrich_details = parse_bool(&lookup, "ACTSYNC_ENRICH_DETAILS", true)?;

    Ok(AppConfig {
        database_url,
        env,
        log_level,
        providers_path,
        db_max_connections,
        db_min_connections,
        db_acquire_timeout_secs,
        browser_max_sessions,
        browser_acquire_timeout_secs,
        browser_nav_timeout_secs,
        browser_max_consecutive_failures,
        browser_headless,
        chrome_path,
        scraper_max_retries,
        scraper_retry_backoff_base_ms,
        section_timeout_secs,
        run_timeout_secs,
        retention_days,
        zero_result_policy,
        enrich_details,
    })
}

fn parse_var<F, T>(lookup: &F, var: &str, default: &str) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Result<String, std::env::VarError>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let raw = lookup(var).unwrap_or_else(|_| default.to_string());
    raw.trim()
        .parse::<T>()
        .map_err(|e| ConfigError::InvalidEnvVar {
            var: var.to_string(),
            reason: e.to_string(),
        })
}

fn parse_bool<F>(lookup: &F, var: &str, default: bool) -> Result<bool, ConfigError>
where
    F: Fn(&str) -> Result<String, std::env::VarError>,
{
    let Ok(raw) = lookup(var) else {
        return Ok(default);
    };
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(ConfigError::InvalidEnvVar {
            var: var.to_string(),
            reason: format!("expected a boolean, got \"{other}\""),
        }),
    }
}

/// Parse a string into an `Environment` variant.
///
/// # Errors
///
/// Returns `ConfigError::InvalidEnvVar` for unrecognized values.
fn parse_environment(s: &str) -> Result<Environment, ConfigError> {
    match s {
        "development" => Ok(Environment::Development),
        "test" => Ok(Environment::Test),
        "production" => Ok(Environment::Production),
        other => Err(ConfigError::InvalidEnvVar {
            var: "ACTSYNC_ENV".to_string(),
            reason: format!(
                "unrecognized environment \"{other}\"; expected development, test, or production"
            ),
        }),
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
