//! `collect` command: harvest each selected provider and reconcile it.
//!
//! Providers run one after another. A failed provider is recorded on its
//! own run row and does not stop the rest; the command exits non-zero if
//! any provider failed.

#[cfg(test)]
mod fake_site;
mod pipeline;
mod runner;
mod tracker;

use std::sync::Arc;

use clap::Args;
use thiserror::Error;

use actsync_core::{AppConfig, ProviderConfig, ProvidersFile, TriggerSource};
use actsync_db::{DbError, MemoryActivityStore};
use actsync_scraper::{ChromiumFactory, ChromiumOptions, SessionFactory};

use pipeline::{assess, harvest, Plan};
use runner::run_provider;

#[derive(Debug, Args)]
pub struct CollectArgs {
    /// Collect a single provider (by slug)
    #[arg(long, conflicts_with = "all", required_unless_present = "all")]
    pub provider: Option<String>,

    /// Collect every active provider
    #[arg(long)]
    pub all: bool,

    /// Harvest and print the reconcile plan without writing anything
    #[arg(long)]
    pub dry_run: bool,
}

/// Why a provider run ended without reconciling.
#[derive(Debug, Error)]
pub(crate) enum RunAbortError {
    #[error("no section succeeded ({failed} failed); first error: {first_error}")]
    NoSectionsSucceeded { failed: usize, first_error: String },

    #[error("{sections} section(s) succeeded but produced zero activities; refusing to reconcile")]
    ZeroResults { sections: usize },

    #[error("another run is already in progress for provider '{provider}'")]
    LockHeld { provider: String },

    #[error("storage failed")]
    Storage(#[source] DbError),
}

/// Resolves `--provider`/`--all` against the providers file.
///
/// A named provider is returned even if inactive; `--all` skips inactive ones.
pub(crate) fn select_providers<'a>(
    file: &'a ProvidersFile,
    slug: Option<&str>,
) -> anyhow::Result<Vec<&'a ProviderConfig>> {
    if let Some(slug) = slug {
        let provider = file.find(slug).ok_or_else(|| {
            anyhow::anyhow!("provider '{slug}' not found in providers file")
        })?;
        if !provider.is_active {
            tracing::warn!(slug, "collecting inactive provider on explicit request");
        }
        return Ok(vec![provider]);
    }

    Ok(file
        .providers
        .iter()
        .filter(|p| {
            if p.is_active {
                true
            } else {
                tracing::info!(slug = %p.slug(), "skipping inactive provider");
                false
            }
        })
        .collect())
}

pub(crate) fn session_factory(config: &AppConfig) -> Arc<dyn SessionFactory> {
    Arc::new(ChromiumFactory::new(ChromiumOptions::from_app_config(config)))
}

/// Runs `collect`. Returns `false` if any provider failed.
///
/// # Errors
///
/// Returns an error if the providers file cannot be loaded, the provider
/// filter matches nothing, or the database is unreachable for a real run.
/// Per-provider failures are recorded and reported, not propagated.
pub(crate) async fn run_collect(config: &AppConfig, args: &CollectArgs) -> anyhow::Result<bool> {
    let file = actsync_core::load_providers(&config.providers_path)?;
    let providers = select_providers(&file, args.provider.as_deref())?;
    if providers.is_empty() {
        println!("no active providers configured; nothing to collect");
        return Ok(true);
    }

    let factory = session_factory(config);

    if args.dry_run {
        return dry_run(config, &providers, factory).await;
    }

    let pool = crate::db::connect(config).await?;
    Ok(run_providers(&pool, config, &providers, factory, TriggerSource::Cli).await)
}

/// Runs each provider in turn and prints one summary line per provider.
pub(crate) async fn run_providers(
    pool: &sqlx::PgPool,
    config: &AppConfig,
    providers: &[&ProviderConfig],
    factory: Arc<dyn SessionFactory>,
    trigger: TriggerSource,
) -> bool {
    let mut failed = 0_usize;
    for provider in providers {
        match run_provider(pool, config, provider, Arc::clone(&factory), trigger).await {
            Ok(summary) => println!("{summary}"),
            Err(err) => {
                failed += 1;
                tracing::error!(provider = %provider.slug(), error = %format!("{err:#}"), "provider run failed");
                println!("{}: FAILED: {err:#}", provider.slug());
            }
        }
    }

    if failed > 0 {
        tracing::warn!(failed, total = providers.len(), "collect finished with failures");
    }
    failed == 0
}

/// Harvests every provider and reconciles into an in-memory copy of its
/// stored rows, then prints what a real run would have written.
async fn dry_run(
    config: &AppConfig,
    providers: &[&ProviderConfig],
    factory: Arc<dyn SessionFactory>,
) -> anyhow::Result<bool> {
    let pool = match crate::db::connect(config).await {
        Ok(pool) => Some(pool),
        Err(err) => {
            tracing::warn!(error = %format!("{err:#}"), "dry-run without database; treating every provider as empty");
            None
        }
    };

    let mut all_ok = true;
    for provider in providers {
        let slug = provider.slug();
        let harvested = harvest(config, provider, Arc::clone(&factory)).await;
        let counts = harvested.counts();

        let plan = match assess(&harvested, config.zero_result_policy) {
            Ok(plan) => plan,
            Err(err) => {
                all_ok = false;
                println!("{slug}: dry-run: would FAIL: {err}");
                continue;
            }
        };
        if plan == Plan::SkipWrites {
            println!(
                "{slug}: dry-run: 0 activities from {} section(s); would complete without writes",
                counts.sections_succeeded
            );
            continue;
        }

        let mut store = MemoryActivityStore::new();
        let mut provider_id = 0;
        if let Some(pool) = &pool {
            if let Some(row) = actsync_db::get_provider_by_slug(pool, &slug).await? {
                provider_id = row.id;
                for stored in actsync_db::list_activities(pool, row.id).await? {
                    store.insert_stored(row.id, stored.to_memory_row());
                }
            }
        }

        let outcome = actsync_db::reconcile(
            &mut store,
            provider_id,
            &harvested.activities,
            chrono::Utc::now(),
            config.retention(),
        )
        .await?;

        println!(
            "{slug}: dry-run: found {} (sections ok {}, failed {}, warnings {}); \
             would create {}, update {}, leave {} unchanged, deactivate {}, purge {}",
            outcome.found,
            counts.sections_succeeded,
            counts.sections_failed,
            counts.warnings,
            outcome.created,
            outcome.updated,
            outcome.unchanged,
            outcome.removed,
            outcome.purged,
        );
    }
    Ok(all_ok)
}

#[cfg(test)]
#[path = "collect_test.rs"]
mod tests;
