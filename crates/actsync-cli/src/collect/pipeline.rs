//! Harvest: traverse a provider, normalize every listing, merge per run.
//!
//! Nothing here touches the database. The caller decides from the
//! [`Harvest`] whether the run may reconcile at all.

use std::sync::Arc;

use futures::StreamExt;

use actsync_core::{AppConfig, NormalizedActivity, ProviderConfig, RunCounts, ZeroResultPolicy};
use actsync_scraper::{
    normalize_listing, ActivityAccumulator, BrowserPool, Navigator, NavigatorConfig, PoolConfig,
    SectionReport, SessionFactory,
};

use super::RunAbortError;

/// Everything one traversal produced.
#[derive(Debug, Default)]
pub(crate) struct Harvest {
    /// Merged activities, one per external id, in first-seen order.
    pub activities: Vec<NormalizedActivity>,
    pub sections_succeeded: usize,
    pub sections_failed: usize,
    /// One line per failed section, or for failed discovery.
    pub section_errors: Vec<String>,
    /// Dropped rows, unparseable fields, detail fallbacks, requeues.
    pub warnings: Vec<String>,
    pub dropped: usize,
    pub duplicates: usize,
}

/// What the run may do with a [`Harvest`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Plan {
    Reconcile,
    /// Zero results under [`ZeroResultPolicy::Skip`]: complete without writes.
    SkipWrites,
}

pub(crate) fn count<T: TryInto<i32>>(n: T) -> i32 {
    n.try_into().unwrap_or(i32::MAX)
}

impl Harvest {
    /// Run counts known before reconciliation.
    pub(crate) fn counts(&self) -> RunCounts {
        RunCounts {
            found: count(self.activities.len()),
            sections_succeeded: count(self.sections_succeeded),
            sections_failed: count(self.sections_failed),
            warnings: count(self.warnings.len()),
            ..RunCounts::default()
        }
    }

    pub(crate) fn absorb(&mut self, report: SectionReport, acc: &mut ActivityAccumulator) {
        let label = report.label().to_owned();
        let is_section = report.section.is_some();
        self.warnings.extend(report.warnings);

        let listings = match report.outcome {
            Ok(listings) => listings,
            Err(err) => {
                if is_section {
                    self.sections_failed += 1;
                }
                self.section_errors.push(format!("{label}: {err}"));
                return;
            }
        };
        self.sections_succeeded += 1;

        for raw in &listings {
            match normalize_listing(raw) {
                Ok(normalized) => {
                    for warning in &normalized.warnings {
                        tracing::warn!(
                            section = %label,
                            external_id = %normalized.activity.external_id,
                            %warning,
                            "field not parsed; stored as null"
                        );
                        self.warnings
                            .push(format!("{}: {warning}", normalized.activity.external_id));
                    }
                    acc.push(normalized.activity, normalized.source);
                }
                Err(err) => {
                    tracing::warn!(section = %label, error = %err, "dropping listing");
                    self.dropped += 1;
                    self.warnings.push(format!("{label}: {err}"));
                }
            }
        }
    }
}

/// Decides whether a harvest may be reconciled.
///
/// # Errors
///
/// [`RunAbortError::NoSectionsSucceeded`] when nothing was walked
/// successfully, [`RunAbortError::ZeroResults`] when sections succeeded but
/// produced no activities under [`ZeroResultPolicy::Fail`].
pub(crate) fn assess(harvest: &Harvest, policy: ZeroResultPolicy) -> Result<Plan, RunAbortError> {
    if harvest.sections_succeeded == 0 {
        return Err(RunAbortError::NoSectionsSucceeded {
            failed: harvest.sections_failed,
            first_error: harvest
                .section_errors
                .first()
                .cloned()
                .unwrap_or_else(|| "no sections discovered".to_string()),
        });
    }
    if harvest.activities.is_empty() {
        return match policy {
            ZeroResultPolicy::Fail => Err(RunAbortError::ZeroResults {
                sections: harvest.sections_succeeded,
            }),
            ZeroResultPolicy::Skip => Ok(Plan::SkipWrites),
        };
    }
    Ok(Plan::Reconcile)
}

/// Traverses every section of `provider` and returns the merged result.
///
/// Section failures are recorded in the [`Harvest`], never returned.
/// Sections unfinished at the run deadline count as failed; whatever
/// finished before it is kept.
pub(crate) async fn harvest(
    config: &AppConfig,
    provider: &ProviderConfig,
    factory: Arc<dyn SessionFactory>,
) -> Harvest {
    let pool = BrowserPool::new(factory, PoolConfig::from_app_config(config));
    let navigator = Navigator::new(
        pool.clone(),
        Arc::new(provider.schema.clone()),
        NavigatorConfig::from_app_config(config),
    );

    let mut acc = ActivityAccumulator::new();
    let mut harvest = Harvest::default();
    {
        let deadline = tokio::time::Instant::now() + config.run_timeout();
        let reports = navigator.traverse_until(&provider.entry_urls, deadline);
        futures::pin_mut!(reports);
        while let Some(report) = reports.next().await {
            harvest.absorb(report, &mut acc);
        }
    }
    let stats = pool.stats();
    pool.shutdown().await;

    harvest.duplicates = acc.duplicates();
    harvest.activities = acc.into_activities();
    tracing::info!(
        provider = %provider.slug(),
        activities = harvest.activities.len(),
        duplicates = harvest.duplicates,
        dropped = harvest.dropped,
        sections_ok = harvest.sections_succeeded,
        sections_failed = harvest.sections_failed,
        sessions_spawned = stats.spawned,
        sessions_retired = stats.retired,
        "harvest complete"
    );
    harvest
}
