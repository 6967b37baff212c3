//! Hierarchical traversal of a provider's client-rendered catalogue.
//!
//! Entry point → sections → subsections → listing rows → optional detail
//! page. Sections are discovered first on a single session; each section is
//! then walked independently on its own pooled session, so a failure in one
//! section never affects another.

mod levels;
mod listing;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use futures::future;
use futures::stream::{self, Stream, StreamExt};
use tokio::time::Instant;

use actsync_core::{AppConfig, TraversalSchema};

use crate::error::ScraperError;
use crate::pool::{BrowserPool, PooledSession};
use crate::retry::RetryPolicy;
use crate::types::RawListing;

pub use levels::{extract_menu_level, MenuStep, StepHandle};

use levels::{level_query, reach, Hop};
use listing::{detail_query, listing_query, overlay_detail, rows_to_listings};

/// A section gets at most this many attempts (the first plus one requeue).
const MAX_SECTION_ATTEMPTS: u32 = 2;

#[derive(Debug, Clone, Copy)]
pub struct NavigatorConfig {
    /// Per-call timeout for navigation, waits, clicks and extraction.
    pub nav_timeout: Duration,
    pub retry: RetryPolicy,
    /// Ceiling for one attempt at a whole section.
    pub section_timeout: Duration,
    pub enrich_details: bool,
    /// Sections walked concurrently; `None` uses the pool size.
    pub max_concurrency: Option<usize>,
}

impl NavigatorConfig {
    #[must_use]
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            nav_timeout: config.nav_timeout(),
            retry: RetryPolicy {
                max_retries: config.scraper_max_retries,
                backoff_base_ms: config.scraper_retry_backoff_base_ms,
            },
            section_timeout: config.section_timeout(),
            enrich_details: config.enrich_details,
            max_concurrency: None,
        }
    }
}

/// A top-level menu entry and the page it was found on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    pub entry_url: String,
    pub step: MenuStep,
}

impl Section {
    #[must_use]
    pub fn label(&self) -> &str {
        &self.step.label
    }
}

/// Result of walking one section.
#[derive(Debug)]
pub struct SectionReport {
    /// `None` when section discovery itself failed.
    pub section: Option<Section>,
    pub outcome: Result<Vec<RawListing>, ScraperError>,
    pub attempts: u32,
    pub warnings: Vec<String>,
}

impl SectionReport {
    #[must_use]
    pub fn label(&self) -> &str {
        self.section.as_ref().map_or("<discovery>", Section::label)
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        self.outcome.is_ok()
    }

    fn cut_off(section: Section, deadline_secs: u64) -> Self {
        let label = section.label().to_owned();
        Self {
            section: Some(section),
            outcome: Err(ScraperError::RunDeadline {
                section: label,
                deadline_secs,
            }),
            attempts: 1,
            warnings: Vec::new(),
        }
    }

    fn discovery_failure(err: ScraperError) -> Self {
        Self {
            section: None,
            outcome: Err(err),
            attempts: 1,
            warnings: Vec::new(),
        }
    }
}

pub struct Navigator {
    pool: BrowserPool,
    schema: Arc<TraversalSchema>,
    config: NavigatorConfig,
}

impl Navigator {
    #[must_use]
    pub fn new(pool: BrowserPool, schema: Arc<TraversalSchema>, config: NavigatorConfig) -> Self {
        Self {
            pool,
            schema,
            config,
        }
    }

    fn concurrency(&self) -> usize {
        self.config
            .max_concurrency
            .unwrap_or_else(|| self.pool.max_sessions())
            .max(1)
    }

    /// Discovers and walks every section reachable from `entry_points`.
    ///
    /// The stream is finite: sections are enumerated up front, then walked
    /// concurrently up to the configured limit. Reports arrive in completion
    /// order. If discovery fails the stream yields a single report with
    /// `section == None`.
    pub fn traverse<'a>(
        &'a self,
        entry_points: &'a [String],
    ) -> impl Stream<Item = SectionReport> + 'a {
        stream::once(self.discover_sections(entry_points))
            .map(move |discovered| match discovered {
                Ok(sections) => self.walk_sections(sections).left_stream(),
                Err(err) => {
                    stream::once(async move { SectionReport::discovery_failure(err) })
                        .right_stream()
                }
            })
            .flatten()
    }

    /// Like [`traverse`](Self::traverse), but stops walking at `deadline`.
    ///
    /// Reports that finished in time are yielded as usual. Every section
    /// still running or not yet started at the deadline gets a report
    /// failed with [`ScraperError::RunDeadline`], so the stream always
    /// accounts for each discovered section. Abandoned sessions are retired
    /// by the pool.
    pub fn traverse_until<'a>(
        &'a self,
        entry_points: &'a [String],
        deadline: Instant,
    ) -> impl Stream<Item = SectionReport> + 'a {
        let deadline_secs = deadline.saturating_duration_since(Instant::now()).as_secs();
        stream::once(tokio::time::timeout_at(
            deadline,
            self.discover_sections(entry_points),
        ))
        .map(move |discovered| {
            let discovered = discovered.unwrap_or_else(|_| {
                Err(ScraperError::RunDeadline {
                    section: "<discovery>".to_owned(),
                    deadline_secs,
                })
            });
            match discovered {
                Ok(sections) => self
                    .walk_sections_until(sections, deadline, deadline_secs)
                    .left_stream(),
                Err(err) => stream::once(future::ready(SectionReport::discovery_failure(err)))
                    .right_stream(),
            }
        })
        .flatten()
    }

    fn walk_sections_until(
        &self,
        sections: Vec<Section>,
        deadline: Instant,
        deadline_secs: u64,
    ) -> impl Stream<Item = SectionReport> + '_ {
        let pending: BTreeMap<usize, Section> = sections.iter().cloned().enumerate().collect();
        let running = Box::pin(
            stream::iter(sections.into_iter().enumerate())
                .map(move |(idx, section)| async move { (idx, self.run_section(section).await) })
                .buffer_unordered(self.concurrency()),
        );

        stream::unfold(
            (Some(running), pending),
            move |(mut running, mut pending)| async move {
                if let Some(walking) = running.as_mut() {
                    let next = tokio::time::timeout_at(deadline, walking.next()).await;
                    match next {
                        Ok(Some((idx, report))) => {
                            pending.remove(&idx);
                            return Some((report, (running, pending)));
                        }
                        Ok(None) => return None,
                        Err(_) => {
                            tracing::warn!(
                                unfinished = pending.len(),
                                deadline_secs,
                                "run deadline reached, abandoning unfinished sections"
                            );
                            running = None;
                        }
                    }
                }
                let (_, section) = pending.pop_first()?;
                Some((
                    SectionReport::cut_off(section, deadline_secs),
                    (running, pending),
                ))
            },
        )
    }

    /// Walks already-discovered sections concurrently.
    pub fn walk_sections(
        &self,
        sections: Vec<Section>,
    ) -> impl Stream<Item = SectionReport> + '_ {
        stream::iter(sections)
            .map(move |section| self.run_section(section))
            .buffer_unordered(self.concurrency())
    }

    /// Enumerates the top-level sections of every entry point on one session.
    ///
    /// An entry point that fails is logged and skipped.
    ///
    /// # Errors
    ///
    /// Returns [`ScraperError::Discovery`] if no entry point produced any
    /// section, or the pool error if no session could be acquired.
    pub async fn discover_sections(
        &self,
        entry_points: &[String],
    ) -> Result<Vec<Section>, ScraperError> {
        let mut session = self.pool.acquire().await?;
        let mut sections = Vec::new();
        let mut last_err = None;

        for entry_url in entry_points {
            match self.discover_at(&mut session, entry_url).await {
                Ok(found) => {
                    tracing::info!(entry_url, sections = found.len(), "discovered sections");
                    sections.extend(found.into_iter().map(|step| Section {
                        entry_url: entry_url.clone(),
                        step,
                    }));
                }
                Err(err) => {
                    tracing::warn!(entry_url, error = %err, "section discovery failed");
                    if err.needs_recycle() {
                        session.release(false).await;
                        session = self.pool.acquire().await?;
                    }
                    last_err = Some(err);
                }
            }
        }
        session.release(true).await;

        if sections.is_empty() {
            let source = last_err.unwrap_or_else(|| ScraperError::SchemaDrift {
                level: "sections",
                reason: "entry pages rendered no sections".to_owned(),
            });
            return Err(ScraperError::Discovery {
                entry_points: entry_points.len(),
                source: Box::new(source),
            });
        }
        Ok(sections)
    }

    async fn discover_at(
        &self,
        session: &mut PooledSession,
        entry_url: &str,
    ) -> Result<Vec<MenuStep>, ScraperError> {
        let level = &self.schema.sections;
        reach(
            session,
            entry_url,
            &level.ready,
            &[],
            self.config.nav_timeout,
            self.config.retry,
        )
        .await?;
        let nodes = session
            .extract(&level_query(level), self.config.nav_timeout)
            .await?;
        let steps = extract_menu_level(level, "sections", &nodes)?;
        if steps.is_empty() {
            return Err(ScraperError::SchemaDrift {
                level: "sections",
                reason: format!("no items matched \"{}\"", level.item),
            });
        }
        Ok(steps)
    }

    /// Walks one section, requeueing it once on a fresh session when the
    /// failure is worth another try.
    pub async fn run_section(&self, section: Section) -> SectionReport {
        let mut attempts = 0u32;
        let mut requeue_note = None;
        loop {
            attempts += 1;
            let mut warnings: Vec<String> = requeue_note.iter().cloned().collect();
            match self.run_section_once(&section, &mut warnings).await {
                Ok(listings) => {
                    tracing::info!(
                        section = section.label(),
                        listings = listings.len(),
                        attempts,
                        "section complete"
                    );
                    return SectionReport {
                        section: Some(section),
                        outcome: Ok(listings),
                        attempts,
                        warnings,
                    };
                }
                Err(err) if attempts < MAX_SECTION_ATTEMPTS && err.is_requeueable() => {
                    tracing::warn!(
                        section = section.label(),
                        attempt = attempts,
                        error = %err,
                        "section failed, requeueing on a fresh session"
                    );
                    requeue_note = Some(format!("{}: requeued after: {err}", section.label()));
                }
                Err(err) => {
                    tracing::warn!(
                        section = section.label(),
                        attempts,
                        error = %err,
                        "section failed"
                    );
                    let label = section.label().to_owned();
                    return SectionReport {
                        section: Some(section),
                        outcome: Err(ScraperError::SectionExtraction {
                            section: label,
                            attempts,
                            source: Box::new(err),
                        }),
                        attempts,
                        warnings,
                    };
                }
            }
        }
    }

    async fn run_section_once(
        &self,
        section: &Section,
        warnings: &mut Vec<String>,
    ) -> Result<Vec<RawListing>, ScraperError> {
        let mut session = self.pool.acquire().await?;
        let walked = tokio::time::timeout(
            self.config.section_timeout,
            self.walk_section(&mut session, section, warnings),
        )
        .await;

        match walked {
            Ok(Ok(listings)) => {
                session.release(true).await;
                Ok(listings)
            }
            Ok(Err(err)) => {
                session.release(!err.needs_recycle()).await;
                Err(err)
            }
            Err(_) => {
                session.release(false).await;
                Err(ScraperError::SectionTimeout {
                    section: section.label().to_owned(),
                    timeout_secs: self.config.section_timeout.as_secs(),
                })
            }
        }
    }

    async fn walk_section(
        &self,
        session: &mut PooledSession,
        section: &Section,
        warnings: &mut Vec<String>,
    ) -> Result<Vec<RawListing>, ScraperError> {
        let schema = &self.schema;
        let Some(sub) = &schema.subsections else {
            let hops = [Hop {
                handle: section.step.handle.clone(),
                ready: schema.listings.ready.clone(),
            }];
            let path = vec![section.label().to_owned()];
            return self
                .collect_listings(session, section, &hops, &path, warnings)
                .await;
        };

        let section_hop = Hop {
            handle: section.step.handle.clone(),
            ready: sub.ready.clone(),
        };
        reach(
            session,
            &section.entry_url,
            &schema.sections.ready,
            std::slice::from_ref(&section_hop),
            self.config.nav_timeout,
            self.config.retry,
        )
        .await?;
        let nodes = session
            .extract(&level_query(sub), self.config.nav_timeout)
            .await?;
        let steps = extract_menu_level(sub, "subsections", &nodes)?;
        if steps.is_empty() {
            tracing::info!(section = section.label(), "section has no subsections");
            return Ok(Vec::new());
        }

        let mut listings = Vec::new();
        for step in steps {
            let hops = [
                section_hop.clone(),
                Hop {
                    handle: step.handle.clone(),
                    ready: schema.listings.ready.clone(),
                },
            ];
            let path = vec![section.label().to_owned(), step.label.clone()];
            let found = self
                .collect_listings(session, section, &hops, &path, warnings)
                .await?;
            tracing::debug!(
                section = section.label(),
                subsection = %step.label,
                listings = found.len(),
                "subsection complete"
            );
            listings.extend(found);
        }
        Ok(listings)
    }

    /// Opens a leaf page, reads its listing rows and enriches them.
    async fn collect_listings(
        &self,
        session: &mut PooledSession,
        section: &Section,
        hops: &[Hop],
        path: &[String],
        warnings: &mut Vec<String>,
    ) -> Result<Vec<RawListing>, ScraperError> {
        reach(
            session,
            &section.entry_url,
            &self.schema.sections.ready,
            hops,
            self.config.nav_timeout,
            self.config.retry,
        )
        .await?;
        let nodes = session
            .extract(&listing_query(&self.schema.listings), self.config.nav_timeout)
            .await?;
        let summaries = rows_to_listings(&nodes, path, warnings)?;
        if summaries.is_empty() {
            return Ok(summaries);
        }

        match (&self.schema.detail, self.config.enrich_details) {
            (Some(_), true) => self.enrich(session, summaries, warnings).await,
            _ => Ok(summaries),
        }
    }

    /// Replaces each summary with its detail-page version where possible.
    ///
    /// Detail failures degrade to the summary plus a warning, except when the
    /// session itself is gone.
    async fn enrich(
        &self,
        session: &mut PooledSession,
        summaries: Vec<RawListing>,
        warnings: &mut Vec<String>,
    ) -> Result<Vec<RawListing>, ScraperError> {
        let Some(detail) = &self.schema.detail else {
            return Ok(summaries);
        };
        let query = detail_query(detail);
        let mut out = Vec::with_capacity(summaries.len());

        for summary in summaries {
            let Some(url) = summary.detail_url.clone() else {
                out.push(summary);
                continue;
            };
            let id = summary.external_id.clone().unwrap_or_default();

            let fetched = async {
                reach(
                    session,
                    &url,
                    &detail.ready,
                    &[],
                    self.config.nav_timeout,
                    self.config.retry,
                )
                .await?;
                session.extract(&query, self.config.nav_timeout).await
            }
            .await;

            match fetched {
                Ok(nodes) => match nodes.first() {
                    Some(node) => out.push(overlay_detail(&summary, node)),
                    None => {
                        warnings.push(format!(
                            "{id}: detail page {url} had no \"{}\"",
                            detail.root
                        ));
                        out.push(summary);
                    }
                },
                Err(err) if is_session_fatal(&err) => return Err(err),
                Err(err) => {
                    tracing::warn!(
                        external_id = %id,
                        url,
                        error = %err,
                        "detail page unavailable, keeping summary"
                    );
                    warnings.push(format!("{id}: detail page {url} unavailable: {err}"));
                    out.push(summary);
                }
            }
        }
        Ok(out)
    }
}

/// Errors after which the session cannot be used for anything else.
fn is_session_fatal(err: &ScraperError) -> bool {
    matches!(
        err,
        ScraperError::SessionCrashed(_) | ScraperError::Protocol(_) | ScraperError::PoolClosed
    )
}
