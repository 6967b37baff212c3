//! Menu-level extraction and replay.
//!
//! A menu level (sections or subsections) is read into typed [`MenuStep`]s.
//! Reaching a nested level later means replaying the steps that lead to it
//! from the nearest URL, since click-driven widgets keep their state only in
//! the live page.

use std::time::Duration;

use actsync_core::{FieldSelector, LevelSchema, StepAction};

use crate::browser::{ExtractQuery, ExtractedNode};
use crate::error::ScraperError;
use crate::pool::PooledSession;
use crate::retry::{retry_with_backoff, RetryPolicy};

const LABEL: &str = "label";
const LINK: &str = "link";

/// How a menu item is opened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepHandle {
    /// Absolute URL of the item's target page.
    Link(String),
    /// The `index`-th node matching `selector` on the parent page.
    Click { selector: String, index: usize },
}

/// One item of a rendered menu level.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MenuStep {
    pub label: String,
    pub handle: StepHandle,
}

/// A step to replay plus the selector that proves it rendered.
#[derive(Debug, Clone)]
pub(crate) struct Hop {
    pub handle: StepHandle,
    pub ready: String,
}

pub(crate) fn level_query(level: &LevelSchema) -> ExtractQuery {
    let query = ExtractQuery::new(level.item.clone()).field(LABEL, &level.label);
    match &level.action {
        StepAction::Link { attr } => query.field(
            LINK,
            &FieldSelector {
                selector: None,
                attr: Some(attr.clone()),
            },
        ),
        StepAction::Click => query,
    }
}

/// Converts the nodes of one rendered menu level into steps.
///
/// Items missing a label (or a link, for link levels) are skipped. When
/// items matched but *none* of them carry the required fields the page no
/// longer has the shape the schema describes, which is reported as
/// [`ScraperError::SchemaDrift`] rather than an empty level.
///
/// # Errors
///
/// Returns [`ScraperError::SchemaDrift`] as described above.
pub fn extract_menu_level(
    level: &LevelSchema,
    level_name: &'static str,
    nodes: &[ExtractedNode],
) -> Result<Vec<MenuStep>, ScraperError> {
    let mut steps = Vec::with_capacity(nodes.len());
    let mut missing_label = 0usize;
    let mut missing_link = 0usize;

    for (index, node) in nodes.iter().enumerate() {
        let Some(label) = node.get(LABEL) else {
            missing_label += 1;
            continue;
        };
        let handle = match &level.action {
            StepAction::Link { .. } => match node.get(LINK) {
                Some(url) => StepHandle::Link(url.to_owned()),
                None => {
                    missing_link += 1;
                    continue;
                }
            },
            StepAction::Click => StepHandle::Click {
                selector: level.item.clone(),
                index,
            },
        };
        steps.push(MenuStep {
            label: label.to_owned(),
            handle,
        });
    }

    if !nodes.is_empty() && steps.is_empty() {
        let reason = if missing_label == nodes.len() {
            format!("{} item(s) matched but none had a label", nodes.len())
        } else {
            format!("{} item(s) matched but none had a link", nodes.len())
        };
        return Err(ScraperError::SchemaDrift {
            level: level_name,
            reason,
        });
    }

    let skipped = missing_label + missing_link;
    if skipped > 0 {
        tracing::warn!(
            level = level_name,
            skipped,
            kept = steps.len(),
            "skipped menu items without label or link"
        );
    }

    Ok(steps)
}

/// Navigates to `entry_url` and replays `hops`, waiting for each level to
/// render. Replay starts from the last link hop when there is one.
///
/// The whole replay is one retry unit: a transient failure anywhere starts
/// over from the navigation.
pub(crate) async fn reach(
    session: &mut PooledSession,
    entry_url: &str,
    entry_ready: &str,
    hops: &[Hop],
    timeout: Duration,
    retry: RetryPolicy,
) -> Result<(), ScraperError> {
    let last_link = hops
        .iter()
        .enumerate()
        .rev()
        .find_map(|(i, hop)| match &hop.handle {
            StepHandle::Link(url) => Some((i, url)),
            StepHandle::Click { .. } => None,
        });

    let (url, ready, rest) = match last_link {
        Some((i, url)) => (url.clone(), hops[i].ready.clone(), hops[i + 1..].to_vec()),
        None => (entry_url.to_owned(), entry_ready.to_owned(), hops.to_vec()),
    };

    retry_with_backoff(retry, session, move |s| {
        let url = url.clone();
        let ready = ready.clone();
        let rest = rest.clone();
        Box::pin(async move {
            s.navigate(&url, timeout).await?;
            s.wait_for(&ready, timeout).await?;
            for hop in &rest {
                if let StepHandle::Click { selector, index } = &hop.handle {
                    s.click(selector, *index, timeout).await?;
                }
                s.wait_for(&hop.ready, timeout).await?;
            }
            Ok(())
        })
    })
    .await
}
