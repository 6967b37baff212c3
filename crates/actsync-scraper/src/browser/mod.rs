//! Browser automation abstraction.
//!
//! [`BrowserSession`] is the narrow capability the navigator needs from a
//! headless browser: load a URL, wait for client-side rendering to produce a
//! selector, click a rendered menu item, and pull text/attributes out of the
//! DOM. [`SessionFactory`] launches new sessions for the pool. Chromium is
//! the production implementation; tests drive a scripted fake.

pub mod chromium;

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use actsync_core::FieldSelector;

use crate::error::ScraperError;

/// One field to read out of every node matched by an [`ExtractQuery`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldQuery {
    pub name: String,
    /// Sub-selector relative to the matched node; `None` reads the node itself.
    pub selector: Option<String>,
    /// Attribute to read; `None` reads trimmed text content. `href`/`src`
    /// are resolved to absolute URLs.
    pub attr: Option<String>,
}

/// Match every node under `root` and read `fields` from each one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractQuery {
    pub root: String,
    pub fields: Vec<FieldQuery>,
}

impl ExtractQuery {
    #[must_use]
    pub fn new(root: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            fields: Vec::new(),
        }
    }

    #[must_use]
    pub fn field(mut self, name: &str, selector: &FieldSelector) -> Self {
        self.fields.push(FieldQuery {
            name: name.to_owned(),
            selector: selector.selector.clone(),
            attr: selector.attr.clone(),
        });
        self
    }

    /// Adds `name` only when a selector is configured.
    #[must_use]
    pub fn optional_field(self, name: &str, selector: Option<&FieldSelector>) -> Self {
        match selector {
            Some(sel) => self.field(name, sel),
            None => self,
        }
    }
}

/// Values read from one matched DOM node, keyed by field name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct ExtractedNode(pub BTreeMap<String, Option<String>>);

impl ExtractedNode {
    /// Returns the trimmed value of `name`, or `None` when it is missing or blank.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .get(name)
            .and_then(Option::as_deref)
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    /// Convenience constructor used by tests and fakes.
    #[must_use]
    pub fn from_pairs<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        Self(
            pairs
                .into_iter()
                .map(|(k, v)| (k.to_owned(), Some(v.to_owned())))
                .collect(),
        )
    }
}

/// A single browser session (one browser process with one page).
///
/// Navigation state is owned by the session; callers must not share a
/// session between concurrent tasks.
#[async_trait]
pub trait BrowserSession: Send {
    /// Load `url` and wait for the document to finish loading.
    async fn navigate(&mut self, url: &str, timeout: Duration) -> Result<(), ScraperError>;

    /// Wait until `selector` matches at least one node.
    async fn wait_for(&mut self, selector: &str, timeout: Duration) -> Result<(), ScraperError>;

    /// Click the `index`-th node matching `selector`.
    async fn click(
        &mut self,
        selector: &str,
        index: usize,
        timeout: Duration,
    ) -> Result<(), ScraperError>;

    /// Read fields from every node matching the query root.
    async fn extract(
        &mut self,
        query: &ExtractQuery,
        timeout: Duration,
    ) -> Result<Vec<ExtractedNode>, ScraperError>;

    /// Tear the session down. Errors are logged, never returned.
    async fn close(self: Box<Self>);
}

/// Launches new [`BrowserSession`]s on demand.
#[async_trait]
pub trait SessionFactory: Send + Sync {
    async fn spawn(&self) -> Result<Box<dyn BrowserSession>, ScraperError>;
}
