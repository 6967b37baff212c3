//! Scripted link-only site and fixtures for collection tests.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use actsync_core::{AppConfig, Environment, ProvidersFile, ZeroResultPolicy};
use actsync_scraper::{BrowserSession, ExtractQuery, ExtractedNode, ScraperError, SessionFactory};

pub(super) const ENTRY: &str = "https://parks.test/";

const PROVIDERS: &str = r#"
providers:
  - name: "Parks Test"
    entry_urls: ["https://parks.test/"]
    schema:
      version: 1
      sections: { ready: "nav", item: "nav a" }
      listings:
        ready: "table"
        row: "tr"
        fields:
          external_id: { selector: ".id" }
          title: { selector: ".name" }
          cost: { selector: ".fee" }
"#;

#[derive(Debug, Clone)]
struct Page {
    ready: String,
    root: String,
    nodes: Vec<ExtractedNode>,
}

#[derive(Default)]
pub(super) struct FakeSite {
    pages: Mutex<HashMap<String, Page>>,
    hang_on: Mutex<HashSet<String>>,
}

impl FakeSite {
    /// A two-section catalogue: Aquatics (A1, A2) and Arts (A9).
    pub(super) fn parks() -> Arc<Self> {
        let site = Arc::new(Self::default());
        site.page(
            ENTRY,
            "nav",
            "nav a",
            vec![
                ExtractedNode::from_pairs([
                    ("label", "Aquatics"),
                    ("link", "https://parks.test/aquatics"),
                ]),
                ExtractedNode::from_pairs([("label", "Arts"), ("link", "https://parks.test/arts")]),
            ],
        );
        site.listings(
            "https://parks.test/aquatics",
            &[("A1", "Swim Kids 1", "$50.00"), ("A2", "Swim Kids 2", "$55.00")],
        );
        site.listings("https://parks.test/arts", &[("A9", "Wheel Throwing", "Free")]);
        site
    }

    pub(super) fn page(&self, url: &str, ready: &str, root: &str, nodes: Vec<ExtractedNode>) {
        self.pages.lock().expect("pages lock").insert(
            url.to_owned(),
            Page {
                ready: ready.to_owned(),
                root: root.to_owned(),
                nodes,
            },
        );
    }

    /// Replaces the listing table at `url`.
    pub(super) fn listings(&self, url: &str, rows: &[(&str, &str, &str)]) {
        let nodes = rows
            .iter()
            .map(|&(id, title, cost)| {
                ExtractedNode::from_pairs([("external_id", id), ("title", title), ("cost", cost)])
            })
            .collect();
        self.page(url, "table", "tr", nodes);
    }

    /// Navigations to `url` never complete.
    pub(super) fn hang_on(&self, url: &str) {
        self.hang_on
            .lock()
            .expect("hang lock")
            .insert(url.to_owned());
    }

    pub(super) fn factory(self: &Arc<Self>) -> Arc<dyn SessionFactory> {
        Arc::new(FakeFactory(Arc::clone(self)))
    }

    fn get(&self, url: &str) -> Option<Page> {
        self.pages.lock().expect("pages lock").get(url).cloned()
    }
}

struct FakeSession {
    site: Arc<FakeSite>,
    current: Option<Page>,
}

#[async_trait]
impl BrowserSession for FakeSession {
    async fn navigate(&mut self, url: &str, _timeout: Duration) -> Result<(), ScraperError> {
        let hangs = self.site.hang_on.lock().expect("hang lock").contains(url);
        if hangs {
            std::future::pending::<()>().await;
        }
        let page = self.site.get(url).ok_or_else(|| ScraperError::Navigation {
            url: url.to_owned(),
            reason: "404".to_owned(),
        })?;
        self.current = Some(page);
        Ok(())
    }

    async fn wait_for(&mut self, selector: &str, timeout: Duration) -> Result<(), ScraperError> {
        let rendered = self
            .current
            .as_ref()
            .is_some_and(|page| page.ready == selector || page.root == selector);
        if rendered {
            Ok(())
        } else {
            Err(ScraperError::WaitTimeout {
                selector: selector.to_owned(),
                timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
            })
        }
    }

    async fn click(
        &mut self,
        selector: &str,
        index: usize,
        _timeout: Duration,
    ) -> Result<(), ScraperError> {
        Err(ScraperError::Navigation {
            url: format!("{selector}[{index}]"),
            reason: "link-only site".to_owned(),
        })
    }

    async fn extract(
        &mut self,
        query: &ExtractQuery,
        _timeout: Duration,
    ) -> Result<Vec<ExtractedNode>, ScraperError> {
        Ok(self
            .current
            .as_ref()
            .filter(|page| page.root == query.root)
            .map(|page| page.nodes.clone())
            .unwrap_or_default())
    }

    async fn close(self: Box<Self>) {}
}

struct FakeFactory(Arc<FakeSite>);

#[async_trait]
impl SessionFactory for FakeFactory {
    async fn spawn(&self) -> Result<Box<dyn BrowserSession>, ScraperError> {
        Ok(Box::new(FakeSession {
            site: Arc::clone(&self.0),
            current: None,
        }))
    }
}

pub(super) fn providers() -> ProvidersFile {
    actsync_core::parse_providers(PROVIDERS).expect("valid providers")
}

pub(super) fn app_config() -> AppConfig {
    AppConfig {
        database_url: "postgres://unused".to_string(),
        env: Environment::Test,
        log_level: "info".to_string(),
        providers_path: PathBuf::from("./config/providers.yaml"),
        db_max_connections: 5,
        db_min_connections: 1,
        db_acquire_timeout_secs: 10,
        browser_max_sessions: 2,
        browser_acquire_timeout_secs: 120,
        browser_nav_timeout_secs: 5,
        browser_max_consecutive_failures: 3,
        browser_headless: true,
        chrome_path: None,
        scraper_max_retries: 0,
        scraper_retry_backoff_base_ms: 10,
        section_timeout_secs: 900,
        run_timeout_secs: 7200,
        retention_days: 365,
        zero_result_policy: ZeroResultPolicy::Fail,
        enrich_details: false,
    }
}
