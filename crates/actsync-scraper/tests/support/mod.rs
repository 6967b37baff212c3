//! Scripted in-memory browser used by the pool and navigator tests.
//!
//! A [`FakeSite`] is a set of pages keyed by URL (or by any string for pages
//! only reachable by clicking). Each page declares which selectors are
//! rendered, which nodes an extraction rooted at a selector returns, and
//! where clicks lead. Failures can be injected per URL.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use actsync_scraper::{BrowserSession, ExtractQuery, ExtractedNode, ScraperError, SessionFactory};

#[derive(Debug, Default, Clone)]
pub struct FakePage {
    ready: HashSet<String>,
    nodes: HashMap<String, Vec<ExtractedNode>>,
    clicks: HashMap<(String, usize), String>,
}

impl FakePage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ready(mut self, selector: &str) -> Self {
        self.ready.insert(selector.to_owned());
        self
    }

    /// Marks `root` as rendered and sets the nodes an extraction returns.
    pub fn nodes(mut self, root: &str, nodes: Vec<ExtractedNode>) -> Self {
        self.ready.insert(root.to_owned());
        self.nodes.insert(root.to_owned(), nodes);
        self
    }

    pub fn click(mut self, selector: &str, index: usize, target: &str) -> Self {
        self.clicks
            .insert((selector.to_owned(), index), target.to_owned());
        self
    }
}

#[derive(Default)]
pub struct FakeSite {
    pages: Mutex<HashMap<String, FakePage>>,
    crash_on: Mutex<HashMap<String, u32>>,
    timeout_on: Mutex<HashMap<String, u32>>,
    hang_on: Mutex<HashSet<String>>,
    pub navigations: AtomicUsize,
}

impl FakeSite {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn page(&self, key: &str, page: FakePage) {
        self.pages
            .lock()
            .expect("pages lock")
            .insert(key.to_owned(), page);
    }

    /// The next `times` navigations to `url` report a crashed session.
    pub fn crash_on(&self, url: &str, times: u32) {
        self.crash_on
            .lock()
            .expect("crash lock")
            .insert(url.to_owned(), times);
    }

    /// The next `times` navigations to `url` time out.
    pub fn timeout_on(&self, url: &str, times: u32) {
        self.timeout_on
            .lock()
            .expect("timeout lock")
            .insert(url.to_owned(), times);
    }

    /// Navigations to `url` never complete.
    pub fn hang_on(&self, url: &str) {
        self.hang_on
            .lock()
            .expect("hang lock")
            .insert(url.to_owned());
    }

    fn take_injected(map: &Mutex<HashMap<String, u32>>, url: &str) -> bool {
        let mut guard = map.lock().expect("injection lock");
        match guard.get_mut(url) {
            Some(remaining) if *remaining > 0 => {
                *remaining -= 1;
                true
            }
            _ => false,
        }
    }

    fn get(&self, key: &str) -> Option<FakePage> {
        self.pages.lock().expect("pages lock").get(key).cloned()
    }
}

pub struct FakeSession {
    site: Arc<FakeSite>,
    current: Option<String>,
    closed: Arc<AtomicUsize>,
}

#[async_trait]
impl BrowserSession for FakeSession {
    async fn navigate(&mut self, url: &str, timeout: Duration) -> Result<(), ScraperError> {
        self.site.navigations.fetch_add(1, Ordering::SeqCst);
        let hangs = self.site.hang_on.lock().expect("hang lock").contains(url);
        if hangs {
            std::future::pending::<()>().await;
        }
        if FakeSite::take_injected(&self.site.crash_on, url) {
            return Err(ScraperError::SessionCrashed(format!("crashed loading {url}")));
        }
        if FakeSite::take_injected(&self.site.timeout_on, url) {
            return Err(ScraperError::NavigationTimeout {
                url: url.to_owned(),
                timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
            });
        }
        if self.site.get(url).is_none() {
            return Err(ScraperError::Navigation {
                url: url.to_owned(),
                reason: "404".to_owned(),
            });
        }
        self.current = Some(url.to_owned());
        Ok(())
    }

    async fn wait_for(&mut self, selector: &str, timeout: Duration) -> Result<(), ScraperError> {
        let rendered = self
            .current
            .as_deref()
            .and_then(|key| self.site.get(key))
            .is_some_and(|page| page.ready.contains(selector));
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
        let target = self
            .current
            .as_deref()
            .and_then(|key| self.site.get(key))
            .and_then(|page| page.clicks.get(&(selector.to_owned(), index)).cloned());
        match target {
            Some(target) => {
                self.current = Some(target);
                Ok(())
            }
            None => Err(ScraperError::Navigation {
                url: format!("{selector}[{index}]"),
                reason: "click target not rendered".to_owned(),
            }),
        }
    }

    async fn extract(
        &mut self,
        query: &ExtractQuery,
        _timeout: Duration,
    ) -> Result<Vec<ExtractedNode>, ScraperError> {
        Ok(self
            .current
            .as_deref()
            .and_then(|key| self.site.get(key))
            .and_then(|page| page.nodes.get(&query.root).cloned())
            .unwrap_or_default())
    }

    async fn close(self: Box<Self>) {
        self.closed.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Clone)]
pub struct FakeFactory {
    pub site: Arc<FakeSite>,
    pub spawned: Arc<AtomicUsize>,
    pub closed: Arc<AtomicUsize>,
}

impl FakeFactory {
    pub fn new(site: Arc<FakeSite>) -> Self {
        Self {
            site,
            spawned: Arc::new(AtomicUsize::new(0)),
            closed: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn spawned(&self) -> usize {
        self.spawned.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SessionFactory for FakeFactory {
    async fn spawn(&self) -> Result<Box<dyn BrowserSession>, ScraperError> {
        self.spawned.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeSession {
            site: Arc::clone(&self.site),
            current: None,
            closed: Arc::clone(&self.closed),
        }))
    }
}

pub fn node<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> ExtractedNode {
    ExtractedNode::from_pairs(pairs)
}
