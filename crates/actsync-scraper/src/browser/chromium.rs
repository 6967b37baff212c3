//! Chromium-backed [`BrowserSession`] using chromiumoxide.
//!
//! Every session is its own browser process with a single page, so a crash
//! or hang takes down exactly one pool slot.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::error::CdpError;
use chromiumoxide::page::Page;
use futures::StreamExt;
use tokio::task::JoinHandle;

use super::{BrowserSession, ExtractQuery, ExtractedNode, SessionFactory};
use crate::error::ScraperError;

/// Interval between DOM polls while waiting for a selector.
const WAIT_POLL_INTERVAL: Duration = Duration::from_millis(200);

#[derive(Debug, Clone)]
pub struct ChromiumOptions {
    pub executable: Option<PathBuf>,
    pub headless: bool,
    pub user_agent: Option<String>,
}

impl Default for ChromiumOptions {
    fn default() -> Self {
        Self {
            executable: None,
            headless: true,
            user_agent: None,
        }
    }
}

impl ChromiumOptions {
    #[must_use]
    pub fn from_app_config(config: &actsync_core::AppConfig) -> Self {
        Self {
            executable: config.chrome_path.clone(),
            headless: config.browser_headless,
            user_agent: None,
        }
    }
}

/// Launches one Chromium process per session.
pub struct ChromiumFactory {
    options: ChromiumOptions,
}

impl ChromiumFactory {
    #[must_use]
    pub fn new(options: ChromiumOptions) -> Self {
        Self { options }
    }

    fn browser_config(&self) -> Result<BrowserConfig, ScraperError> {
        let mut builder = BrowserConfig::builder()
            .arg("--disable-gpu")
            .arg("--no-sandbox")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-extensions")
            .arg("--disable-background-networking");

        builder = if self.options.headless {
            builder.arg("--headless=new")
        } else {
            builder.with_head()
        };

        if let Some(path) = &self.options.executable {
            builder = builder.chrome_executable(path);
        }
        if let Some(ua) = &self.options.user_agent {
            builder = builder.arg(format!("--user-agent={ua}"));
        }

        builder
            .build()
            .map_err(|e| ScraperError::Launch(format!("invalid browser config: {e}")))
    }
}

#[async_trait]
impl SessionFactory for ChromiumFactory {
    async fn spawn(&self) -> Result<Box<dyn BrowserSession>, ScraperError> {
        let config = self.browser_config()?;
        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| ScraperError::Launch(e.to_string()))?;

        // The CDP handler must be polled for the browser to make progress.
        // When it ends the browser is gone and every call fails fast.
        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    tracing::debug!(error = %e, "chromium handler event error");
                }
            }
        });

        let page = match browser.new_page("about:blank").await {
            Ok(page) => page,
            Err(e) => {
                handler_task.abort();
                return Err(ScraperError::Launch(format!("failed to open page: {e}")));
            }
        };

        Ok(Box::new(ChromiumSession {
            browser,
            page,
            handler_task,
        }))
    }
}

pub struct ChromiumSession {
    browser: Browser,
    page: Page,
    handler_task: JoinHandle<()>,
}

impl ChromiumSession {
    async fn evaluate<T: serde::de::DeserializeOwned>(
        &self,
        script: String,
        timeout: Duration,
        context: &str,
    ) -> Result<T, ScraperError> {
        let result = tokio::time::timeout(timeout, self.page.evaluate(script))
            .await
            .map_err(|_| ScraperError::Protocol(format!("{context}: evaluation timed out")))?
            .map_err(map_cdp_error)?;

        result
            .into_value::<T>()
            .map_err(|source| ScraperError::Deserialize {
                context: context.to_owned(),
                source,
            })
    }
}

#[async_trait]
impl BrowserSession for ChromiumSession {
    async fn navigate(&mut self, url: &str, timeout: Duration) -> Result<(), ScraperError> {
        let timeout_ms = millis(timeout);
        let load = async {
            self.page.goto(url).await?;
            self.page.wait_for_navigation().await?;
            Ok::<(), CdpError>(())
        };

        match tokio::time::timeout(timeout, load).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => match map_cdp_error(e) {
                ScraperError::Protocol(reason) => Err(ScraperError::Navigation {
                    url: url.to_owned(),
                    reason,
                }),
                other => Err(other),
            },
            Err(_) => Err(ScraperError::NavigationTimeout {
                url: url.to_owned(),
                timeout_ms,
            }),
        }
    }

    async fn wait_for(&mut self, selector: &str, timeout: Duration) -> Result<(), ScraperError> {
        let deadline = Instant::now() + timeout;
        let script = presence_script(selector);
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(ScraperError::WaitTimeout {
                    selector: selector.to_owned(),
                    timeout_ms: millis(timeout),
                });
            }
            let present: bool = self
                .evaluate(script.clone(), remaining, "selector presence")
                .await?;
            if present {
                return Ok(());
            }
            tokio::time::sleep(WAIT_POLL_INTERVAL.min(remaining)).await;
        }
    }

    async fn click(
        &mut self,
        selector: &str,
        index: usize,
        timeout: Duration,
    ) -> Result<(), ScraperError> {
        let clicked: bool = self
            .evaluate(click_script(selector, index), timeout, "menu click")
            .await?;
        if clicked {
            Ok(())
        } else {
            Err(ScraperError::Navigation {
                url: format!("{selector}[{index}]"),
                reason: "click target not rendered".to_owned(),
            })
        }
    }

    async fn extract(
        &mut self,
        query: &ExtractQuery,
        timeout: Duration,
    ) -> Result<Vec<ExtractedNode>, ScraperError> {
        self.evaluate(extract_script(query), timeout, &query.root)
            .await
    }

    async fn close(self: Box<Self>) {
        let ChromiumSession {
            mut browser,
            page,
            handler_task,
        } = *self;
        if let Err(e) = page.close().await {
            tracing::debug!(error = %e, "failed to close chromium page");
        }
        if let Err(e) = browser.close().await {
            tracing::debug!(error = %e, "failed to close chromium browser");
        }
        if let Err(e) = browser.wait().await {
            tracing::debug!(error = %e, "failed to reap chromium process");
        }
        handler_task.abort();
    }
}

fn map_cdp_error(err: CdpError) -> ScraperError {
    match err {
        CdpError::Ws(_) | CdpError::NoResponse | CdpError::ChannelSendError(_) => {
            ScraperError::SessionCrashed(err.to_string())
        }
        other => ScraperError::Protocol(other.to_string()),
    }
}

fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

/// Encodes a Rust string as a JavaScript string literal.
fn js_string(s: &str) -> String {
    serde_json::Value::String(s.to_owned()).to_string()
}

fn presence_script(selector: &str) -> String {
    format!("document.querySelector({}) !== null", js_string(selector))
}

fn click_script(selector: &str, index: usize) -> String {
    format!(
        "(() => {{ const els = document.querySelectorAll({sel}); \
         if (els.length <= {index}) return false; \
         els[{index}].scrollIntoView({{block: 'center'}}); \
         els[{index}].click(); return true; }})()",
        sel = js_string(selector),
    )
}

fn extract_script(query: &ExtractQuery) -> String {
    let fields: Vec<serde_json::Value> = query
        .fields
        .iter()
        .map(|f| {
            serde_json::json!({
                "name": f.name,
                "selector": f.selector,
                "attr": f.attr,
            })
        })
        .collect();
    let fields = serde_json::Value::Array(fields).to_string();

    format!(
        r"(() => {{
  const fields = {fields};
  const read = (el, f) => {{
    const target = f.selector ? el.querySelector(f.selector) : el;
    if (!target) return null;
    if (!f.attr) return (target.innerText || target.textContent || '').trim();
    const raw = target.getAttribute(f.attr);
    if (raw === null) return null;
    if (f.attr === 'href' || f.attr === 'src') {{
      try {{ return new URL(raw, document.baseURI).href; }} catch (_) {{ return raw.trim(); }}
    }}
    return raw.trim();
  }};
  return Array.from(document.querySelectorAll({root})).map((el) => {{
    const out = {{}};
    for (const f of fields) out[f.name] = read(el, f);
    return out;
  }});
}})()",
        root = js_string(&query.root),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use actsync_core::FieldSelector;

    #[test]
    fn js_string_escapes_quotes() {
        assert_eq!(js_string(r#"a[href="x"]"#), r#""a[href=\"x\"]""#);
    }

    #[test]
    fn extract_script_embeds_root_and_fields() {
        let query = ExtractQuery::new("tr.course").field(
            "external_id",
            &FieldSelector {
                selector: Some(".barcode".to_owned()),
                attr: None,
            },
        );
        let script = extract_script(&query);
        assert!(script.contains(r#"document.querySelectorAll("tr.course")"#));
        assert!(script.contains(r#""name":"external_id""#));
        assert!(script.contains(r#""selector":".barcode""#));
    }

    #[test]
    fn click_script_targets_index() {
        let script = click_script(".bm-category", 3);
        assert!(script.contains(r#"document.querySelectorAll(".bm-category")"#));
        assert!(script.contains("els[3].click()"));
    }

    #[tokio::test]
    #[ignore = "requires a local Chromium install"]
    async fn chromium_session_extracts_rendered_nodes() {
        let factory = ChromiumFactory::new(ChromiumOptions::default());
        let mut session = factory.spawn().await.expect("failed to launch chromium");
        session
            .navigate(
                "data:text/html,<ul><li class='c'>Aquatics</li><li class='c'>Arts</li></ul>",
                Duration::from_secs(10),
            )
            .await
            .expect("navigation failed");
        session
            .wait_for("li.c", Duration::from_secs(5))
            .await
            .expect("wait failed");

        let nodes = session
            .extract(
                &ExtractQuery::new("li.c").field("label", &FieldSelector::default()),
                Duration::from_secs(5),
            )
            .await
            .expect("extract failed");
        let labels: Vec<_> = nodes.iter().filter_map(|n| n.get("label")).collect();
        assert_eq!(labels, vec!["Aquatics", "Arts"]);

        session.close().await;
    }
}
