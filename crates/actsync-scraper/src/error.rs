use thiserror::Error;

#[derive(Debug, Error)]
pub enum ScraperError {
    #[error("navigation to {url} timed out after {timeout_ms}ms")]
    NavigationTimeout { url: String, timeout_ms: u64 },

    #[error("timed out after {timeout_ms}ms waiting for \"{selector}\"")]
    WaitTimeout { selector: String, timeout_ms: u64 },

    #[error("navigation to {url} failed: {reason}")]
    Navigation { url: String, reason: String },

    #[error("browser protocol error: {0}")]
    Protocol(String),

    #[error("browser session crashed: {0}")]
    SessionCrashed(String),

    #[error("failed to launch browser: {0}")]
    Launch(String),

    #[error("timed out after {waited_ms}ms waiting for a free browser session")]
    PoolExhausted { waited_ms: u64 },

    #[error("browser pool is shut down")]
    PoolClosed,

    #[error("page structure changed at {level} level: {reason}")]
    SchemaDrift { level: &'static str, reason: String },

    #[error("unexpected extraction result for {context}: {source}")]
    Deserialize {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("section \"{section}\" exceeded its {timeout_secs}s ceiling")]
    SectionTimeout { section: String, timeout_secs: u64 },

    #[error("section \"{section}\" was cut off by the {deadline_secs}s run deadline")]
    RunDeadline { section: String, deadline_secs: u64 },

    #[error("section \"{section}\" failed after {attempts} attempt(s): {source}")]
    SectionExtraction {
        section: String,
        attempts: u32,
        #[source]
        source: Box<ScraperError>,
    },

    #[error("no sections discovered from {entry_points} entry point(s): {source}")]
    Discovery {
        entry_points: usize,
        #[source]
        source: Box<ScraperError>,
    },
}

impl ScraperError {
    /// Timeouts and failed page loads that may succeed on the same session
    /// if tried again.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ScraperError::NavigationTimeout { .. }
                | ScraperError::WaitTimeout { .. }
                | ScraperError::Navigation { .. }
        )
    }

    /// Whether the session that produced this error should be destroyed
    /// rather than returned to the pool.
    ///
    /// Schema drift and malformed extraction results are properties of the
    /// page, not the browser, so the session stays healthy.
    #[must_use]
    pub fn needs_recycle(&self) -> bool {
        !matches!(
            self,
            ScraperError::SchemaDrift { .. } | ScraperError::Deserialize { .. }
        )
    }

    /// Whether a section that failed with this error is worth one more
    /// attempt on a fresh session.
    ///
    /// A section that already ran into its ceiling is not requeued.
    #[must_use]
    pub fn is_requeueable(&self) -> bool {
        !matches!(
            self,
            ScraperError::SchemaDrift { .. }
                | ScraperError::Deserialize { .. }
                | ScraperError::PoolClosed
                | ScraperError::SectionTimeout { .. }
                | ScraperError::RunDeadline { .. }
        )
    }
}
