pub mod accumulate;
pub mod browser;
pub mod error;
pub mod navigator;
pub mod normalize;
pub mod pool;
pub mod retry;
pub mod types;

pub use accumulate::ActivityAccumulator;
pub use browser::chromium::{ChromiumFactory, ChromiumOptions};
pub use browser::{BrowserSession, ExtractQuery, ExtractedNode, FieldQuery, SessionFactory};
pub use error::ScraperError;
pub use navigator::{
    extract_menu_level, MenuStep, Navigator, NavigatorConfig, Section, SectionReport, StepHandle,
};
pub use normalize::{
    normalize_listing, FieldParseError, FieldWarning, IdentityError, NormalizedListing,
};
pub use pool::{BrowserPool, PoolConfig, PoolStats, PooledSession};
pub use retry::{retry_with_backoff, RetryPolicy};
pub use types::{ListingSource, RawListing};
