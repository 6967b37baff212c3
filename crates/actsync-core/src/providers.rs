//! Provider definitions loaded from `config/providers.yaml`.
//!
//! Each provider carries the entry URLs of its activity catalogue and a
//! versioned [`TraversalSchema`] describing how to find each menu level in
//! the client-rendered page. The navigator consumes the schema; nothing about
//! a provider's menu structure is hardcoded.

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::ConfigError;

/// The only traversal schema version this build knows how to execute.
pub const SUPPORTED_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub name: String,
    /// Explicit slug; derived from `name` when absent.
    #[serde(default)]
    pub slug: Option<String>,
    pub entry_urls: Vec<String>,
    pub schema: TraversalSchema,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

fn default_true() -> bool {
    true
}

impl ProviderConfig {
    /// The explicit slug if configured, otherwise a URL-safe slug generated
    /// from the provider name.
    #[must_use]
    pub fn slug(&self) -> String {
        if let Some(slug) = self.slug.as_deref().filter(|s| !s.trim().is_empty()) {
            return slug.trim().to_string();
        }
        self.name
            .to_lowercase()
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' {
                    c
                } else if c == ' ' {
                    '-'
                } else {
                    '\0'
                }
            })
            .filter(|&c| c != '\0')
            .collect::<String>()
            .split('-')
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join("-")
    }
}

/// How to locate one value inside a matched node.
///
/// `selector = None` means the node itself; `attr = None` means its trimmed
/// text content.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSelector {
    #[serde(default)]
    pub selector: Option<String>,
    #[serde(default)]
    pub attr: Option<String>,
}

/// How a menu item is opened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StepAction {
    /// Follow a URL read from an attribute of the item (default `href`).
    Link {
        #[serde(default = "default_href")]
        attr: String,
    },
    /// Click the n-th item matching the level's item selector.
    Click,
}

fn default_href() -> String {
    "href".to_string()
}

impl Default for StepAction {
    fn default() -> Self {
        StepAction::Link {
            attr: default_href(),
        }
    }
}

/// One level of the provider's menu (sections or subsections).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelSchema {
    /// Selector that must be present before the level is considered rendered.
    pub ready: String,
    /// Selector matching every menu item of this level.
    pub item: String,
    #[serde(default)]
    pub label: FieldSelector,
    #[serde(default)]
    pub action: StepAction,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListingFields {
    pub external_id: FieldSelector,
    pub title: FieldSelector,
    #[serde(default)]
    pub cost: Option<FieldSelector>,
    #[serde(default)]
    pub age: Option<FieldSelector>,
    #[serde(default)]
    pub schedule: Option<FieldSelector>,
    #[serde(default)]
    pub dates: Option<FieldSelector>,
    #[serde(default)]
    pub location: Option<FieldSelector>,
    #[serde(default)]
    pub status: Option<FieldSelector>,
    #[serde(default)]
    pub detail_url: Option<FieldSelector>,
    #[serde(default)]
    pub registration_url: Option<FieldSelector>,
}

/// The listing table rendered for a leaf menu entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListingSchema {
    pub ready: String,
    pub row: String,
    pub fields: ListingFields,
}

/// Optional per-listing detail page. Every field is optional; whatever is
/// found overrides the summary row.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetailFields {
    #[serde(default)]
    pub title: Option<FieldSelector>,
    #[serde(default)]
    pub cost: Option<FieldSelector>,
    #[serde(default)]
    pub age: Option<FieldSelector>,
    #[serde(default)]
    pub schedule: Option<FieldSelector>,
    #[serde(default)]
    pub dates: Option<FieldSelector>,
    #[serde(default)]
    pub location: Option<FieldSelector>,
    #[serde(default)]
    pub status: Option<FieldSelector>,
    #[serde(default)]
    pub registration_url: Option<FieldSelector>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetailSchema {
    pub ready: String,
    /// Node the field selectors are evaluated against; defaults to `body`.
    #[serde(default = "default_body")]
    pub root: String,
    pub fields: DetailFields,
}

fn default_body() -> String {
    "body".to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraversalSchema {
    pub version: u32,
    pub sections: LevelSchema,
    /// Absent when a section page shows its listings directly.
    #[serde(default)]
    pub subsections: Option<LevelSchema>,
    pub listings: ListingSchema,
    #[serde(default)]
    pub detail: Option<DetailSchema>,
}

#[derive(Debug, Deserialize)]
pub struct ProvidersFile {
    pub providers: Vec<ProviderConfig>,
}

impl ProvidersFile {
    /// Look up a provider by slug.
    #[must_use]
    pub fn find(&self, slug: &str) -> Option<&ProviderConfig> {
        self.providers.iter().find(|p| p.slug() == slug)
    }
}

/// Load and validate the providers configuration from a YAML file.
///
/// # Errors
///
/// Returns `ConfigError` if the file cannot be read, parsed, or fails validation.
pub fn load_providers(path: &Path) -> Result<ProvidersFile, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ProvidersFileIo {
        path: path.display().to_string(),
        source: e,
    })?;
    parse_providers(&content)
}

/// Parse and validate providers YAML from a string.
///
/// # Errors
///
/// Returns `ConfigError` if the YAML is malformed or fails validation.
pub fn parse_providers(content: &str) -> Result<ProvidersFile, ConfigError> {
    let file: ProvidersFile = serde_yaml::from_str(content)?;
    validate_providers(&file)?;
    Ok(file)
}

fn validate_providers(file: &ProvidersFile) -> Result<(), ConfigError> {
    let mut seen_slugs = HashSet::new();

    for provider in &file.providers {
        if provider.name.trim().is_empty() {
            return Err(ConfigError::Validation(
                "provider name must be non-empty".to_string(),
            ));
        }

        let slug = provider.slug();
        if slug.is_empty() {
            return Err(ConfigError::Validation(format!(
                "provider '{}' produces an empty slug",
                provider.name
            )));
        }
        if !seen_slugs.insert(slug.clone()) {
            return Err(ConfigError::Validation(format!(
                "duplicate provider slug: '{slug}' (from provider '{}')",
                provider.name
            )));
        }

        if provider.entry_urls.is_empty() {
            return Err(ConfigError::Validation(format!(
                "provider '{slug}' has no entry_urls"
            )));
        }
        for url in &provider.entry_urls {
            if !(url.starts_with("https://") || url.starts_with("http://")) {
                return Err(ConfigError::Validation(format!(
                    "provider '{slug}' entry url \"{url}\" is not an http(s) URL"
                )));
            }
        }

        validate_schema(&slug, &provider.schema)?;
    }

    Ok(())
}

fn validate_schema(slug: &str, schema: &TraversalSchema) -> Result<(), ConfigError> {
    if schema.version != SUPPORTED_SCHEMA_VERSION {
        return Err(ConfigError::Validation(format!(
            "provider '{slug}' uses traversal schema v{}; this build supports v{SUPPORTED_SCHEMA_VERSION}",
            schema.version
        )));
    }

    let mut selectors = vec![
        ("sections.ready", schema.sections.ready.as_str()),
        ("sections.item", schema.sections.item.as_str()),
        ("listings.ready", schema.listings.ready.as_str()),
        ("listings.row", schema.listings.row.as_str()),
    ];
    if let Some(sub) = &schema.subsections {
        selectors.push(("subsections.ready", sub.ready.as_str()));
        selectors.push(("subsections.item", sub.item.as_str()));
    }
    if let Some(detail) = &schema.detail {
        selectors.push(("detail.ready", detail.ready.as_str()));
    }

    for (name, value) in selectors {
        if value.trim().is_empty() {
            return Err(ConfigError::Validation(format!(
                "provider '{slug}' has an empty selector for {name}"
            )));
        }
    }

    Ok(())
}

#[cfg(test)]
#[path = "providers_test.rs"]
mod tests;
