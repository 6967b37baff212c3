//! Conversion of raw listing text into typed [`NormalizedActivity`] values.
//!
//! Every function here is pure. A field that cannot be parsed is nulled and
//! reported as a [`FieldWarning`]; the record is kept. Only a missing
//! identity (external id or name) drops the record.

mod age;
mod cost;
mod dates;
mod schedule;
mod status;

use std::fmt;

use thiserror::Error;

use actsync_core::{NormalizedActivity, RegistrationStatus};

use crate::types::{ListingSource, RawListing};

/// Reason a single field could not be interpreted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct FieldParseError(String);

impl FieldParseError {
    pub(crate) fn new(reason: impl Into<String>) -> Self {
        Self(reason.into())
    }
}

/// A non-fatal parse failure attached to a normalized record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldWarning {
    pub field: &'static str,
    pub raw: String,
    pub reason: FieldParseError,
}

impl fmt::Display for FieldWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {} (\"{}\")", self.field, self.reason, self.raw)
    }
}

/// The listing cannot be identified, so it cannot be reconciled.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdentityError {
    #[error("listing \"{}\" has no external id", .title.as_deref().unwrap_or("<untitled>"))]
    MissingExternalId { title: Option<String> },

    #[error("listing {external_id} has no name")]
    MissingName { external_id: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedListing {
    pub activity: NormalizedActivity,
    pub source: ListingSource,
    pub warnings: Vec<FieldWarning>,
}

/// Collapses runs of whitespace and drops empty strings.
fn clean(text: Option<&str>) -> Option<String> {
    let joined = text?.split_whitespace().collect::<Vec<_>>().join(" ");
    if joined.is_empty() {
        None
    } else {
        Some(joined)
    }
}

struct FieldParser<'a> {
    warnings: &'a mut Vec<FieldWarning>,
}

impl FieldParser<'_> {
    /// Runs `parse` on `raw` when present, recording a warning on failure.
    fn field<T>(
        &mut self,
        field: &'static str,
        raw: Option<&str>,
        parse: impl FnOnce(&str) -> Result<T, FieldParseError>,
    ) -> Option<T> {
        let raw = clean(raw)?;
        match parse(&raw) {
            Ok(value) => Some(value),
            Err(reason) => {
                self.warnings.push(FieldWarning { field, raw, reason });
                None
            }
        }
    }
}

/// Normalizes one raw listing.
///
/// # Errors
///
/// Returns [`IdentityError`] when the listing has no external id or no name.
pub fn normalize_listing(raw: &RawListing) -> Result<NormalizedListing, IdentityError> {
    let external_id = clean(raw.external_id.as_deref()).ok_or_else(|| {
        IdentityError::MissingExternalId {
            title: clean(raw.title_text.as_deref()),
        }
    })?;
    let name = clean(raw.title_text.as_deref()).ok_or_else(|| IdentityError::MissingName {
        external_id: external_id.clone(),
    })?;

    let mut warnings = Vec::new();
    let mut p = FieldParser {
        warnings: &mut warnings,
    };

    let cost_amount = p.field("cost", raw.raw_cost_text.as_deref(), cost::parse_cost);
    let (age_min, age_max) = p
        .field("age", raw.raw_age_text.as_deref(), age::parse_age_range)
        .unwrap_or((None, None));
    let sched = p
        .field(
            "schedule",
            raw.raw_schedule_text.as_deref(),
            schedule::parse_schedule,
        )
        .unwrap_or_default();
    let (date_start, date_end) = p
        .field("dates", raw.raw_date_text.as_deref(), dates::parse_date_range)
        .unwrap_or((None, None));
    let registration_status = p
        .field(
            "status",
            raw.registration_status_text.as_deref(),
            status::parse_status,
        )
        .unwrap_or(RegistrationStatus::Unknown);

    let activity = NormalizedActivity {
        external_id,
        name,
        category: raw.section_path.first().cloned(),
        subcategory: raw.section_path.get(1).cloned(),
        cost_amount,
        age_min,
        age_max,
        schedule_days: sched.days,
        start_time: sched.start,
        end_time: sched.end,
        date_start,
        date_end,
        location_name: clean(raw.raw_location_text.as_deref()),
        registration_status,
        registration_url: clean(raw.registration_url.as_deref()),
    };

    Ok(NormalizedListing {
        activity,
        source: raw.source,
        warnings,
    })
}

#[cfg(test)]
#[path = "normalize_test.rs"]
mod tests;
