//! Raw listing fragments produced by the navigator.
//!
//! Everything here is unparsed page text. Typed interpretation happens in
//! [`crate::normalize`].

use serde::Serialize;

/// Which page a listing's fields were read from.
///
/// Detail-page values take precedence over summary-row values when the
/// accumulator merges two sightings of the same listing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ListingSource {
    #[default]
    Summary,
    Detail,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RawListing {
    /// Menu labels from the top-level section down to the listing's leaf.
    pub section_path: Vec<String>,
    pub external_id: Option<String>,
    pub title_text: Option<String>,
    pub raw_cost_text: Option<String>,
    pub raw_age_text: Option<String>,
    pub raw_schedule_text: Option<String>,
    pub raw_date_text: Option<String>,
    pub raw_location_text: Option<String>,
    pub registration_status_text: Option<String>,
    pub detail_url: Option<String>,
    pub registration_url: Option<String>,
    pub source: ListingSource,
}
