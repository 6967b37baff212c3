//! Listing rows and detail-page enrichment.

use actsync_core::{DetailSchema, ListingSchema};

use crate::browser::{ExtractQuery, ExtractedNode};
use crate::error::ScraperError;
use crate::types::{ListingSource, RawListing};

const EXTERNAL_ID: &str = "external_id";
const TITLE: &str = "title";
const COST: &str = "cost";
const AGE: &str = "age";
const SCHEDULE: &str = "schedule";
const DATES: &str = "dates";
const LOCATION: &str = "location";
const STATUS: &str = "status";
const DETAIL_URL: &str = "detail_url";
const REGISTRATION_URL: &str = "registration_url";

pub(crate) fn listing_query(schema: &ListingSchema) -> ExtractQuery {
    let f = &schema.fields;
    ExtractQuery::new(schema.row.clone())
        .field(EXTERNAL_ID, &f.external_id)
        .field(TITLE, &f.title)
        .optional_field(COST, f.cost.as_ref())
        .optional_field(AGE, f.age.as_ref())
        .optional_field(SCHEDULE, f.schedule.as_ref())
        .optional_field(DATES, f.dates.as_ref())
        .optional_field(LOCATION, f.location.as_ref())
        .optional_field(STATUS, f.status.as_ref())
        .optional_field(DETAIL_URL, f.detail_url.as_ref())
        .optional_field(REGISTRATION_URL, f.registration_url.as_ref())
}

pub(crate) fn detail_query(schema: &DetailSchema) -> ExtractQuery {
    let f = &schema.fields;
    ExtractQuery::new(schema.root.clone())
        .optional_field(TITLE, f.title.as_ref())
        .optional_field(COST, f.cost.as_ref())
        .optional_field(AGE, f.age.as_ref())
        .optional_field(SCHEDULE, f.schedule.as_ref())
        .optional_field(DATES, f.dates.as_ref())
        .optional_field(LOCATION, f.location.as_ref())
        .optional_field(STATUS, f.status.as_ref())
        .optional_field(REGISTRATION_URL, f.registration_url.as_ref())
}

fn owned(node: &ExtractedNode, name: &str) -> Option<String> {
    node.get(name).map(str::to_owned)
}

/// Converts listing rows into raw listings tagged with `section_path`.
///
/// Rows without an external id are dropped with a warning. If rows matched
/// but none yielded an id or a title the listing table has changed shape.
///
/// # Errors
///
/// Returns [`ScraperError::SchemaDrift`] when no row carries an external id
/// or a title.
pub(crate) fn rows_to_listings(
    nodes: &[ExtractedNode],
    section_path: &[String],
    warnings: &mut Vec<String>,
) -> Result<Vec<RawListing>, ScraperError> {
    if !nodes.is_empty()
        && nodes
            .iter()
            .all(|n| n.get(EXTERNAL_ID).is_none() && n.get(TITLE).is_none())
    {
        return Err(ScraperError::SchemaDrift {
            level: "listings",
            reason: format!("{} row(s) matched but none had an id or title", nodes.len()),
        });
    }

    let mut listings = Vec::with_capacity(nodes.len());
    for (row, node) in nodes.iter().enumerate() {
        let Some(external_id) = owned(node, EXTERNAL_ID) else {
            let title = node.get(TITLE).unwrap_or("<untitled>");
            tracing::warn!(
                section = %section_path.join(" > "),
                row,
                title,
                "dropping listing row without external id"
            );
            warnings.push(format!(
                "{}: row {row} (\"{title}\") has no external id",
                section_path.join(" > ")
            ));
            continue;
        };

        listings.push(RawListing {
            section_path: section_path.to_vec(),
            external_id: Some(external_id),
            title_text: owned(node, TITLE),
            raw_cost_text: owned(node, COST),
            raw_age_text: owned(node, AGE),
            raw_schedule_text: owned(node, SCHEDULE),
            raw_date_text: owned(node, DATES),
            raw_location_text: owned(node, LOCATION),
            registration_status_text: owned(node, STATUS),
            detail_url: owned(node, DETAIL_URL),
            registration_url: owned(node, REGISTRATION_URL),
            source: ListingSource::Summary,
        });
    }
    Ok(listings)
}

/// Overlays detail-page values onto a summary listing.
///
/// Only fields the detail page actually produced replace summary values.
pub(crate) fn overlay_detail(summary: &RawListing, node: &ExtractedNode) -> RawListing {
    let pick = |name: &str, fallback: &Option<String>| owned(node, name).or_else(|| fallback.clone());
    RawListing {
        section_path: summary.section_path.clone(),
        external_id: summary.external_id.clone(),
        title_text: pick(TITLE, &summary.title_text),
        raw_cost_text: pick(COST, &summary.raw_cost_text),
        raw_age_text: pick(AGE, &summary.raw_age_text),
        raw_schedule_text: pick(SCHEDULE, &summary.raw_schedule_text),
        raw_date_text: pick(DATES, &summary.raw_date_text),
        raw_location_text: pick(LOCATION, &summary.raw_location_text),
        registration_status_text: pick(STATUS, &summary.registration_status_text),
        detail_url: summary.detail_url.clone(),
        registration_url: pick(REGISTRATION_URL, &summary.registration_url),
        source: ListingSource::Detail,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path() -> Vec<String> {
        vec!["Aquatics".to_owned(), "Swim Lessons".to_owned()]
    }

    #[test]
    fn rows_become_summary_listings() {
        let nodes = vec![ExtractedNode::from_pairs([
            ("external_id", "12345"),
            ("title", "Swim Kids 3"),
            ("cost", "$89.50"),
            ("detail_url", "https://x.test/a/12345"),
        ])];
        let mut warnings = Vec::new();
        let listings = rows_to_listings(&nodes, &path(), &mut warnings).unwrap();
        assert_eq!(listings.len(), 1);
        let l = &listings[0];
        assert_eq!(l.external_id.as_deref(), Some("12345"));
        assert_eq!(l.raw_cost_text.as_deref(), Some("$89.50"));
        assert_eq!(l.section_path, path());
        assert_eq!(l.source, ListingSource::Summary);
        assert!(warnings.is_empty());
    }

    #[test]
    fn row_without_external_id_is_dropped_with_warning() {
        let nodes = vec![
            ExtractedNode::from_pairs([("external_id", "1"), ("title", "A")]),
            ExtractedNode::from_pairs([("title", "B")]),
        ];
        let mut warnings = Vec::new();
        let listings = rows_to_listings(&nodes, &path(), &mut warnings).unwrap();
        assert_eq!(listings.len(), 1);
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("\"B\""));
    }

    #[test]
    fn rows_without_any_identity_are_drift() {
        let nodes = vec![ExtractedNode::from_pairs([("cost", "$5")])];
        let err = rows_to_listings(&nodes, &path(), &mut Vec::new()).unwrap_err();
        assert!(matches!(
            err,
            ScraperError::SchemaDrift {
                level: "listings",
                ..
            }
        ));
    }

    #[test]
    fn no_rows_is_empty_not_error() {
        let listings = rows_to_listings(&[], &path(), &mut Vec::new()).unwrap();
        assert!(listings.is_empty());
    }

    #[test]
    fn detail_overrides_only_present_fields() {
        let summary = RawListing {
            external_id: Some("1".to_owned()),
            title_text: Some("Swim".to_owned()),
            raw_cost_text: Some("$10".to_owned()),
            registration_status_text: Some("Open".to_owned()),
            ..RawListing::default()
        };
        let node = ExtractedNode::from_pairs([("cost", "$12.00"), ("status", "Full")]);
        let merged = overlay_detail(&summary, &node);
        assert_eq!(merged.title_text.as_deref(), Some("Swim"));
        assert_eq!(merged.raw_cost_text.as_deref(), Some("$12.00"));
        assert_eq!(merged.registration_status_text.as_deref(), Some("Full"));
        assert_eq!(merged.source, ListingSource::Detail);
    }
}
