//! Integration tests for `Navigator` traversal over scripted sites.

mod support;

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;

use actsync_core::{
    DetailFields, DetailSchema, FieldSelector, LevelSchema, ListingFields, ListingSchema,
    StepAction, TraversalSchema,
};
use actsync_scraper::{
    BrowserPool, ListingSource, Navigator, NavigatorConfig, PoolConfig, RawListing, RetryPolicy,
    ScraperError, SectionReport,
};

use support::{node, FakeFactory, FakePage, FakeSite};

const REC: &str = "https://rec.test/";
const CC: &str = "https://cc.test/widget";

fn sel(selector: &str) -> FieldSelector {
    FieldSelector {
        selector: Some(selector.to_owned()),
        attr: None,
    }
}

fn listing_schema() -> ListingSchema {
    ListingSchema {
        ready: "div.results".to_owned(),
        row: "div.row".to_owned(),
        fields: ListingFields {
            external_id: sel(".id"),
            title: sel(".name"),
            cost: Some(sel(".fee")),
            age: None,
            schedule: None,
            dates: None,
            location: None,
            status: None,
            detail_url: Some(FieldSelector {
                selector: Some("a.name".to_owned()),
                attr: Some("href".to_owned()),
            }),
            registration_url: None,
        },
    }
}

fn link_schema() -> TraversalSchema {
    TraversalSchema {
        version: 1,
        sections: LevelSchema {
            ready: "nav.sections".to_owned(),
            item: "nav.sections a".to_owned(),
            label: FieldSelector::default(),
            action: StepAction::default(),
        },
        subsections: Some(LevelSchema {
            ready: "ul.sub".to_owned(),
            item: "ul.sub a".to_owned(),
            label: FieldSelector::default(),
            action: StepAction::default(),
        }),
        listings: listing_schema(),
        detail: None,
    }
}

fn click_schema() -> TraversalSchema {
    TraversalSchema {
        version: 1,
        sections: LevelSchema {
            ready: "#cats".to_owned(),
            item: "#cats .cat".to_owned(),
            label: FieldSelector::default(),
            action: StepAction::Click,
        },
        subsections: None,
        listings: listing_schema(),
        detail: None,
    }
}

fn row<'a>(id: &'a str, name: &'a str, fee: &'a str) -> [(&'a str, &'a str); 3] {
    [("external_id", id), ("title", name), ("cost", fee)]
}

/// Two sections; Aquatics has a populated and an empty subsection.
fn rec_site() -> Arc<FakeSite> {
    let site = FakeSite::new();
    site.page(
        REC,
        FakePage::new().ready("nav.sections").nodes(
            "nav.sections a",
            vec![
                node([("label", "Aquatics"), ("link", "https://rec.test/aquatics")]),
                node([("label", "Arts"), ("link", "https://rec.test/arts")]),
            ],
        ),
    );
    site.page(
        "https://rec.test/aquatics",
        FakePage::new().ready("ul.sub").nodes(
            "ul.sub a",
            vec![
                node([("label", "Swim Lessons"), ("link", "https://rec.test/aquatics/swim")]),
                node([("label", "Diving"), ("link", "https://rec.test/aquatics/diving")]),
            ],
        ),
    );
    site.page(
        "https://rec.test/aquatics/swim",
        FakePage::new().ready("div.results").nodes(
            "div.row",
            vec![
                node(row("A1", "Swim Kids 1", "$50.00")),
                node(row("A2", "Swim Kids 2", "$55.00")),
            ],
        ),
    );
    site.page(
        "https://rec.test/aquatics/diving",
        FakePage::new().ready("div.results").nodes("div.row", vec![]),
    );
    site.page(
        "https://rec.test/arts",
        FakePage::new().ready("ul.sub").nodes(
            "ul.sub a",
            vec![node([("label", "Pottery"), ("link", "https://rec.test/arts/pottery")])],
        ),
    );
    site.page(
        "https://rec.test/arts/pottery",
        FakePage::new()
            .ready("div.results")
            .nodes("div.row", vec![node(row("A9", "Wheel Throwing", "Free"))]),
    );
    site
}

fn config() -> NavigatorConfig {
    NavigatorConfig {
        nav_timeout: Duration::from_secs(1),
        retry: RetryPolicy::NONE,
        section_timeout: Duration::from_secs(60),
        enrich_details: true,
        max_concurrency: None,
    }
}

fn navigator(site: &Arc<FakeSite>, schema: TraversalSchema) -> (Navigator, FakeFactory) {
    let factory = FakeFactory::new(Arc::clone(site));
    let pool = BrowserPool::new(
        Arc::new(factory.clone()),
        PoolConfig {
            max_sessions: 2,
            acquire_timeout: Duration::from_secs(5),
            max_consecutive_failures: 3,
        },
    );
    (Navigator::new(pool, Arc::new(schema), config()), factory)
}

async fn run(nav: &Navigator, entry: &str) -> Vec<SectionReport> {
    let entries = vec![entry.to_owned()];
    nav.traverse(&entries).collect().await
}

fn report<'a>(reports: &'a [SectionReport], label: &str) -> &'a SectionReport {
    reports
        .iter()
        .find(|r| r.label() == label)
        .unwrap_or_else(|| panic!("no report for {label}"))
}

fn listings(report: &SectionReport) -> &[RawListing] {
    report.outcome.as_ref().expect("section should succeed")
}

// ---------------------------------------------------------------------------
// Happy paths
// ---------------------------------------------------------------------------

#[tokio::test]
async fn link_site_yields_every_listing_with_its_section_path() {
    let site = rec_site();
    let (nav, _) = navigator(&site, link_schema());
    let reports = run(&nav, REC).await;

    assert_eq!(reports.len(), 2);
    assert!(reports.iter().all(SectionReport::is_success));

    let aquatics = listings(report(&reports, "Aquatics"));
    let ids: Vec<_> = aquatics
        .iter()
        .filter_map(|l| l.external_id.as_deref())
        .collect();
    assert_eq!(ids, vec!["A1", "A2"]);
    assert_eq!(
        aquatics[0].section_path,
        vec!["Aquatics".to_owned(), "Swim Lessons".to_owned()]
    );
    assert_eq!(aquatics[0].raw_cost_text.as_deref(), Some("$50.00"));

    let arts = listings(report(&reports, "Arts"));
    assert_eq!(arts.len(), 1);
    assert_eq!(arts[0].title_text.as_deref(), Some("Wheel Throwing"));
}

#[tokio::test]
async fn click_site_replays_clicks_from_the_entry_page() {
    let site = FakeSite::new();
    site.page(
        CC,
        FakePage::new()
            .nodes(
                "#cats .cat",
                vec![node([("label", "Fitness")]), node([("label", "Dance")])],
            )
            .ready("#cats")
            .click("#cats .cat", 0, "cc:fitness")
            .click("#cats .cat", 1, "cc:dance"),
    );
    site.page(
        "cc:fitness",
        FakePage::new()
            .ready("div.results")
            .nodes("div.row", vec![node(row("F1", "Spin", "$12"))]),
    );
    site.page(
        "cc:dance",
        FakePage::new().ready("div.results").nodes(
            "div.row",
            vec![node(row("D1", "Salsa", "$20")), node(row("D2", "Tango", "$20"))],
        ),
    );

    let (nav, _) = navigator(&site, click_schema());
    let reports = run(&nav, CC).await;

    assert_eq!(reports.len(), 2);
    assert_eq!(listings(report(&reports, "Fitness")).len(), 1);
    let dance = listings(report(&reports, "Dance"));
    assert_eq!(dance.len(), 2);
    assert_eq!(dance[1].section_path, vec!["Dance".to_owned()]);
}

#[tokio::test]
async fn discover_sections_lists_top_level_entries() {
    let site = rec_site();
    let (nav, _) = navigator(&site, link_schema());
    let sections = nav.discover_sections(&[REC.to_owned()]).await.unwrap();
    let labels: Vec<_> = sections.iter().map(|s| s.label()).collect();
    assert_eq!(labels, vec!["Aquatics", "Arts"]);
    assert!(sections.iter().all(|s| s.entry_url == REC));
}

// ---------------------------------------------------------------------------
// Failure isolation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn crashed_section_is_requeued_once_on_a_fresh_session() {
    let site = rec_site();
    site.crash_on("https://rec.test/arts", 1);
    let (nav, factory) = navigator(&site, link_schema());
    let reports = run(&nav, REC).await;

    let arts = report(&reports, "Arts");
    assert!(arts.is_success());
    assert_eq!(arts.attempts, 2);
    assert!(arts.warnings.iter().any(|w| w.contains("requeued")));
    assert!(factory.closed() >= 1);
}

#[tokio::test]
async fn section_failing_twice_is_reported_and_others_survive() {
    let site = rec_site();
    site.crash_on("https://rec.test/arts", 2);
    let (nav, _) = navigator(&site, link_schema());
    let reports = run(&nav, REC).await;

    assert!(report(&reports, "Aquatics").is_success());
    let arts = report(&reports, "Arts");
    assert_eq!(arts.attempts, 2);
    assert!(matches!(
        arts.outcome,
        Err(ScraperError::SectionExtraction { attempts: 2, .. })
    ));
}

#[tokio::test]
async fn schema_drift_fails_the_section_without_requeue() {
    let site = rec_site();
    site.page(
        "https://rec.test/arts/pottery",
        FakePage::new()
            .ready("div.results")
            .nodes("div.row", vec![node([("cost", "$5")])]),
    );
    let (nav, _) = navigator(&site, link_schema());
    let reports = run(&nav, REC).await;

    let arts = report(&reports, "Arts");
    assert_eq!(arts.attempts, 1);
    match &arts.outcome {
        Err(ScraperError::SectionExtraction { source, .. }) => {
            assert!(matches!(
                **source,
                ScraperError::SchemaDrift {
                    level: "listings",
                    ..
                }
            ));
        }
        other => panic!("expected section extraction error, got {other:?}"),
    }
    assert!(report(&reports, "Aquatics").is_success());
}

#[tokio::test]
async fn row_without_external_id_is_dropped_with_warning() {
    let site = rec_site();
    site.page(
        "https://rec.test/arts/pottery",
        FakePage::new().ready("div.results").nodes(
            "div.row",
            vec![
                node(row("A9", "Wheel Throwing", "Free")),
                node([("title", "Glazing"), ("cost", "$10")]),
            ],
        ),
    );
    let (nav, _) = navigator(&site, link_schema());
    let reports = run(&nav, REC).await;

    let arts = report(&reports, "Arts");
    assert_eq!(listings(arts).len(), 1);
    assert_eq!(arts.warnings.len(), 1);
    assert!(arts.warnings[0].contains("Glazing"));
}

#[tokio::test(start_paused = true)]
async fn hung_section_hits_its_ceiling() {
    let site = rec_site();
    site.hang_on("https://rec.test/arts");
    let (nav, factory) = navigator(&site, link_schema());
    let reports = run(&nav, REC).await;

    assert!(report(&reports, "Aquatics").is_success());
    let arts = report(&reports, "Arts");
    assert_eq!(arts.attempts, 1);
    match &arts.outcome {
        Err(ScraperError::SectionExtraction { source, .. }) => {
            assert!(matches!(
                **source,
                ScraperError::SectionTimeout {
                    timeout_secs: 60,
                    ..
                }
            ));
        }
        other => panic!("expected section timeout, got {other:?}"),
    }
    assert!(factory.closed() >= 1);
}

#[tokio::test(start_paused = true)]
async fn run_deadline_cuts_off_unfinished_sections_and_keeps_finished_ones() {
    let site = rec_site();
    site.hang_on("https://rec.test/arts");
    let (nav, _) = navigator(&site, link_schema());
    let entries = vec![REC.to_owned()];
    let deadline = tokio::time::Instant::now() + Duration::from_secs(30);
    let reports: Vec<SectionReport> = nav.traverse_until(&entries, deadline).collect().await;

    assert_eq!(reports.len(), 2);
    let aquatics = listings(report(&reports, "Aquatics"));
    assert_eq!(aquatics.len(), 2);
    let arts = report(&reports, "Arts");
    match &arts.outcome {
        Err(ScraperError::RunDeadline {
            section,
            deadline_secs,
        }) => {
            assert_eq!(section, "Arts");
            assert_eq!(*deadline_secs, 30);
        }
        other => panic!("expected run deadline, got {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn run_deadline_during_discovery_yields_one_failure() {
    let site = rec_site();
    site.hang_on(REC);
    let (nav, _) = navigator(&site, link_schema());
    let entries = vec![REC.to_owned()];
    let deadline = tokio::time::Instant::now() + Duration::from_secs(30);
    let reports: Vec<SectionReport> = nav.traverse_until(&entries, deadline).collect().await;

    assert_eq!(reports.len(), 1);
    assert!(reports[0].section.is_none());
    assert!(matches!(
        reports[0].outcome,
        Err(ScraperError::RunDeadline { .. })
    ));
}

#[tokio::test]
async fn distant_run_deadline_changes_nothing() {
    let site = rec_site();
    let (nav, _) = navigator(&site, link_schema());
    let entries = vec![REC.to_owned()];
    let deadline = tokio::time::Instant::now() + Duration::from_secs(3600);
    let reports: Vec<SectionReport> = nav.traverse_until(&entries, deadline).collect().await;

    assert_eq!(reports.len(), 2);
    assert!(reports.iter().all(SectionReport::is_success));
}

#[tokio::test]
async fn unreachable_entry_yields_a_single_discovery_failure() {
    let site = rec_site();
    let (nav, _) = navigator(&site, link_schema());
    let reports = run(&nav, "https://nowhere.test/").await;

    assert_eq!(reports.len(), 1);
    assert!(reports[0].section.is_none());
    assert!(matches!(
        reports[0].outcome,
        Err(ScraperError::Discovery { entry_points: 1, .. })
    ));
}

#[tokio::test]
async fn unlabelled_sections_are_schema_drift() {
    let site = FakeSite::new();
    site.page(
        REC,
        FakePage::new()
            .ready("nav.sections")
            .nodes("nav.sections a", vec![node([("link", "https://rec.test/x")])]),
    );
    let (nav, _) = navigator(&site, link_schema());
    let err = nav.discover_sections(&[REC.to_owned()]).await.unwrap_err();
    match err {
        ScraperError::Discovery { source, .. } => {
            assert!(matches!(*source, ScraperError::SchemaDrift { level: "sections", .. }));
        }
        other => panic!("expected discovery error, got {other:?}"),
    }
}

// ---------------------------------------------------------------------------
// Detail enrichment
// ---------------------------------------------------------------------------

#[tokio::test]
async fn detail_pages_override_summary_and_missing_ones_warn() {
    let site = rec_site();
    site.page(
        "https://rec.test/aquatics/swim",
        FakePage::new().ready("div.results").nodes(
            "div.row",
            vec![
                node([
                    ("external_id", "A1"),
                    ("title", "Swim Kids 1"),
                    ("cost", "$50.00"),
                    ("detail_url", "https://rec.test/a/A1"),
                ]),
                node([
                    ("external_id", "A2"),
                    ("title", "Swim Kids 2"),
                    ("cost", "$55.00"),
                    ("detail_url", "https://rec.test/a/A2"),
                ]),
            ],
        ),
    );
    site.page(
        "https://rec.test/a/A1",
        FakePage::new().nodes("div.detail", vec![node([("cost", "$65.00")])]),
    );

    let mut schema = link_schema();
    schema.detail = Some(DetailSchema {
        ready: "div.detail".to_owned(),
        root: "div.detail".to_owned(),
        fields: DetailFields {
            cost: Some(sel(".fee")),
            ..DetailFields::default()
        },
    });
    let (nav, _) = navigator(&site, schema);
    let reports = run(&nav, REC).await;

    let aquatics = report(&reports, "Aquatics");
    let found = listings(aquatics);
    assert_eq!(found.len(), 2);

    assert_eq!(found[0].raw_cost_text.as_deref(), Some("$65.00"));
    assert_eq!(found[0].title_text.as_deref(), Some("Swim Kids 1"));
    assert_eq!(found[0].source, ListingSource::Detail);

    assert_eq!(found[1].raw_cost_text.as_deref(), Some("$55.00"));
    assert_eq!(found[1].source, ListingSource::Summary);
    assert_eq!(aquatics.warnings.len(), 1);
    assert!(aquatics.warnings[0].contains("A2"));
}
