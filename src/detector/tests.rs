use anyhow::bail;

use super::*;

fn row(keyword: &str, page_url: &str, clicks: u64, impressions: u64, position: f64) -> PerformanceRow {
    PerformanceRow {
        keyword: keyword.to_string(),
        page_url: page_url.to_string(),
        total_clicks: clicks,
        total_impressions: impressions,
        avg_position: position,
    }
}

#[test]
fn group_by_keyword_preserves_every_row_exactly_once() {
    let rows = vec![
        row("shoes", "/a", 1, 10, 2.0),
        row("boots", "/b", 2, 20, 3.0),
        row("shoes", "/c", 3, 30, 4.0),
        row("sandals", "/d", 4, 40, 5.0),
    ];

    let grouped = group_by_keyword(rows.clone());

    let total: usize = grouped.values().map(Vec::len).sum();
    assert_eq!(total, rows.len());
    assert_eq!(grouped.len(), 3);
    assert!(grouped["shoes"].iter().all(|r| r.keyword == "shoes"));
    assert_eq!(grouped["shoes"].len(), 2);
    assert_eq!(grouped["boots"].len(), 1);
}

#[test]
fn group_by_keyword_empty_input_produces_empty_mapping() {
    assert!(group_by_keyword(Vec::new()).is_empty());
}

#[test]
fn single_page_keyword_is_never_flagged() {
    let rows = vec![row("shoes", "/only", 500, 50_000, 1.0)];
    let finding = evaluate_group("shoes", &rows, &DetectionThresholds::default());
    assert!(finding.is_none());
}

#[test]
fn group_below_impression_floor_is_never_flagged() {
    // Tight position range would trip signal 1, but the eligibility gate
    // runs first.
    let rows = vec![row("shoes", "/a", 2, 5, 2.0), row("shoes", "/b", 1, 4, 2.5)];
    let finding = evaluate_group("shoes", &rows, &DetectionThresholds::default());
    assert!(finding.is_none());
}

#[test]
fn eligible_group_with_no_signal_produces_no_finding() {
    // Range 29 > 20, concentration 0.9 >= 0.3, 50 impressions <= 100.
    let rows = vec![
        row("shoes", "/a", 90, 40, 1.0),
        row("shoes", "/b", 10, 10, 30.0),
    ];
    let finding = evaluate_group("shoes", &rows, &DetectionThresholds::default());
    assert!(finding.is_none());
}

#[test]
fn shoes_scenario_flags_high_severity_with_page_a_as_main() {
    let rows = vec![
        row("shoes", "https://example.com/a", 50, 2000, 3.2),
        row("shoes", "https://example.com/b", 45, 1800, 4.1),
    ];

    let finding =
        evaluate_group("shoes", &rows, &DetectionThresholds::default()).expect("finding");

    assert_eq!(finding.severity, Severity::High);
    assert_eq!(finding.page_urls[0], "https://example.com/a");
    assert_eq!(finding.total_clicks, 95);
    assert_eq!(finding.total_impressions, 3800);
    assert_eq!(finding.avg_position, 3.65);
    assert!((finding.click_concentration - 50.0 / 95.0).abs() < 1e-9);
    // Only the similar-positions signal fires; 0.526 concentration is
    // above the split threshold and CTR is 2.5%.
    assert_eq!(finding.reasons, vec![REASON_SIMILAR_POSITIONS.to_string()]);
}

#[test]
fn three_pages_with_tight_range_and_heavy_impressions_is_critical() {
    let rows = vec![
        row("boots", "/a", 30, 500, 2.0),
        row("boots", "/b", 25, 500, 6.0),
        row("boots", "/c", 20, 500, 10.0),
    ];

    let finding =
        evaluate_group("boots", &rows, &DetectionThresholds::default()).expect("finding");
    assert_eq!(finding.severity, Severity::Critical);
    assert_eq!(finding.position_range, 8.0);
}

#[test]
fn zero_click_group_reports_zero_concentration_and_skips_split_signal() {
    let rows = vec![
        row("boots", "/a", 0, 200, 3.0),
        row("boots", "/b", 0, 200, 4.0),
    ];

    let finding =
        evaluate_group("boots", &rows, &DetectionThresholds::default()).expect("finding");
    assert_eq!(finding.click_concentration, 0.0);
    // Signal 2 needs clicks; signals 1 and 3 both fire, in rule order.
    assert_eq!(
        finding.reasons,
        vec![
            REASON_SIMILAR_POSITIONS.to_string(),
            REASON_LOW_CTR.to_string()
        ]
    );
}

#[test]
fn split_clicks_signal_fires_below_concentration_threshold() {
    // Four pages, 25 clicks each: concentration is exactly 1/4.
    let rows = vec![
        row("hats", "/a", 25, 100, 1.0),
        row("hats", "/b", 25, 100, 30.0),
        row("hats", "/c", 25, 100, 60.0),
        row("hats", "/d", 25, 100, 90.0),
    ];

    let finding = evaluate_group("hats", &rows, &DetectionThresholds::default()).expect("finding");
    assert_eq!(finding.click_concentration, 0.25);
    assert!(finding
        .reasons
        .contains(&REASON_SPLIT_CLICKS.to_string()));
}

#[test]
fn click_concentration_is_one_when_a_single_page_holds_all_clicks() {
    let rows = vec![
        row("hats", "/a", 40, 3000, 2.0),
        row("hats", "/b", 0, 3000, 5.0),
    ];

    let finding = evaluate_group("hats", &rows, &DetectionThresholds::default()).expect("finding");
    assert_eq!(finding.click_concentration, 1.0);
}

#[test]
fn classify_severity_follows_ordered_rule_table() {
    assert_eq!(classify_severity(1000, 3, 10.0), Severity::Critical);
    assert_eq!(classify_severity(1500, 3, 8.0), Severity::Critical);
    // Two pages can never be critical.
    assert_eq!(classify_severity(5000, 2, 5.0), Severity::High);
    assert_eq!(classify_severity(999, 3, 5.0), Severity::High);
    assert_eq!(classify_severity(500, 2, 15.0), Severity::High);
    assert_eq!(classify_severity(499, 2, 15.0), Severity::Medium);
    assert_eq!(classify_severity(100, 2, 20.0), Severity::Medium);
    assert_eq!(classify_severity(99, 2, 25.0), Severity::Low);
    assert_eq!(classify_severity(10, 2, 30.0), Severity::Low);
    // Nothing matches: default low.
    assert_eq!(classify_severity(9, 1, 99.0), Severity::Low);
}

#[test]
fn ranking_breaks_click_ties_on_impressions_then_position() {
    let rows = vec![
        row("tie", "/worse-impressions", 10, 500, 2.0),
        row("tie", "/better-impressions", 10, 900, 3.0),
    ];
    let finding = evaluate_group("tie", &rows, &DetectionThresholds::default()).expect("finding");
    assert_eq!(finding.page_urls[0], "/better-impressions");

    let rows = vec![
        row("tie", "/worse-position", 10, 500, 4.0),
        row("tie", "/better-position", 10, 500, 2.0),
    ];
    let finding = evaluate_group("tie", &rows, &DetectionThresholds::default()).expect("finding");
    assert_eq!(finding.page_urls[0], "/better-position");
}

#[test]
fn recommendation_is_deterministic_and_names_main_and_competing_pages() {
    let rows = vec![
        row("shoes", "https://example.com/a", 50, 2000, 3.2),
        row("shoes", "https://example.com/b", 45, 1800, 4.1),
    ];
    let thresholds = DetectionThresholds::default();

    let first = evaluate_group("shoes", &rows, &thresholds).expect("finding");
    let second = evaluate_group("shoes", &rows, &thresholds).expect("finding");
    assert_eq!(first.recommendation, second.recommendation);

    let text = &first.recommendation;
    assert!(text.starts_with(
        "Main page candidate: https://example.com/a (clicks: 50, impressions: 2000, avg position: 3.2)"
    ));
    assert!(text.contains("Early action recommended"));
    assert!(text.contains("Competing pages:"));
    assert!(text.contains("- https://example.com/b (clicks: 45, position: 4.1)"));
}

#[test]
fn recommendation_guidance_block_matches_severity() {
    let ranked = vec![
        row("k", "/a", 50, 2000, 2.0),
        row("k", "/b", 40, 1500, 3.0),
    ];

    let critical = build_recommendation(&ranked, Severity::Critical);
    assert!(critical.contains("Urgent action recommended"));
    assert!(critical.contains("redirecting"));

    let medium = build_recommendation(&ranked, Severity::Medium);
    assert!(medium.contains("canonical tag"));

    let low = build_recommendation(&ranked, Severity::Low);
    assert!(low.contains("Monitoring recommended"));
    assert!(!low.contains("redirecting"));
}

struct MemoryStore {
    rows: Vec<PerformanceRow>,
    upserts: Vec<CannibalizationFinding>,
    summaries: Vec<AnalysisRunSummary>,
    fail_upserts: bool,
}

impl MemoryStore {
    fn with_rows(rows: Vec<PerformanceRow>) -> Self {
        Self {
            rows,
            upserts: Vec::new(),
            summaries: Vec::new(),
            fail_upserts: false,
        }
    }
}

impl RowSource for MemoryStore {
    fn fetch_rows(&self, _days: u32) -> Result<Vec<PerformanceRow>> {
        Ok(self.rows.clone())
    }
}

impl FindingSink for MemoryStore {
    fn upsert_finding(&mut self, finding: &CannibalizationFinding) -> Result<()> {
        if self.fail_upserts {
            bail!("sink unavailable");
        }
        self.upserts.push(finding.clone());
        Ok(())
    }

    fn record_run_summary(&mut self, summary: &AnalysisRunSummary) -> Result<()> {
        self.summaries.push(summary.clone());
        Ok(())
    }
}

#[test]
fn run_analysis_fails_with_no_data_on_empty_fetch() {
    let mut store = MemoryStore::with_rows(Vec::new());
    let err = run_analysis(&mut store, 28, &DetectionThresholds::default())
        .expect_err("empty fetch must fail");

    assert!(matches!(
        err.downcast_ref::<AnalysisError>(),
        Some(AnalysisError::NoData)
    ));
    assert!(store.upserts.is_empty());
    assert!(store.summaries.is_empty());
}

#[test]
fn run_analysis_persists_findings_and_one_summary() {
    let mut store = MemoryStore::with_rows(vec![
        row("shoes", "/a", 50, 2000, 3.2),
        row("shoes", "/b", 45, 1800, 4.1),
        row("solo", "/c", 10, 500, 1.0),
    ]);

    let outcome =
        run_analysis(&mut store, 28, &DetectionThresholds::default()).expect("analysis");

    assert_eq!(outcome.keywords_analyzed, 2);
    assert_eq!(outcome.findings_found, 1);
    assert_eq!(outcome.upsert_failures, 0);
    assert_eq!(store.upserts.len(), 1);
    assert_eq!(store.summaries.len(), 1);

    let summary = &store.summaries[0];
    assert_eq!(summary.analysis_type, "full_scan");
    assert_eq!(summary.total_keywords, 2);
    assert_eq!(summary.cannibalized_keywords, 1);
    assert_eq!(summary.affected_pages, 2);
    assert_eq!(summary.severity_breakdown.get("high"), Some(&1));
    assert_eq!(summary.top_findings.len(), 1);
}

#[test]
fn run_analysis_tolerates_upsert_failures() {
    let mut store = MemoryStore::with_rows(vec![
        row("shoes", "/a", 50, 2000, 3.2),
        row("shoes", "/b", 45, 1800, 4.1),
    ]);
    store.fail_upserts = true;

    let outcome =
        run_analysis(&mut store, 28, &DetectionThresholds::default()).expect("analysis");

    assert_eq!(outcome.findings_found, 1);
    assert_eq!(outcome.upsert_failures, 1);
    // History is still recorded after a failed upsert.
    assert_eq!(store.summaries.len(), 1);
}
