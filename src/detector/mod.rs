use std::collections::{BTreeMap, BTreeSet};

use anyhow::Result;
use tracing::{debug, warn};

use crate::error::AnalysisError;
use crate::model::{
    AnalysisOutcome, AnalysisRunSummary, CannibalizationFinding, PerformanceRow, Severity,
};

#[cfg(test)]
mod tests;

/// Supplies the aggregated (keyword, page) rows for a trailing window of
/// `days`. Aggregation happens at the source; the detector only groups.
pub trait RowSource {
    fn fetch_rows(&self, days: u32) -> Result<Vec<PerformanceRow>>;
}

/// Persists findings and run history. Upserts must replace the existing
/// pending finding for a keyword rather than inserting a duplicate.
pub trait FindingSink {
    fn upsert_finding(&mut self, finding: &CannibalizationFinding) -> Result<()>;
    fn record_run_summary(&mut self, summary: &AnalysisRunSummary) -> Result<()>;
}

#[derive(Debug, Clone, Copy)]
pub struct DetectionThresholds {
    /// Minimum competing pages before a keyword is considered at all.
    pub min_pages: usize,
    /// Minimum summed impressions across the group.
    pub min_impressions: u64,
    /// Clicks count as "split" below this share on the busiest page.
    pub click_concentration: f64,
}

impl Default for DetectionThresholds {
    fn default() -> Self {
        Self {
            min_pages: 2,
            min_impressions: 10,
            click_concentration: 0.3,
        }
    }
}

const REASON_SIMILAR_POSITIONS: &str = "pages compete at similar rank positions";
const REASON_SPLIT_CLICKS: &str = "clicks are split across multiple pages";
const REASON_LOW_CTR: &str =
    "high impressions but low click-through rate suggests page-level competition";

/// Ordered severity rules: (tier, min impressions, min pages, max position
/// range). First match wins, checked top-down.
const SEVERITY_RULES: [(Severity, u64, usize, f64); 4] = [
    (Severity::Critical, 1000, 3, 10.0),
    (Severity::High, 500, 2, 15.0),
    (Severity::Medium, 100, 2, 20.0),
    (Severity::Low, 10, 2, 30.0),
];

/// Partitions rows by keyword. Lossless: every input row lands in exactly
/// one group.
pub fn group_by_keyword(rows: Vec<PerformanceRow>) -> BTreeMap<String, Vec<PerformanceRow>> {
    let mut grouped: BTreeMap<String, Vec<PerformanceRow>> = BTreeMap::new();

    for row in rows {
        grouped.entry(row.keyword.clone()).or_default().push(row);
    }

    grouped
}

/// Decides whether the pages competing for `keyword` cannibalize each other.
/// Returns `None` when the group fails an eligibility threshold or when no
/// detection signal fires.
pub fn evaluate_group(
    keyword: &str,
    rows: &[PerformanceRow],
    thresholds: &DetectionThresholds,
) -> Option<CannibalizationFinding> {
    if rows.len() < thresholds.min_pages {
        return None;
    }

    let total_impressions: u64 = rows.iter().map(|row| row.total_impressions).sum();
    if total_impressions < thresholds.min_impressions {
        return None;
    }

    let page_count = rows.len();
    let total_clicks: u64 = rows.iter().map(|row| row.total_clicks).sum();

    let avg_position =
        rows.iter().map(|row| row.avg_position).sum::<f64>() / page_count as f64;
    let min_position = rows
        .iter()
        .map(|row| row.avg_position)
        .fold(f64::INFINITY, f64::min);
    let max_position = rows
        .iter()
        .map(|row| row.avg_position)
        .fold(f64::NEG_INFINITY, f64::max);
    let position_range = max_position - min_position;

    let click_concentration = click_concentration(rows, total_clicks);
    let overall_ctr = if total_impressions > 0 {
        total_clicks as f64 / total_impressions as f64
    } else {
        0.0
    };

    // Independent OR'd signals; every matching reason is kept in rule order.
    let mut reasons = Vec::new();

    if position_range <= 20.0 && page_count >= 2 {
        reasons.push(REASON_SIMILAR_POSITIONS.to_string());
    }
    if click_concentration < thresholds.click_concentration && total_clicks > 0 {
        reasons.push(REASON_SPLIT_CLICKS.to_string());
    }
    if total_impressions > 100 && overall_ctr < 0.02 && page_count >= 2 {
        reasons.push(REASON_LOW_CTR.to_string());
    }

    if reasons.is_empty() {
        debug!(keyword, page_count, "eligible group, no signal fired");
        return None;
    }

    let severity = classify_severity(total_impressions, page_count, position_range);
    let ranked = rank_pages(rows);
    let recommendation = build_recommendation(&ranked, severity);
    let page_urls = ranked.iter().map(|row| row.page_url.clone()).collect();

    Some(CannibalizationFinding {
        keyword: keyword.to_string(),
        page_urls,
        severity,
        total_clicks,
        total_impressions,
        avg_position: round2(avg_position),
        reasons,
        position_range,
        click_concentration,
        recommendation,
    })
}

/// Share of the group's clicks held by its busiest page. 1.0 means fully
/// concentrated; values near 0 mean evenly spread. Zero-click groups
/// report 0.
fn click_concentration(rows: &[PerformanceRow], total_clicks: u64) -> f64 {
    if total_clicks == 0 {
        return 0.0;
    }

    let max_clicks = rows.iter().map(|row| row.total_clicks).max().unwrap_or(0);
    max_clicks as f64 / total_clicks as f64
}

pub fn classify_severity(total_impressions: u64, page_count: usize, position_range: f64) -> Severity {
    for (tier, min_impressions, min_pages, max_position_range) in SEVERITY_RULES {
        if total_impressions >= min_impressions
            && page_count >= min_pages
            && position_range <= max_position_range
        {
            return tier;
        }
    }

    Severity::Low
}

/// Orders rows best-first: clicks desc, then impressions desc, then average
/// position asc. The stable sort keeps fully tied rows in input order.
fn rank_pages(rows: &[PerformanceRow]) -> Vec<PerformanceRow> {
    let mut ranked = rows.to_vec();
    ranked.sort_by(|a, b| {
        b.total_clicks
            .cmp(&a.total_clicks)
            .then(b.total_impressions.cmp(&a.total_impressions))
            .then(a.avg_position.total_cmp(&b.avg_position))
    });
    ranked
}

/// Renders the fixed-format remediation text: main-page header, severity
/// guidance block, then the competing-page list. `ranked` must be
/// non-empty and already in best-first order.
pub fn build_recommendation(ranked: &[PerformanceRow], severity: Severity) -> String {
    let mut lines = Vec::new();

    let main_page = &ranked[0];
    lines.push(format!(
        "Main page candidate: {} (clicks: {}, impressions: {}, avg position: {:.1})",
        main_page.page_url,
        main_page.total_clicks,
        main_page.total_impressions,
        main_page.avg_position
    ));

    match severity {
        Severity::Critical => {
            lines.push(
                "Urgent action recommended: severe cannibalization detected for this keyword."
                    .to_string(),
            );
            lines.push("-> Consider consolidating or redirecting the competing pages.".to_string());
            lines.push(
                "-> Remove this keyword from the non-main pages or retarget them to other keywords."
                    .to_string(),
            );
        }
        Severity::High => {
            lines.push("Early action recommended: clear cannibalization detected.".to_string());
            lines.push("-> Differentiate the target keyword of each page.".to_string());
            lines.push(
                "-> Review internal linking to concentrate authority on the main page.".to_string(),
            );
        }
        Severity::Medium => {
            lines.push("Review recommended: signs of cannibalization.".to_string());
            lines.push(
                "-> Check that the content of each page is sufficiently differentiated.".to_string(),
            );
            lines.push("-> Verify canonical tag configuration.".to_string());
        }
        Severity::Low => {
            lines.push("Monitoring recommended: mild cannibalization is possible.".to_string());
            lines.push(
                "-> Monitor periodically and take action if the situation worsens.".to_string(),
            );
        }
    }

    let competing = &ranked[1..];
    if !competing.is_empty() {
        lines.push(String::new());
        lines.push("Competing pages:".to_string());
        for page in competing {
            lines.push(format!(
                "- {} (clicks: {}, position: {:.1})",
                page.page_url, page.total_clicks, page.avg_position
            ));
        }
    }

    lines.join("\n")
}

/// Full analysis pass: fetch, group, evaluate, persist. An empty fetch
/// aborts with `AnalysisError::NoData` before anything is written. Upsert
/// failures are logged and counted; earlier upserts are not rolled back.
pub fn run_analysis<S>(
    store: &mut S,
    days: u32,
    thresholds: &DetectionThresholds,
) -> Result<AnalysisOutcome>
where
    S: RowSource + FindingSink,
{
    let rows = store.fetch_rows(days)?;
    if rows.is_empty() {
        return Err(AnalysisError::NoData.into());
    }

    let grouped = group_by_keyword(rows);
    let keywords_analyzed = grouped.len();

    let mut findings = Vec::new();
    for (keyword, group) in &grouped {
        if let Some(finding) = evaluate_group(keyword, group, thresholds) {
            debug!(
                keyword = %finding.keyword,
                severity = finding.severity.as_str(),
                pages = finding.page_urls.len(),
                "cannibalization detected"
            );
            findings.push(finding);
        }
    }

    let mut upsert_failures = 0;
    for finding in &findings {
        if let Err(err) = store.upsert_finding(finding) {
            upsert_failures += 1;
            warn!(keyword = %finding.keyword, error = %err, "finding upsert failed, continuing");
        }
    }

    let summary = build_run_summary(keywords_analyzed, &findings);
    if let Err(err) = store.record_run_summary(&summary) {
        warn!(error = %err, "analysis history write failed");
    }

    Ok(AnalysisOutcome {
        keywords_analyzed,
        findings_found: findings.len(),
        upsert_failures,
        findings,
    })
}

fn build_run_summary(
    keywords_analyzed: usize,
    findings: &[CannibalizationFinding],
) -> AnalysisRunSummary {
    let mut severity_breakdown: BTreeMap<String, usize> = BTreeMap::new();
    for finding in findings {
        *severity_breakdown
            .entry(finding.severity.as_str().to_string())
            .or_default() += 1;
    }

    let affected_pages: BTreeSet<&str> = findings
        .iter()
        .flat_map(|finding| finding.page_urls.iter().map(String::as_str))
        .collect();

    AnalysisRunSummary {
        analysis_type: "full_scan".to_string(),
        total_keywords: keywords_analyzed,
        cannibalized_keywords: findings.len(),
        affected_pages: affected_pages.len(),
        severity_breakdown,
        top_findings: findings.iter().take(10).cloned().collect(),
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
