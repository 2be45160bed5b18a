use std::collections::BTreeMap;

use anyhow::bail;
use serde::{Deserialize, Serialize};

/// One aggregated (keyword, page) tuple for the trailing analysis window.
/// Produced by the row source already summed/averaged; the detector never
/// re-aggregates daily rows.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceRow {
    pub keyword: String,
    pub page_url: String,
    pub total_clicks: u64,
    pub total_impressions: u64,
    pub avg_position: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Critical,
    High,
    Medium,
    Low,
}

impl Severity {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Critical => "critical",
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
        }
    }

    pub fn from_db_value(value: &str) -> anyhow::Result<Self> {
        match value {
            "critical" => Ok(Self::Critical),
            "high" => Ok(Self::High),
            "medium" => Ok(Self::Medium),
            "low" => Ok(Self::Low),
            other => bail!("unknown severity value in database: {other}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FindingStatus {
    Pending,
    Resolved,
    Ignored,
}

impl FindingStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Resolved => "resolved",
            Self::Ignored => "ignored",
        }
    }

    pub fn from_db_value(value: &str) -> anyhow::Result<Self> {
        match value {
            "pending" => Ok(Self::Pending),
            "resolved" => Ok(Self::Resolved),
            "ignored" => Ok(Self::Ignored),
            other => bail!("unknown status value in database: {other}"),
        }
    }
}

/// One detected cannibalization issue for a keyword. Created by the detector
/// with an implicit `pending` status; status transitions happen only through
/// the store's status-update operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CannibalizationFinding {
    pub keyword: String,
    /// All competing pages, recommendation order (main candidate first).
    pub page_urls: Vec<String>,
    pub severity: Severity,
    pub total_clicks: u64,
    pub total_impressions: u64,
    /// Mean of per-page average positions, rounded to 2 decimals.
    pub avg_position: f64,
    pub reasons: Vec<String>,
    pub position_range: f64,
    pub click_concentration: f64,
    pub recommendation: String,
}

/// Aggregate record of one analysis pass, appended to history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisRunSummary {
    pub analysis_type: String,
    pub total_keywords: usize,
    pub cannibalized_keywords: usize,
    pub affected_pages: usize,
    pub severity_breakdown: BTreeMap<String, usize>,
    pub top_findings: Vec<CannibalizationFinding>,
}

#[derive(Debug, Clone)]
pub struct AnalysisOutcome {
    pub keywords_analyzed: usize,
    pub findings_found: usize,
    pub upsert_failures: usize,
    pub findings: Vec<CannibalizationFinding>,
}

/// One daily (keyword, page) row from a search-performance export file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportRow {
    pub keyword: String,
    pub page_url: String,
    pub clicks: u64,
    pub impressions: u64,
    #[serde(default)]
    pub ctr: f64,
    pub position: f64,
    pub date: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportFile {
    #[serde(default)]
    pub site_url: Option<String>,
    pub rows: Vec<ExportRow>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ImportPaths {
    pub cache_root: String,
    pub manifest_dir: String,
    pub export_path: String,
    pub db_path: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ImportCounts {
    pub rows_in_file: usize,
    pub rows_inserted: usize,
    pub dates_replaced: usize,
    pub keywords_total: i64,
    pub pages_total: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ImportRunManifest {
    pub manifest_version: u32,
    pub run_id: String,
    pub db_schema_version: String,
    pub status: String,
    pub started_at: String,
    pub updated_at: String,
    pub export_sha256: String,
    pub site_url: Option<String>,
    pub paths: ImportPaths,
    pub counts: ImportCounts,
    pub notes: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AnalyzePaths {
    pub cache_root: String,
    pub manifest_dir: String,
    pub db_path: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct AnalyzeCounts {
    pub keywords_analyzed: usize,
    pub findings_found: usize,
    pub upsert_failures: usize,
    pub critical_findings: usize,
    pub high_findings: usize,
    pub medium_findings: usize,
    pub low_findings: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct AnalyzeRunManifest {
    pub manifest_version: u32,
    pub run_id: String,
    pub db_schema_version: String,
    pub status: String,
    pub started_at: String,
    pub updated_at: String,
    pub window_days: u32,
    pub paths: AnalyzePaths,
    pub counts: AnalyzeCounts,
    pub notes: Vec<String>,
}
