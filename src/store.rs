use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{Duration, Utc};
use rusqlite::types::Value;
use rusqlite::{Connection, params, params_from_iter};
use serde::Serialize;

use crate::detector::{FindingSink, RowSource};
use crate::error::AnalysisError;
use crate::model::{
    AnalysisRunSummary, CannibalizationFinding, ExportRow, FindingStatus, PerformanceRow, Severity,
};
use crate::util::now_utc_string;

pub const DB_SCHEMA_VERSION: &str = "1.0.0";

/// SQLite-backed repository for daily performance rows, findings and
/// analysis history. The detector only sees this through the
/// `RowSource`/`FindingSink` traits.
pub struct Store {
    connection: Connection,
}

#[derive(Debug, Clone, Serialize)]
pub struct StoredFinding {
    pub id: i64,
    pub keyword: String,
    pub page_urls: Vec<String>,
    pub severity: Severity,
    pub total_clicks: u64,
    pub total_impressions: u64,
    pub avg_position: f64,
    pub recommendation: String,
    pub status: FindingStatus,
    pub detected_at: String,
    pub resolved_at: Option<String>,
}

#[derive(Debug, Clone, Copy)]
pub struct ListFilter {
    pub status: Option<FindingStatus>,
    pub severity: Option<Severity>,
    pub limit: usize,
    pub offset: usize,
}

#[derive(Debug, Clone)]
pub struct ImportOutcome {
    pub rows_inserted: usize,
    pub dates_replaced: usize,
}

#[derive(Debug, Clone)]
pub struct Statistics {
    pub keywords_total: i64,
    pub pages_total: i64,
    pub daily_rows: i64,
    pub pending_findings: i64,
    pub pending_by_severity: BTreeMap<String, i64>,
    pub analysis_runs: i64,
    pub last_run_at: Option<String>,
}

impl Store {
    pub fn open(db_path: &Path) -> Result<Self> {
        let connection = Connection::open(db_path)
            .with_context(|| format!("failed to open {}", db_path.display()))?;
        Self::from_connection(connection)
    }

    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(connection: Connection) -> Result<Self> {
        configure_connection(&connection)?;
        ensure_schema(&connection)?;
        Ok(Self { connection })
    }

    /// Replaces any rows already recorded for the export's dates, then
    /// inserts the new rows, all in one transaction. Re-importing the same
    /// export is therefore idempotent.
    pub fn import_rows(&mut self, rows: &[ExportRow]) -> Result<ImportOutcome> {
        let dates: BTreeSet<&str> = rows.iter().map(|row| row.date.as_str()).collect();
        let created_at = now_utc_string();

        let tx = self.connection.transaction()?;

        for date in &dates {
            tx.execute("DELETE FROM keyword_stats WHERE date_recorded = ?1", [date])
                .with_context(|| format!("failed to clear existing rows for {date}"))?;
        }

        {
            let mut statement = tx.prepare(
                "
                INSERT INTO keyword_stats
                  (keyword, page_url, clicks, impressions, ctr, position, date_recorded, created_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                ",
            )?;

            for row in rows {
                statement.execute(params![
                    row.keyword,
                    row.page_url,
                    row.clicks as i64,
                    row.impressions as i64,
                    row.ctr,
                    row.position,
                    row.date,
                    created_at,
                ])?;
            }
        }

        tx.commit()?;

        Ok(ImportOutcome {
            rows_inserted: rows.len(),
            dates_replaced: dates.len(),
        })
    }

    pub fn corpus_counts(&self) -> Result<(i64, i64)> {
        let keywords =
            self.query_count("SELECT COUNT(DISTINCT keyword) FROM keyword_stats")?;
        let pages = self.query_count("SELECT COUNT(DISTINCT page_url) FROM keyword_stats")?;
        Ok((keywords, pages))
    }

    fn upsert_finding_row(&self, finding: &CannibalizationFinding) -> Result<()> {
        let page_urls = serde_json::to_string(&finding.page_urls)
            .context("failed to serialize finding page urls")?;
        let details = serde_json::to_string(&serde_json::json!({
            "reasons": finding.reasons,
            "position_range": finding.position_range,
            "click_concentration": finding.click_concentration,
        }))
        .context("failed to serialize finding details")?;
        let detected_at = now_utc_string();

        // The partial unique index on pending keywords makes this a
        // replace-or-insert per keyword; resolved and ignored rows are
        // never touched.
        self.connection.execute(
            "
            INSERT INTO findings
              (keyword, page_urls, severity, total_clicks, total_impressions,
               avg_position, recommendation, details, status, detected_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 'pending', ?9)
            ON CONFLICT(keyword) WHERE status = 'pending' DO UPDATE SET
              page_urls=excluded.page_urls,
              severity=excluded.severity,
              total_clicks=excluded.total_clicks,
              total_impressions=excluded.total_impressions,
              avg_position=excluded.avg_position,
              recommendation=excluded.recommendation,
              details=excluded.details,
              detected_at=excluded.detected_at
            ",
            params![
                finding.keyword,
                page_urls,
                finding.severity.as_str(),
                finding.total_clicks as i64,
                finding.total_impressions as i64,
                finding.avg_position,
                finding.recommendation,
                details,
                detected_at,
            ],
        )?;

        Ok(())
    }

    pub fn list_findings(&self, filter: &ListFilter) -> Result<Vec<StoredFinding>> {
        let mut sql = String::from(
            "
            SELECT id, keyword, page_urls, severity, total_clicks, total_impressions,
                   avg_position, recommendation, status, detected_at, resolved_at
            FROM findings
            WHERE 1=1
            ",
        );
        let mut values: Vec<Value> = Vec::new();

        if let Some(status) = filter.status {
            sql.push_str(" AND status = ?");
            values.push(Value::from(status.as_str().to_string()));
        }
        if let Some(severity) = filter.severity {
            sql.push_str(" AND severity = ?");
            values.push(Value::from(severity.as_str().to_string()));
        }

        sql.push_str(" ORDER BY total_impressions DESC, keyword ASC LIMIT ? OFFSET ?");
        values.push(Value::from(filter.limit as i64));
        values.push(Value::from(filter.offset as i64));

        let mut statement = self.connection.prepare(&sql)?;
        let mut rows = statement.query(params_from_iter(values))?;

        let mut findings = Vec::new();
        while let Some(row) = rows.next()? {
            let page_urls_json: String = row.get(2)?;
            let severity: String = row.get(3)?;
            let status: String = row.get(8)?;

            findings.push(StoredFinding {
                id: row.get(0)?,
                keyword: row.get(1)?,
                page_urls: serde_json::from_str(&page_urls_json)
                    .context("failed to parse stored page urls")?,
                severity: Severity::from_db_value(&severity)?,
                total_clicks: row.get::<_, i64>(4)? as u64,
                total_impressions: row.get::<_, i64>(5)? as u64,
                avg_position: row.get(6)?,
                recommendation: row.get(7)?,
                status: FindingStatus::from_db_value(&status)?,
                detected_at: row.get(9)?,
                resolved_at: row.get(10)?,
            });
        }

        Ok(findings)
    }

    /// Transitions a finding to resolved or ignored. Returns false when no
    /// finding has the given id. `resolved_at` is stamped only on resolve.
    pub fn update_status(&self, finding_id: i64, status: FindingStatus) -> Result<bool> {
        let resolved_at = match status {
            FindingStatus::Resolved => Some(now_utc_string()),
            _ => None,
        };

        let changed = self.connection.execute(
            "UPDATE findings SET status = ?1, resolved_at = ?2 WHERE id = ?3",
            params![status.as_str(), resolved_at, finding_id],
        )?;

        Ok(changed > 0)
    }

    pub fn statistics(&self) -> Result<Statistics> {
        let (keywords_total, pages_total) = self.corpus_counts()?;
        let daily_rows = self.query_count("SELECT COUNT(*) FROM keyword_stats")?;
        let pending_findings =
            self.query_count("SELECT COUNT(*) FROM findings WHERE status = 'pending'")?;
        let analysis_runs = self.query_count("SELECT COUNT(*) FROM analysis_history")?;

        let last_run_at: Option<String> = self.connection.query_row(
            "SELECT MAX(created_at) FROM analysis_history",
            [],
            |row| row.get(0),
        )?;

        let mut pending_by_severity = BTreeMap::new();
        let mut statement = self.connection.prepare(
            "
            SELECT severity, COUNT(*)
            FROM findings
            WHERE status = 'pending'
            GROUP BY severity
            ",
        )?;
        let mut rows = statement.query([])?;
        while let Some(row) = rows.next()? {
            let severity: String = row.get(0)?;
            let count: i64 = row.get(1)?;
            pending_by_severity.insert(severity, count);
        }

        Ok(Statistics {
            keywords_total,
            pages_total,
            daily_rows,
            pending_findings,
            pending_by_severity,
            analysis_runs,
            last_run_at,
        })
    }

    fn query_count(&self, sql: &str) -> Result<i64> {
        let count = self.connection.query_row(sql, [], |row| row.get(0))?;
        Ok(count)
    }
}

impl RowSource for Store {
    /// Aggregates the daily rows of the trailing window into one row per
    /// (keyword, page): summed clicks/impressions, averaged position.
    /// Zero-impression pairs are dropped at the source.
    fn fetch_rows(&self, days: u32) -> Result<Vec<PerformanceRow>> {
        let date_from = (Utc::now() - Duration::days(i64::from(days)))
            .format("%Y-%m-%d")
            .to_string();

        let mut statement = self.connection.prepare(
            "
            SELECT keyword, page_url, SUM(clicks), SUM(impressions), AVG(position)
            FROM keyword_stats
            WHERE date_recorded >= ?1
            GROUP BY keyword, page_url
            HAVING SUM(impressions) > 0
            ORDER BY keyword, SUM(clicks) DESC
            ",
        )?;
        let mut rows = statement.query([&date_from])?;

        let mut result = Vec::new();
        while let Some(row) = rows.next()? {
            result.push(PerformanceRow {
                keyword: row.get(0)?,
                page_url: row.get(1)?,
                total_clicks: row.get::<_, i64>(2)? as u64,
                total_impressions: row.get::<_, i64>(3)? as u64,
                avg_position: row.get(4)?,
            });
        }

        Ok(result)
    }
}

impl FindingSink for Store {
    fn upsert_finding(&mut self, finding: &CannibalizationFinding) -> Result<()> {
        self.upsert_finding_row(finding)
            .context(AnalysisError::Persistence {
                keyword: finding.keyword.clone(),
            })
    }

    fn record_run_summary(&mut self, summary: &AnalysisRunSummary) -> Result<()> {
        let analysis_data = serde_json::to_string(&serde_json::json!({
            "severity_breakdown": summary.severity_breakdown,
            "top_findings": summary.top_findings,
        }))
        .context("failed to serialize analysis history data")?;

        self.connection.execute(
            "
            INSERT INTO analysis_history
              (analysis_type, total_keywords, cannibalized_keywords, affected_pages,
               analysis_data, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ",
            params![
                summary.analysis_type,
                summary.total_keywords as i64,
                summary.cannibalized_keywords as i64,
                summary.affected_pages as i64,
                analysis_data,
                now_utc_string(),
            ],
        )?;

        Ok(())
    }
}

fn configure_connection(connection: &Connection) -> Result<()> {
    connection
        .pragma_update(None, "journal_mode", "WAL")
        .context("failed to set journal_mode=WAL")?;
    connection
        .pragma_update(None, "synchronous", "NORMAL")
        .context("failed to set synchronous=NORMAL")?;
    Ok(())
}

fn ensure_schema(connection: &Connection) -> Result<()> {
    connection.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS metadata (
          key TEXT PRIMARY KEY,
          value TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS keyword_stats (
          id INTEGER PRIMARY KEY AUTOINCREMENT,
          keyword TEXT NOT NULL,
          page_url TEXT NOT NULL,
          clicks INTEGER NOT NULL DEFAULT 0,
          impressions INTEGER NOT NULL DEFAULT 0,
          ctr REAL NOT NULL DEFAULT 0,
          position REAL NOT NULL DEFAULT 0,
          date_recorded TEXT NOT NULL,
          created_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS findings (
          id INTEGER PRIMARY KEY AUTOINCREMENT,
          keyword TEXT NOT NULL,
          page_urls TEXT NOT NULL,
          severity TEXT NOT NULL DEFAULT 'low',
          total_clicks INTEGER NOT NULL DEFAULT 0,
          total_impressions INTEGER NOT NULL DEFAULT 0,
          avg_position REAL NOT NULL DEFAULT 0,
          recommendation TEXT NOT NULL DEFAULT '',
          details TEXT,
          status TEXT NOT NULL DEFAULT 'pending',
          detected_at TEXT NOT NULL,
          resolved_at TEXT
        );

        CREATE TABLE IF NOT EXISTS analysis_history (
          id INTEGER PRIMARY KEY AUTOINCREMENT,
          analysis_type TEXT NOT NULL,
          total_keywords INTEGER NOT NULL DEFAULT 0,
          cannibalized_keywords INTEGER NOT NULL DEFAULT 0,
          affected_pages INTEGER NOT NULL DEFAULT 0,
          analysis_data TEXT,
          created_at TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_keyword_stats_keyword ON keyword_stats(keyword);
        CREATE INDEX IF NOT EXISTS idx_keyword_stats_date ON keyword_stats(date_recorded);
        CREATE UNIQUE INDEX IF NOT EXISTS idx_findings_pending_keyword
          ON findings(keyword) WHERE status = 'pending';
        CREATE INDEX IF NOT EXISTS idx_findings_severity ON findings(severity);
        CREATE INDEX IF NOT EXISTS idx_findings_status ON findings(status);
        ",
    )?;

    let now = now_utc_string();
    connection.execute(
        "INSERT INTO metadata(key, value) VALUES('db_schema_version', ?1)
         ON CONFLICT(key) DO UPDATE SET value=excluded.value",
        [DB_SCHEMA_VERSION],
    )?;
    connection.execute(
        "INSERT INTO metadata(key, value) VALUES('db_updated_at', ?1)
         ON CONFLICT(key) DO UPDATE SET value=excluded.value",
        [now],
    )?;

    Ok(())
}
