use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use chrono::{NaiveDate, Utc};
use tracing::info;

use crate::cli::ImportArgs;
use crate::model::{ExportFile, ExportRow, ImportCounts, ImportPaths, ImportRunManifest};
use crate::store::{DB_SCHEMA_VERSION, Store};
use crate::util::{
    ensure_directory, now_utc_string, sha256_hex, utc_compact_string, write_json_pretty,
};

pub fn run(args: ImportArgs) -> Result<()> {
    let started_ts = Utc::now();
    let started_at = now_utc_string();
    let run_id = format!("import-{}", utc_compact_string(started_ts));

    let manifest_dir = args.cache_root.join("manifests");
    ensure_directory(&manifest_dir)?;

    let manifest_path = args.import_manifest_path.clone().unwrap_or_else(|| {
        manifest_dir.join(format!("import_run_{}.json", utc_compact_string(started_ts)))
    });
    let db_path = default_db_path(&args);

    info!(
        export_path = %args.export_path.display(),
        run_id = %run_id,
        "starting import"
    );

    let raw = fs::read(&args.export_path)
        .with_context(|| format!("failed to read {}", args.export_path.display()))?;
    let export: ExportFile = serde_json::from_slice(&raw)
        .with_context(|| format!("failed to parse {}", args.export_path.display()))?;

    if export.rows.is_empty() {
        bail!("export file contains no rows: {}", args.export_path.display());
    }
    for (index, row) in export.rows.iter().enumerate() {
        validate_export_row(row, index)?;
    }

    let export_sha256 = sha256_hex(&args.export_path)?;

    let mut store = Store::open(&db_path)?;
    let outcome = store.import_rows(&export.rows)?;
    let (keywords_total, pages_total) = store.corpus_counts()?;

    let updated_at = now_utc_string();
    let manifest = ImportRunManifest {
        manifest_version: 1,
        run_id: run_id.clone(),
        db_schema_version: DB_SCHEMA_VERSION.to_string(),
        status: "completed".to_string(),
        started_at,
        updated_at,
        export_sha256,
        site_url: export.site_url.clone(),
        paths: ImportPaths {
            cache_root: args.cache_root.display().to_string(),
            manifest_dir: manifest_dir.display().to_string(),
            export_path: args.export_path.display().to_string(),
            db_path: db_path.display().to_string(),
        },
        counts: ImportCounts {
            rows_in_file: export.rows.len(),
            rows_inserted: outcome.rows_inserted,
            dates_replaced: outcome.dates_replaced,
            keywords_total,
            pages_total,
        },
        notes: vec![
            "Rows already recorded for the export's dates were replaced before insert."
                .to_string(),
        ],
    };
    write_json_pretty(&manifest_path, &manifest)?;

    info!(path = %manifest_path.display(), "wrote import run manifest");
    info!(
        rows = outcome.rows_inserted,
        dates = outcome.dates_replaced,
        keywords = keywords_total,
        pages = pages_total,
        "import completed"
    );

    Ok(())
}

fn default_db_path(args: &ImportArgs) -> PathBuf {
    args.db_path
        .clone()
        .unwrap_or_else(|| args.cache_root.join("seocann.sqlite"))
}

/// Ingestion-boundary contract check: malformed rows never reach the
/// detector.
fn validate_export_row(row: &ExportRow, index: usize) -> Result<()> {
    if row.keyword.trim().is_empty() {
        bail!("row {index}: keyword is empty");
    }
    if row.page_url.trim().is_empty() {
        bail!("row {index}: page_url is empty");
    }
    if !row.position.is_finite() || row.position < 1.0 {
        bail!(
            "row {index} ({}): position must be a finite value >= 1.0, got {}",
            row.keyword,
            row.position
        );
    }
    if !row.ctr.is_finite() || row.ctr < 0.0 {
        bail!("row {index} ({}): ctr must be a finite non-negative value", row.keyword);
    }
    if NaiveDate::parse_from_str(&row.date, "%Y-%m-%d").is_err() {
        bail!(
            "row {index} ({}): date must be YYYY-MM-DD, got {:?}",
            row.keyword,
            row.date
        );
    }
    Ok(())
}
