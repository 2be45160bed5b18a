use anyhow::Result;
use chrono::Utc;
use tracing::info;

use crate::cli::AnalyzeArgs;
use crate::detector::{self, DetectionThresholds};
use crate::model::{AnalyzeCounts, AnalyzePaths, AnalyzeRunManifest, Severity};
use crate::store::{DB_SCHEMA_VERSION, Store};
use crate::util::{ensure_directory, now_utc_string, utc_compact_string, write_json_pretty};

pub fn run(args: AnalyzeArgs) -> Result<()> {
    let started_ts = Utc::now();
    let started_at = now_utc_string();
    let run_id = format!("analyze-{}", utc_compact_string(started_ts));

    let manifest_dir = args.cache_root.join("manifests");
    ensure_directory(&manifest_dir)?;

    let manifest_path = args.analyze_manifest_path.clone().unwrap_or_else(|| {
        manifest_dir.join(format!("analyze_run_{}.json", utc_compact_string(started_ts)))
    });
    let db_path = args
        .db_path
        .clone()
        .unwrap_or_else(|| args.cache_root.join("seocann.sqlite"));

    info!(days = args.days, run_id = %run_id, "starting cannibalization analysis");

    let thresholds = DetectionThresholds {
        min_pages: args.min_pages,
        min_impressions: args.min_impressions,
        ..DetectionThresholds::default()
    };

    let mut store = Store::open(&db_path)?;
    let outcome = detector::run_analysis(&mut store, args.days, &thresholds)?;

    let severity_count = |severity: Severity| {
        outcome
            .findings
            .iter()
            .filter(|finding| finding.severity == severity)
            .count()
    };

    let updated_at = now_utc_string();
    let manifest = AnalyzeRunManifest {
        manifest_version: 1,
        run_id: run_id.clone(),
        db_schema_version: DB_SCHEMA_VERSION.to_string(),
        status: "completed".to_string(),
        started_at,
        updated_at,
        window_days: args.days,
        paths: AnalyzePaths {
            cache_root: args.cache_root.display().to_string(),
            manifest_dir: manifest_dir.display().to_string(),
            db_path: db_path.display().to_string(),
        },
        counts: AnalyzeCounts {
            keywords_analyzed: outcome.keywords_analyzed,
            findings_found: outcome.findings_found,
            upsert_failures: outcome.upsert_failures,
            critical_findings: severity_count(Severity::Critical),
            high_findings: severity_count(Severity::High),
            medium_findings: severity_count(Severity::Medium),
            low_findings: severity_count(Severity::Low),
        },
        notes: vec![
            "Findings were upserted per keyword; resolved and ignored findings were left untouched."
                .to_string(),
        ],
    };
    write_json_pretty(&manifest_path, &manifest)?;

    info!(path = %manifest_path.display(), "wrote analyze run manifest");
    info!(
        keywords = outcome.keywords_analyzed,
        findings = outcome.findings_found,
        upsert_failures = outcome.upsert_failures,
        "analysis completed"
    );

    Ok(())
}
