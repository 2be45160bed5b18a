use std::io::{self, Write};

use anyhow::{Context, Result, bail};
use serde::Serialize;

use crate::cli::ListArgs;
use crate::store::{ListFilter, Store, StoredFinding};

#[derive(Debug, Serialize)]
struct ListResponse {
    status_filter: Option<&'static str>,
    severity_filter: Option<&'static str>,
    returned: usize,
    findings: Vec<StoredFinding>,
}

pub fn run(args: ListArgs) -> Result<()> {
    let db_path = args
        .db_path
        .clone()
        .unwrap_or_else(|| args.cache_root.join("seocann.sqlite"));

    if !db_path.exists() {
        bail!(
            "database not found at {}; run the import command first",
            db_path.display()
        );
    }

    let store = Store::open(&db_path)?;
    let filter = ListFilter {
        status: args.status.as_model(),
        severity: args.severity.map(|severity| severity.as_model()),
        limit: args.limit,
        offset: args.offset,
    };
    let findings = store.list_findings(&filter)?;

    if args.json {
        write_json_response(&args, findings)
    } else {
        write_text_response(&findings)
    }
}

fn write_json_response(args: &ListArgs, findings: Vec<StoredFinding>) -> Result<()> {
    let response = ListResponse {
        status_filter: args.status.as_model().map(|status| status.as_str()),
        severity_filter: args
            .severity
            .map(|severity| severity.as_model().as_str()),
        returned: findings.len(),
        findings,
    };

    let mut output = io::BufWriter::new(io::stdout().lock());
    serde_json::to_writer_pretty(&mut output, &response)
        .context("failed to serialize findings json output")?;
    writeln!(output)?;
    output.flush()?;
    Ok(())
}

fn write_text_response(findings: &[StoredFinding]) -> Result<()> {
    let mut output = io::BufWriter::new(io::stdout().lock());

    writeln!(output, "Findings: {}", findings.len())?;

    for (index, finding) in findings.iter().enumerate() {
        writeln!(
            output,
            "{}.\t[{}]\t{}\t{}\tclicks={} impressions={} avg_position={:.2}",
            index + 1,
            finding.severity.as_str(),
            finding.status.as_str(),
            finding.keyword,
            finding.total_clicks,
            finding.total_impressions,
            finding.avg_position,
        )?;
        writeln!(
            output,
            "\tid={} detected_at={}",
            finding.id, finding.detected_at
        )?;
        if let Some(resolved_at) = &finding.resolved_at {
            writeln!(output, "\tresolved_at={resolved_at}")?;
        }
        writeln!(output, "\tpages: {}", finding.page_urls.join(", "))?;
        for line in finding.recommendation.lines() {
            writeln!(output, "\t{line}")?;
        }
    }

    output.flush()?;
    Ok(())
}
