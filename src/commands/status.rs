use anyhow::Result;
use tracing::{info, warn};

use crate::cli::StatusArgs;
use crate::store::Store;

pub fn run(args: StatusArgs) -> Result<()> {
    let db_path = args
        .db_path
        .clone()
        .unwrap_or_else(|| args.cache_root.join("seocann.sqlite"));

    info!(cache_root = %args.cache_root.display(), "status requested");

    if !db_path.exists() {
        warn!(path = %db_path.display(), "database file missing");
        return Ok(());
    }

    let store = Store::open(&db_path)?;
    let stats = store.statistics()?;

    info!(
        path = %db_path.display(),
        keywords = stats.keywords_total,
        pages = stats.pages_total,
        daily_rows = stats.daily_rows,
        "database status"
    );
    info!(
        pending = stats.pending_findings,
        critical = stats.pending_by_severity.get("critical").copied().unwrap_or(0),
        high = stats.pending_by_severity.get("high").copied().unwrap_or(0),
        medium = stats.pending_by_severity.get("medium").copied().unwrap_or(0),
        low = stats.pending_by_severity.get("low").copied().unwrap_or(0),
        "pending findings"
    );
    info!(
        runs = stats.analysis_runs,
        last_run_at = %stats.last_run_at.unwrap_or_default(),
        "analysis history"
    );

    Ok(())
}
