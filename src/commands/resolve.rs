use anyhow::{Result, bail};
use tracing::info;

use crate::cli::ResolveArgs;
use crate::store::Store;

pub fn run(args: ResolveArgs) -> Result<()> {
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
    let status = args.resolution.as_model();

    if !store.update_status(args.finding_id, status)? {
        bail!("no finding with id {}", args.finding_id);
    }

    info!(
        finding_id = args.finding_id,
        status = status.as_str(),
        "finding status updated"
    );

    Ok(())
}
