// Pipeline orchestration shared by both loaders.
//
// Fatal step failures propagate as errors to a single top-level exit path;
// verify and cleanup are the only non-fatal steps and log at WARN instead.

use anyhow::{Context, Result};
use sra2bq_core::to_mib;
use sra2bq_transport::StagingStore;
use sra2bq_warehouse::{TableId, Warehouse};
use tracing::{info, warn};

pub mod accessions;
pub mod sample_map;

const RULE_WIDTH: usize = 60;

pub(crate) fn announce(title: &str, lines: &[(&str, String)]) {
    info!("{}", "=".repeat(RULE_WIDTH));
    info!("{}", title);
    info!("{}", "=".repeat(RULE_WIDTH));
    for (label, value) in lines {
        info!("{}: {}", label, value);
    }
}

pub(crate) fn step(number: u32, title: &str) {
    info!("STEP {}: {}", number, title);
    info!("{}", "-".repeat(RULE_WIDTH));
}

pub(crate) fn finished(table: &TableId) {
    info!("{}", "=".repeat(RULE_WIDTH));
    info!("Load Complete!");
    info!("{}", "=".repeat(RULE_WIDTH));
    info!("You can now query the table:");
    info!("  SELECT * FROM {} LIMIT 10", table.quoted());
}

/// Post-load report: row count, logical size and creation time.
pub(crate) async fn report_load(warehouse: &dyn Warehouse, table: &TableId) -> Result<()> {
    let stats = warehouse
        .table_stats(table)
        .await
        .context("Failed to fetch table metadata after load")?;

    info!("Load complete!");
    info!("  Table: {}", table);
    info!("  Rows:  {}", stats.row_count);
    info!("  Size:  {:.2} MB", to_mib(stats.logical_bytes));
    if let Some(created) = stats.created {
        info!("  Created: {}", created);
    }
    Ok(())
}

/// Remove staged objects, or log retention instructions when `keep_staged`
/// is set. Failures are non-critical.
pub(crate) async fn unstage(store: &StagingStore, names: &[String], keep_staged: bool) {
    if keep_staged {
        for name in names {
            info!("Keeping staged object for future reloads: {}", store.uri(name));
            info!("  To delete manually: gcloud storage rm {}", store.uri(name));
        }
        return;
    }

    for name in names {
        match store.delete(name).await {
            Ok(()) => info!("Deleted staged object: {}", store.uri(name)),
            Err(e) => warn!("Staged cleanup failed (non-critical): {}", e),
        }
    }
}
