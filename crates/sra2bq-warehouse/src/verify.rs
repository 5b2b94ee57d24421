// Verify step: fixed-shape aggregate and sample queries against the
// destination table. Observational only; callers treat failures as
// non-fatal.

use crate::{TableId, Warehouse, WarehouseError};
use tracing::info;

#[derive(Debug, Clone)]
pub struct VerifyReport {
    pub total_rows: i64,
    pub distinct_keys: i64,
    pub samples: Vec<String>,
}

/// Aggregate SQL: total row count plus distinct values of `key_column`.
pub fn aggregate_sql(table: &TableId, key_column: &str) -> String {
    format!(
        "SELECT COUNT(*) AS total_rows, COUNT(DISTINCT {}) AS distinct_keys FROM {}",
        key_column,
        table.quoted()
    )
}

/// Run the verification queries and log the results.
pub async fn verify_table(
    warehouse: &dyn Warehouse,
    table: &TableId,
    key_column: &str,
) -> Result<VerifyReport, WarehouseError> {
    info!("Verifying {} with test queries...", table);

    let sql = aggregate_sql(table, key_column);
    let counts = warehouse.counts(&sql, &["total_rows", "distinct_keys"]).await?;
    let total_rows = counts.first().copied().unwrap_or(0);
    let distinct_keys = counts.get(1).copied().unwrap_or(0);

    info!("Total rows: {}", total_rows);
    info!("Distinct {}: {}", key_column, distinct_keys);

    let samples = warehouse.sample_rows(table, 3).await?;
    info!("Sample rows:");
    for row in &samples {
        info!("  {}", row);
    }

    info!("Verification successful");
    Ok(VerifyReport {
        total_rows,
        distinct_keys,
        samples,
    })
}
