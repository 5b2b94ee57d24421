// sample-map pipeline: load the checked-in sample_id_map.csv into BigQuery
// with an explicit schema, replacing existing data.

use anyhow::{bail, Context, Result};
use sra2bq_config::RunConfig;
use sra2bq_transport::StagingStore;
use sra2bq_warehouse::{verify, ColumnSpec, LoadSpec, SourceFormat, TableId, Warehouse};
use tracing::{error, info, warn};

use super::{announce, finished, report_load, step, unstage};

const STAGED_NAME: &str = "sample_id_map.csv";

/// Explicit schema avoids inference quirks with quoted/unquoted values.
pub fn schema() -> Vec<ColumnSpec> {
    vec![
        ColumnSpec::string("sample_id"),
        ColumnSpec::string("run_ids"),
        ColumnSpec::string("sample_name"),
        ColumnSpec::string("study_name"),
    ]
}

pub async fn run(
    config: &RunConfig,
    store: &StagingStore,
    warehouse: &dyn Warehouse,
) -> Result<()> {
    let table = TableId::new(
        &config.gcp.project,
        &config.gcp.dataset,
        &config.sample_map.table,
    );
    let csv = &config.sample_map.csv;

    announce(
        "Loading sample_id_map to BigQuery",
        &[
            ("Source", csv.display().to_string()),
            ("Target", table.fqn()),
        ],
    );

    // No warehouse mutation may happen before this check.
    if !csv.exists() {
        bail!("CSV not found: {}", csv.display());
    }

    step(1, "Stage CSV");
    let uri = store
        .upload_file(
            csv,
            STAGED_NAME,
            config.transfer.chunk_bytes,
            config.transfer.progress_every,
        )
        .await
        .context("Staging failed")?;

    let result = load_and_verify(config, warehouse, &table, &uri).await;

    // Staged-object cleanup runs on success and failure alike.
    step(4, "Cleanup staged object");
    unstage(store, &[STAGED_NAME.to_string()], config.staging.keep_staged).await;

    result?;
    finished(&table);
    Ok(())
}

async fn load_and_verify(
    config: &RunConfig,
    warehouse: &dyn Warehouse,
    table: &TableId,
    uri: &str,
) -> Result<()> {
    step(2, "Load to BigQuery");
    info!("  From: {}", uri);
    info!("  To:   {}", table);

    let spec = LoadSpec {
        source_uris: vec![uri.to_string()],
        destination: table.clone(),
        format: SourceFormat::Csv {
            delimiter: ',',
            skip_leading_rows: 1,
            allow_quoted_newlines: true,
            null_marker: None,
            gzip: false,
        },
        schema: Some(schema()),
    };

    match warehouse.run_load(&spec).await {
        Ok(outcome) => {
            info!("Load job finished: {}", outcome.job_id);
        }
        Err(e) => {
            for detail in e.details() {
                error!("  - {}", detail);
            }
            return Err(e).context("Load failed");
        }
    }

    report_load(warehouse, table).await?;

    step(3, "Verify Table");
    if let Err(e) = verify::verify_table(warehouse, table, "sample_id").await {
        warn!("Verification query failed (non-critical): {}", e);
    }

    Ok(())
}
