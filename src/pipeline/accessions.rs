// accessions pipeline: stream SRA_Accessions.tab from NCBI, re-encode it,
// stage it in GCS and load it into BigQuery with a full refresh.

use anyhow::{Context, Result};
use sra2bq_config::{Codec, RunConfig, Uploader};
use sra2bq_core::transform::{self, ColumnarOptions};
use sra2bq_core::ScratchDir;
use sra2bq_transport::{fetch, CompositeUploader, StagingStore};
use sra2bq_warehouse::{verify, LoadSpec, SourceFormat, TableId, Warehouse};
use std::path::Path;
use tracing::{error, info, warn};

use super::{announce, finished, report_load, step, unstage};

const RAW_NAME: &str = "SRA_Accessions.tab";
const GZIP_NAME: &str = "SRA_Accessions.tab.gz";
const PARQUET_STEM: &str = "accessions";

/// Compression progress is chattier per byte than download progress, so it
/// logs five times less often at the same chunk size.
const COMPRESS_CADENCE_FACTOR: u64 = 5;

struct Staged {
    /// Object names under the staging prefix, for cleanup.
    names: Vec<String>,
    /// Load-job inputs; a single wildcard URI when chunked.
    uris: Vec<String>,
    format: SourceFormat,
}

pub async fn run(
    config: &RunConfig,
    store: &StagingStore,
    warehouse: &dyn Warehouse,
) -> Result<()> {
    let table = TableId::new(
        &config.gcp.project,
        &config.gcp.dataset,
        &config.accessions.table,
    );

    announce(
        "Loading SRA Accessions to BigQuery",
        &[
            ("Source", config.accessions.url.clone()),
            ("Target", table.fqn()),
            ("Staging", store.prefix_uri()),
            ("Codec", config.accessions.codec.to_string()),
        ],
    );

    let scratch = ScratchDir::new("sra_accessions_")?;
    let result = run_steps(config, store, warehouse, &table, &scratch).await;

    // Local scratch cleanup runs on success and failure alike.
    step(7, "Cleanup local files");
    scratch.close();

    result?;
    finished(&table);
    Ok(())
}

async fn run_steps(
    config: &RunConfig,
    store: &StagingStore,
    warehouse: &dyn Warehouse,
    table: &TableId,
    scratch: &ScratchDir,
) -> Result<()> {
    step(1, "Download to local filesystem");
    let raw = scratch.join(RAW_NAME);
    fetch::download(
        &config.accessions.url,
        &raw,
        config.transfer.chunk_bytes,
        config.transfer.progress_every,
    )
    .await
    .context("Download failed")?;

    let staged = match config.accessions.codec {
        Codec::Gzip => stage_gzip(config, store, scratch, &raw).await?,
        Codec::Parquet => stage_parquet(config, store, scratch, &raw).await?,
    };

    step(4, "Load to BigQuery");
    info!("This will take several minutes...");
    let spec = LoadSpec {
        source_uris: staged.uris.clone(),
        destination: table.clone(),
        format: staged.format.clone(),
        schema: None,
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

    step(5, "Verify Table");
    if let Err(e) = verify::verify_table(warehouse, table, "Accession").await {
        warn!("Verification query failed (non-critical): {}", e);
    }

    step(6, "Cleanup staged objects");
    unstage(store, &staged.names, config.staging.keep_staged).await;

    Ok(())
}

async fn stage_gzip(
    config: &RunConfig,
    store: &StagingStore,
    scratch: &ScratchDir,
    raw: &Path,
) -> Result<Staged> {
    step(2, "Compress with gzip");
    let compressed = scratch.join(GZIP_NAME);
    let chunk_bytes = config.transfer.chunk_bytes;
    let cadence = config.transfer.progress_every * COMPRESS_CADENCE_FACTOR;

    let (input, output) = (raw.to_path_buf(), compressed.clone());
    tokio::task::spawn_blocking(move || {
        transform::compress_file(&input, &output, chunk_bytes, cadence)
    })
    .await
    .context("Compression task failed")?
    .context("Compression failed")?;

    step(3, "Upload to GCS");
    match config.staging.uploader {
        Uploader::Client => {
            store
                .upload_file(
                    &compressed,
                    GZIP_NAME,
                    config.transfer.chunk_bytes,
                    config.transfer.progress_every,
                )
                .await
                .context("Upload failed")?;
        }
        Uploader::Gcloud => {
            CompositeUploader::new(&config.staging.gcloud_bin)
                .upload(&[compressed], &store.prefix_uri())
                .await
                .context("Upload failed")?;
        }
    }

    Ok(Staged {
        names: vec![GZIP_NAME.to_string()],
        uris: vec![store.uri(GZIP_NAME)],
        format: SourceFormat::Csv {
            delimiter: '\t',
            skip_leading_rows: 1,
            allow_quoted_newlines: true,
            null_marker: None,
            gzip: true,
        },
    })
}

async fn stage_parquet(
    config: &RunConfig,
    store: &StagingStore,
    scratch: &ScratchDir,
    raw: &Path,
) -> Result<Staged> {
    step(2, "Convert to Parquet");
    let opts = ColumnarOptions {
        delimiter: b'\t',
        has_header: true,
        target_chunk_bytes: config.accessions.target_chunk_bytes,
        ..ColumnarOptions::default()
    };

    let (input, out_dir) = (raw.to_path_buf(), scratch.path().to_path_buf());
    let parts = tokio::task::spawn_blocking(move || {
        transform::delimited_to_parquet(&input, &out_dir, PARQUET_STEM, &opts)
    })
    .await
    .context("Conversion task failed")?
    .context("Conversion failed")?;

    let names = parts
        .iter()
        .map(|part| {
            part.file_name()
                .and_then(|name| name.to_str())
                .map(str::to_string)
                .with_context(|| format!("Chunk path is not valid UTF-8: {}", part.display()))
        })
        .collect::<Result<Vec<_>>>()?;

    step(3, "Upload to GCS");
    match config.staging.uploader {
        Uploader::Client => {
            for (part, name) in parts.iter().zip(&names) {
                store
                    .upload_file(
                        part,
                        name,
                        config.transfer.chunk_bytes,
                        config.transfer.progress_every,
                    )
                    .await
                    .context("Upload failed")?;
            }
        }
        Uploader::Gcloud => {
            CompositeUploader::new(&config.staging.gcloud_bin)
                .upload(&parts, &store.prefix_uri())
                .await
                .context("Upload failed")?;
        }
    }

    // One wildcard URI covers the whole chunk set in a single load job.
    let wildcard = store.uri(&format!("{}-part-*.parquet", PARQUET_STEM));
    info!("Staged {} chunk file(s) under {}", names.len(), wildcard);

    Ok(Staged {
        names,
        uris: vec![wildcard],
        format: SourceFormat::Parquet,
    })
}
