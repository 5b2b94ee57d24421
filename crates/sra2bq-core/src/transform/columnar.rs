// Delimited text to Parquet chunk files.
//
// The reader infers a schema from a bounded sample of the input (empty
// fields in typed columns become nulls), then batches are written through
// an ArrowWriter that rotates output files at a target size. Chunk files
// are named `<stem>-part-NNNNN.parquet` so a single wildcard URI covers
// the whole set.

use anyhow::{Context, Result};
use arrow::csv::reader::Format;
use arrow::csv::ReaderBuilder;
use arrow::datatypes::Schema;
use parquet::arrow::ArrowWriter;
use parquet::basic::{Compression, ZstdLevel};
use parquet::file::properties::{EnabledStatistics, WriterProperties};
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Clone)]
pub struct ColumnarOptions {
    pub delimiter: u8,
    pub has_header: bool,
    /// Rotate to a new output file once the current one reaches this size.
    pub target_chunk_bytes: u64,
    pub batch_rows: usize,
    /// Rows sampled for schema inference.
    pub infer_rows: usize,
}

impl Default for ColumnarOptions {
    fn default() -> Self {
        Self {
            delimiter: b'\t',
            has_header: true,
            target_chunk_bytes: 1024 * 1024 * 1024,
            batch_rows: 32 * 1024,
            infer_rows: 1000,
        }
    }
}

fn writer_properties() -> WriterProperties {
    WriterProperties::builder()
        .set_dictionary_enabled(true)
        .set_statistics_enabled(EnabledStatistics::Page)
        .set_compression(Compression::ZSTD(ZstdLevel::try_new(2).unwrap()))
        .set_max_row_group_size(32 * 1024) // 32k rows per group keeps query engines happy
        .build()
}

/// Convert a delimited text file into one or more Parquet files under
/// `out_dir`, each bounded by `target_chunk_bytes`. Returns the chunk paths
/// in write order.
pub fn delimited_to_parquet(
    input: &Path,
    out_dir: &Path,
    stem: &str,
    opts: &ColumnarOptions,
) -> Result<Vec<PathBuf>> {
    let format = Format::default()
        .with_header(opts.has_header)
        .with_delimiter(opts.delimiter);

    let sample = File::open(input)
        .with_context(|| format!("Failed to open input for conversion: {}", input.display()))?;
    let (schema, _) = format
        .infer_schema(sample, Some(opts.infer_rows))
        .with_context(|| format!("Failed to infer schema from {}", input.display()))?;
    let schema = Arc::new(schema);

    let reader = File::open(input)
        .with_context(|| format!("Failed to reopen input: {}", input.display()))?;
    let csv = ReaderBuilder::new(schema.clone())
        .with_format(format)
        .with_batch_size(opts.batch_rows)
        .build(reader)
        .context("Failed to build delimited reader")?;

    let mut parts: Vec<PathBuf> = Vec::new();
    let mut writer: Option<ArrowWriter<File>> = None;
    let mut rows_total: usize = 0;

    for batch in csv {
        let batch = batch.context("Failed to decode delimited batch")?;
        rows_total += batch.num_rows();

        if writer.is_none() {
            writer = Some(open_part(out_dir, stem, &schema, &mut parts)?);
        }

        let mut rotate = false;
        if let Some(current) = writer.as_mut() {
            current.write(&batch).context("Failed to write Parquet batch")?;
            let written = current.bytes_written() + current.in_progress_size();
            rotate = written as u64 >= opts.target_chunk_bytes;
        }

        if rotate {
            if let Some(full) = writer.take() {
                finish_part(full, &parts)?;
            }
        }
    }

    if let Some(last) = writer.take() {
        finish_part(last, &parts)?;
    }

    // Header-only input still yields one (empty) chunk so downstream steps
    // have an object to stage and load.
    if parts.is_empty() {
        let empty = open_part(out_dir, stem, &schema, &mut parts)?;
        finish_part(empty, &parts)?;
    }

    info!(
        "Conversion complete: {} rows across {} chunk file(s)",
        rows_total,
        parts.len()
    );

    Ok(parts)
}

fn open_part(
    out_dir: &Path,
    stem: &str,
    schema: &Arc<Schema>,
    parts: &mut Vec<PathBuf>,
) -> Result<ArrowWriter<File>> {
    let path = out_dir.join(format!("{}-part-{:05}.parquet", stem, parts.len()));
    let file = File::create(&path)
        .with_context(|| format!("Failed to create chunk file: {}", path.display()))?;
    let writer = ArrowWriter::try_new(file, schema.clone(), Some(writer_properties()))
        .context("Failed to open Parquet writer")?;
    parts.push(path);
    Ok(writer)
}

fn finish_part(writer: ArrowWriter<File>, parts: &[PathBuf]) -> Result<()> {
    let bytes = writer.bytes_written();
    writer.close().context("Failed to close Parquet chunk")?;
    if let Some(path) = parts.last() {
        info!("Wrote chunk: {} ({:.1} MB)", path.display(), crate::to_mib(bytes as u64));
    }
    Ok(())
}
