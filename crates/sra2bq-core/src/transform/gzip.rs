// Chunked gzip re-encode of a local file.
//
// Level 6 matches what the warehouse ingests without complaint while keeping
// compression time reasonable for multi-GB inputs.

use anyhow::{Context, Result};
use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs::File;
use std::io::{BufWriter, Read, Write};
use std::path::Path;
use tracing::info;

use crate::Progress;

const GZIP_LEVEL: u32 = 6;

#[derive(Debug, Clone, Copy)]
pub struct GzipReport {
    pub bytes_in: u64,
    pub bytes_out: u64,
}

impl GzipReport {
    /// Compressed size as a percentage of the input size.
    pub fn ratio_percent(&self) -> f64 {
        if self.bytes_in == 0 {
            0.0
        } else {
            100.0 * self.bytes_out as f64 / self.bytes_in as f64
        }
    }
}

/// Re-encode `input` as gzip at `output`, reading in `chunk_bytes` chunks and
/// reporting progress every `progress_every` chunks.
pub fn compress_file(
    input: &Path,
    output: &Path,
    chunk_bytes: usize,
    progress_every: u64,
) -> Result<GzipReport> {
    let mut reader = File::open(input)
        .with_context(|| format!("Failed to open input for compression: {}", input.display()))?;
    let sink = BufWriter::new(File::create(output).with_context(|| {
        format!("Failed to create compressed output: {}", output.display())
    })?);
    let mut encoder = GzEncoder::new(sink, Compression::new(GZIP_LEVEL));

    let mut buf = vec![0u8; chunk_bytes];
    let mut progress = Progress::new("compressed", progress_every, None);

    loop {
        let n = reader
            .read(&mut buf)
            .with_context(|| format!("Read failed during compression: {}", input.display()))?;
        if n == 0 {
            break;
        }
        encoder
            .write_all(&buf[..n])
            .context("Write failed during compression")?;
        progress.tick(n);
    }

    let mut sink = encoder.finish().context("Failed to finish gzip stream")?;
    sink.flush().context("Failed to flush compressed output")?;
    drop(sink);

    let bytes_out = std::fs::metadata(output)
        .with_context(|| format!("Failed to stat compressed output: {}", output.display()))?
        .len();

    let report = GzipReport {
        bytes_in: progress.bytes(),
        bytes_out,
    };
    info!(
        "Compression complete: {:.2} GB -> {:.2} GB ({:.1}%)",
        crate::to_gib(report.bytes_in),
        crate::to_gib(report.bytes_out),
        report.ratio_percent()
    );

    Ok(report)
}
