// Transfer step: stream a remote file to local disk.
//
// Bytes are accumulated into fixed-size chunks before hitting the
// filesystem, so the progress cadence tracks the configured chunk size
// rather than whatever the network delivers. Redirects are followed; any
// HTTP or network error is fatal. There is no resume-from-offset.

use anyhow::{Context, Result};
use sra2bq_core::{to_gib, to_mib, Progress};
use std::path::Path;
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::info;

/// Download `url` to `dest`. Returns the number of bytes written.
pub async fn download(
    url: &str,
    dest: &Path,
    chunk_bytes: usize,
    progress_every: u64,
) -> Result<u64> {
    info!("Downloading {} -> {}", url, dest.display());

    let client = reqwest::Client::builder()
        .build()
        .context("Failed to build HTTP client")?;

    let response = client
        .get(url)
        .send()
        .await
        .with_context(|| format!("Request failed: {}", url))?
        .error_for_status()
        .with_context(|| format!("Server returned an error status for {}", url))?;

    let total = response.content_length();
    match total {
        Some(total) => info!("File size: {:.1} MB ({} bytes)", to_mib(total), total),
        None => info!("File size: unknown"),
    }

    let file = File::create(dest)
        .await
        .with_context(|| format!("Failed to create download target: {}", dest.display()))?;
    let mut writer = BufWriter::new(file);
    let mut progress = Progress::new("downloaded", progress_every, total);

    let mut response = response;
    let mut pending: Vec<u8> = Vec::with_capacity(chunk_bytes);

    while let Some(bytes) = response
        .chunk()
        .await
        .with_context(|| format!("Download stream failed: {}", url))?
    {
        pending.extend_from_slice(&bytes);
        if pending.len() >= chunk_bytes {
            writer
                .write_all(&pending)
                .await
                .context("Write failed during download")?;
            progress.tick(pending.len());
            pending.clear();
        }
    }

    if !pending.is_empty() {
        writer
            .write_all(&pending)
            .await
            .context("Write failed during download")?;
        progress.tick(pending.len());
    }

    writer
        .flush()
        .await
        .context("Failed to flush download target")?;

    info!("Download complete: {:.2} GB", to_gib(progress.bytes()));
    Ok(progress.bytes())
}
