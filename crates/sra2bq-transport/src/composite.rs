// Stage step, CLI variant: parallel composite upload via `gcloud storage cp`.
//
// The CLI handles parallelism internally; we only spawn it, wait, and
// surface its stderr when it fails.

use anyhow::{bail, Context, Result};
use std::path::PathBuf;
use std::process::Stdio;
use tokio::process::Command;
use tracing::info;

pub struct CompositeUploader {
    bin: String,
}

impl CompositeUploader {
    pub fn new(bin: impl Into<String>) -> Self {
        Self { bin: bin.into() }
    }

    /// Upload `sources` to the `dest_uri` directory (a gs:// prefix ending
    /// in '/').
    pub async fn upload(&self, sources: &[PathBuf], dest_uri: &str) -> Result<()> {
        if sources.is_empty() {
            bail!("No files given to {} storage cp", self.bin);
        }

        info!(
            "Running {} storage cp with {} file(s) -> {}",
            self.bin,
            sources.len(),
            dest_uri
        );

        let mut cmd = Command::new(&self.bin);
        cmd.arg("storage").arg("cp").arg("--quiet");
        for source in sources {
            cmd.arg(source);
        }
        cmd.arg(dest_uri);
        cmd.stdout(Stdio::piped()).stderr(Stdio::piped());

        let output = cmd
            .output()
            .await
            .with_context(|| format!("Failed to spawn {}", self.bin))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let stdout = String::from_utf8_lossy(&output.stdout);
            bail!(
                "{} storage cp failed ({}):\nSTDERR: {}\nSTDOUT: {}",
                self.bin,
                output.status,
                stderr.trim(),
                stdout.trim()
            );
        }

        info!("Composite upload complete: {}", dest_uri);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_success_exit_code() {
        // `true` ignores its arguments and exits 0
        let uploader = CompositeUploader::new("true");
        let sources = vec![PathBuf::from("/tmp/a.parquet")];
        assert!(uploader.upload(&sources, "gs://bucket/prefix/").await.is_ok());
    }

    #[tokio::test]
    async fn test_failure_surfaces_status() {
        let uploader = CompositeUploader::new("false");
        let sources = vec![PathBuf::from("/tmp/a.parquet")];
        let err = uploader
            .upload(&sources, "gs://bucket/prefix/")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("storage cp failed"));
    }

    #[tokio::test]
    async fn test_missing_binary_is_fatal() {
        let uploader = CompositeUploader::new("definitely-not-a-real-binary");
        let sources = vec![PathBuf::from("/tmp/a.parquet")];
        assert!(uploader.upload(&sources, "gs://bucket/prefix/").await.is_err());
    }

    #[tokio::test]
    async fn test_empty_source_list_rejected() {
        let uploader = CompositeUploader::new("true");
        assert!(uploader.upload(&[], "gs://bucket/prefix/").await.is_err());
    }
}
