// Scratch directory for a single pipeline run.
//
// Removal never escalates: close() logs failures as non-critical, and the
// TempDir Drop covers any path that skips the explicit close.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

pub struct ScratchDir {
    dir: tempfile::TempDir,
}

impl ScratchDir {
    pub fn new(prefix: &str) -> Result<Self> {
        let dir = tempfile::Builder::new()
            .prefix(prefix)
            .tempdir()
            .context("Failed to create scratch directory")?;
        info!("Using scratch directory: {}", dir.path().display());
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn join(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    /// Remove the directory and everything in it.
    pub fn close(self) {
        let path = self.dir.path().to_path_buf();
        match self.dir.close() {
            Ok(()) => info!("Removed scratch directory: {}", path.display()),
            Err(e) => warn!(
                "Scratch cleanup failed (non-critical): {}: {}",
                path.display(),
                e
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_close_removes_directory() {
        let scratch = ScratchDir::new("sra2bq_test_").unwrap();
        let path = scratch.path().to_path_buf();
        std::fs::write(scratch.join("leftover.tab"), b"x").unwrap();
        assert!(path.exists());

        scratch.close();
        assert!(!path.exists());
    }

    #[test]
    fn test_drop_removes_directory() {
        let path = {
            let scratch = ScratchDir::new("sra2bq_test_").unwrap();
            scratch.path().to_path_buf()
        };
        assert!(!path.exists());
    }
}
