// Staging store: object storage addressed by key under a fixed prefix.
//
// Backed by an OpenDAL operator; GCS in production, local filesystem in
// tests. URIs are always rendered in gs:// form because that is what the
// warehouse load API consumes.

use anyhow::{Context, Result};
use opendal::{services, Operator};
use sra2bq_core::Progress;
use std::path::Path;
use tokio::io::AsyncReadExt;
use tracing::info;

pub struct StagingStore {
    operator: Operator,
    bucket: String,
    prefix: String,
}

impl StagingStore {
    /// GCS-backed store. Uses the service-account key when given, otherwise
    /// application-default credentials.
    pub fn gcs(bucket: &str, prefix: &str, credential_path: Option<&Path>) -> Result<Self> {
        let mut builder = services::Gcs::default().bucket(bucket);
        if let Some(path) = credential_path {
            let path = path
                .to_str()
                .context("Credential path is not valid UTF-8")?;
            builder = builder.credential_path(path);
        }

        let operator = Operator::new(builder)
            .context("Failed to create GCS operator")?
            .finish();
        Ok(Self {
            operator,
            bucket: bucket.to_string(),
            prefix: prefix.to_string(),
        })
    }

    /// Local-filesystem store for tests and dry runs. `bucket` only names
    /// the rendered URIs.
    pub fn fs(root: &Path, bucket: &str, prefix: &str) -> Result<Self> {
        let root = root.to_str().context("Store root is not valid UTF-8")?;
        let builder = services::Fs::default().root(root);

        let operator = Operator::new(builder)
            .context("Failed to create filesystem operator")?
            .finish();
        Ok(Self {
            operator,
            bucket: bucket.to_string(),
            prefix: prefix.to_string(),
        })
    }

    /// Object key under the staging prefix.
    pub fn key(&self, name: &str) -> String {
        if self.prefix.is_empty() {
            name.to_string()
        } else {
            format!("{}/{}", self.prefix, name)
        }
    }

    /// gs:// URI for an object name (or a wildcard pattern).
    pub fn uri(&self, name: &str) -> String {
        format!("gs://{}/{}", self.bucket, self.key(name))
    }

    /// gs:// URI of the staging prefix itself, as a directory target.
    pub fn prefix_uri(&self) -> String {
        if self.prefix.is_empty() {
            format!("gs://{}/", self.bucket)
        } else {
            format!("gs://{}/{}/", self.bucket, self.prefix)
        }
    }

    /// Upload a local file under `name`, streaming in `chunk_bytes` chunks.
    /// Returns the staged object's URI.
    pub async fn upload_file(
        &self,
        local: &Path,
        name: &str,
        chunk_bytes: usize,
        progress_every: u64,
    ) -> Result<String> {
        let key = self.key(name);
        let size = tokio::fs::metadata(local)
            .await
            .with_context(|| format!("Failed to stat upload source: {}", local.display()))?
            .len();

        info!("Uploading {} -> {}", local.display(), self.uri(name));

        let mut file = tokio::fs::File::open(local)
            .await
            .with_context(|| format!("Failed to open upload source: {}", local.display()))?;
        let mut writer = self
            .operator
            .writer(&key)
            .await
            .with_context(|| format!("Failed to open staged object for write: {}", key))?;

        let mut buf = vec![0u8; chunk_bytes];
        let mut progress = Progress::new("uploaded", progress_every, Some(size));

        loop {
            let n = file
                .read(&mut buf)
                .await
                .context("Read failed during upload")?;
            if n == 0 {
                break;
            }
            writer
                .write(buf[..n].to_vec())
                .await
                .with_context(|| format!("Write failed during upload: {}", key))?;
            progress.tick(n);
        }

        writer
            .close()
            .await
            .with_context(|| format!("Failed to finalize upload: {}", key))?;

        info!("Upload complete: {}", self.uri(name));
        Ok(self.uri(name))
    }

    /// Delete a staged object.
    pub async fn delete(&self, name: &str) -> Result<()> {
        let key = self.key(name);
        self.operator
            .delete(&key)
            .await
            .with_context(|| format!("Failed to delete staged object: {}", key))?;
        Ok(())
    }

    /// True if an object with this name exists.
    pub async fn exists(&self, name: &str) -> Result<bool> {
        match self.operator.stat(&self.key(name)).await {
            Ok(_) => Ok(true),
            Err(e) if e.kind() == opendal::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}
