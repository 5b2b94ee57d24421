// Configuration validation
//
// Validates that required fields are present and values are sensible

use crate::*;
use anyhow::{bail, Result};
use tracing::warn;

pub fn validate_config(config: &RunConfig) -> Result<()> {
    validate_gcp_config(&config.gcp)?;
    validate_staging_config(&config.staging)?;
    validate_transfer_config(&config.transfer)?;
    validate_load_config(&config.load)?;

    if config.sample_map.table.is_empty() {
        bail!("sample_map.table must not be empty");
    }
    if config.accessions.table.is_empty() {
        bail!("accessions.table must not be empty");
    }
    if config.accessions.url.is_empty() {
        bail!("accessions.url must not be empty");
    }
    if !config.accessions.url.starts_with("http://") && !config.accessions.url.starts_with("https://") {
        bail!("accessions.url must be an http(s) URL");
    }
    if config.accessions.target_chunk_bytes == 0 {
        bail!("accessions.target_chunk_bytes must be greater than 0");
    }

    Ok(())
}

fn validate_gcp_config(config: &GcpConfig) -> Result<()> {
    if config.project.is_empty() {
        bail!("gcp.project must not be empty");
    }
    if config.dataset.is_empty() {
        bail!("gcp.dataset must not be empty");
    }
    Ok(())
}

fn validate_staging_config(config: &StagingConfig) -> Result<()> {
    if config.bucket.is_empty() {
        bail!("staging.bucket must not be empty");
    }
    if config.prefix.starts_with('/') || config.prefix.ends_with('/') {
        bail!("staging.prefix must not start or end with '/'");
    }
    if config.uploader == Uploader::Gcloud && config.gcloud_bin.is_empty() {
        bail!("staging.gcloud_bin must not be empty when uploader is gcloud");
    }
    Ok(())
}

fn validate_transfer_config(config: &TransferConfig) -> Result<()> {
    if config.chunk_bytes == 0 {
        bail!("transfer.chunk_bytes must be greater than 0");
    }
    if config.progress_every == 0 {
        bail!("transfer.progress_every must be greater than 0");
    }

    if config.chunk_bytes > 256 * 1024 * 1024 {
        warn!(
            chunk_bytes = config.chunk_bytes,
            "transfer.chunk_bytes is very large; may cause memory issues"
        );
    }

    Ok(())
}

fn validate_load_config(config: &LoadConfig) -> Result<()> {
    if config.poll_secs == 0 {
        bail!("load.poll_secs must be greater than 0");
    }
    if config.timeout_secs == 0 {
        bail!("load.timeout_secs must be greater than 0");
    }
    if config.timeout_secs < config.poll_secs {
        bail!("load.timeout_secs must be at least load.poll_secs");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(validate_config(&RunConfig::default()).is_ok());
    }

    #[test]
    fn empty_project_rejected() {
        let mut config = RunConfig::default();
        config.gcp.project = String::new();
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn slash_prefix_rejected() {
        let mut config = RunConfig::default();
        config.staging.prefix = "sra_metadata/".to_string();
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn zero_chunk_bytes_rejected() {
        let mut config = RunConfig::default();
        config.transfer.chunk_bytes = 0;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn timeout_below_poll_rejected() {
        let mut config = RunConfig::default();
        config.load.poll_secs = 30;
        config.load.timeout_secs = 5;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn non_http_url_rejected() {
        let mut config = RunConfig::default();
        config.accessions.url = "ftp://ftp.ncbi.nlm.nih.gov/x.tab".to_string();
        assert!(validate_config(&config).is_err());
    }
}
