// Initialization utilities: logging/tracing setup, staging store and
// warehouse client construction from the resolved configuration.

use anyhow::{Context, Result};
use sra2bq_config::{LogFormat, RunConfig};
use sra2bq_transport::StagingStore;
use sra2bq_warehouse::BigQueryWarehouse;
use tracing::info;

/// Initialize tracing/logging from RunConfig
pub fn init_tracing(config: &RunConfig) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let env_filter =
        EnvFilter::try_new(&config.log.level).unwrap_or_else(|_| EnvFilter::new("info"));

    let registry = tracing_subscriber::registry().with(env_filter);

    match config.log.format {
        LogFormat::Json => {
            registry.with(fmt::layer().json()).init();
        }
        LogFormat::Text => {
            registry.with(fmt::layer()).init();
        }
    }
}

/// Build the GCS staging store from config
pub fn build_store(config: &RunConfig) -> Result<StagingStore> {
    info!(
        "Using staging bucket gs://{}/{}",
        config.staging.bucket, config.staging.prefix
    );
    StagingStore::gcs(
        &config.staging.bucket,
        &config.staging.prefix,
        config.gcp.credentials.as_deref(),
    )
    .context("Failed to initialize staging store")
}

/// Build the BigQuery warehouse client from config
pub async fn build_warehouse(config: &RunConfig) -> Result<BigQueryWarehouse> {
    BigQueryWarehouse::connect(
        &config.gcp.project,
        config.gcp.credentials.as_deref(),
        config.load.poll_interval(),
        config.load.timeout(),
    )
    .await
    .context("Failed to initialize warehouse client")
}
