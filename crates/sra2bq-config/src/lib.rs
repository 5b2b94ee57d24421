// sra2bq-config - Layered configuration for the loader pipelines
//
// Sources, in priority order:
// 1. Environment variables (SRA2BQ_* prefix)
// 2. Config file path from SRA2BQ_CONFIG env var
// 3. Default config file location (./sra2bq.toml)
// 4. Built-in defaults (the production project/dataset/bucket constants)

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

mod sources;
mod validation;

pub use sources::EnvSource;

/// Resolved configuration for a loader run
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RunConfig {
    #[serde(default)]
    pub gcp: GcpConfig,

    #[serde(default)]
    pub staging: StagingConfig,

    #[serde(default)]
    pub transfer: TransferConfig,

    #[serde(default)]
    pub load: LoadConfig,

    #[serde(default)]
    pub sample_map: SampleMapConfig,

    #[serde(default)]
    pub accessions: AccessionsConfig,

    #[serde(default)]
    pub log: LogConfig,
}

/// Warehouse project coordinates
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GcpConfig {
    #[serde(default = "default_project")]
    pub project: String,

    #[serde(default = "default_dataset")]
    pub dataset: String,

    /// Service account key file. Application-default credentials when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credentials: Option<PathBuf>,
}

fn default_project() -> String {
    "curatedmetagenomicdata".to_string()
}

fn default_dataset() -> String {
    "curatedmetagenomicsdata".to_string()
}

impl Default for GcpConfig {
    fn default() -> Self {
        Self {
            project: default_project(),
            dataset: default_dataset(),
            credentials: None,
        }
    }
}

impl GcpConfig {
    /// Fully-qualified table name: `project.dataset.table`
    pub fn table_fqn(&self, table: &str) -> String {
        format!("{}.{}.{}", self.project, self.dataset, table)
    }
}

/// Object-storage staging area
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StagingConfig {
    #[serde(default = "default_bucket")]
    pub bucket: String,

    #[serde(default = "default_prefix")]
    pub prefix: String,

    /// Retain staged objects after a successful load.
    #[serde(default)]
    pub keep_staged: bool,

    #[serde(default)]
    pub uploader: Uploader,

    /// Binary invoked when `uploader = "gcloud"`.
    #[serde(default = "default_gcloud_bin")]
    pub gcloud_bin: String,
}

fn default_bucket() -> String {
    "cmgd-data".to_string()
}

fn default_prefix() -> String {
    "sra_metadata".to_string()
}

fn default_gcloud_bin() -> String {
    "gcloud".to_string()
}

impl Default for StagingConfig {
    fn default() -> Self {
        Self {
            bucket: default_bucket(),
            prefix: default_prefix(),
            keep_staged: false,
            uploader: Uploader::Client,
            gcloud_bin: default_gcloud_bin(),
        }
    }
}

/// Upload mechanism for the stage step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Uploader {
    /// Direct upload through the storage client
    #[default]
    Client,
    /// Shell out to `gcloud storage cp` for parallel composite upload
    Gcloud,
}

impl std::fmt::Display for Uploader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Uploader::Client => write!(f, "client"),
            Uploader::Gcloud => write!(f, "gcloud"),
        }
    }
}

impl std::str::FromStr for Uploader {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "client" => Ok(Uploader::Client),
            "gcloud" | "cli" => Ok(Uploader::Gcloud),
            _ => anyhow::bail!("Unsupported uploader: {}. Supported: client, gcloud", s),
        }
    }
}

/// Download behavior for the transfer step
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferConfig {
    /// Chunk size for streaming reads and writes.
    #[serde(default = "default_chunk_bytes")]
    pub chunk_bytes: usize,

    /// Emit a progress line every this many chunks.
    #[serde(default = "default_progress_every")]
    pub progress_every: u64,
}

fn default_chunk_bytes() -> usize {
    10 * 1024 * 1024
}

fn default_progress_every() -> u64 {
    10
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            chunk_bytes: default_chunk_bytes(),
            progress_every: default_progress_every(),
        }
    }
}

/// Load-job polling and timeout behavior
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadConfig {
    #[serde(default = "default_poll_secs")]
    pub poll_secs: u64,

    /// Upper bound on the load-job wait; the job is cancelled on expiry.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_poll_secs() -> u64 {
    10
}

fn default_timeout_secs() -> u64 {
    7200
}

impl Default for LoadConfig {
    fn default() -> Self {
        Self {
            poll_secs: default_poll_secs(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl LoadConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_secs)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// sample-map pipeline: local CSV source and destination table
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SampleMapConfig {
    #[serde(default = "default_sample_map_table")]
    pub table: String,

    #[serde(default = "default_sample_map_csv")]
    pub csv: PathBuf,
}

fn default_sample_map_table() -> String {
    "src_sample_id_map".to_string()
}

fn default_sample_map_csv() -> PathBuf {
    PathBuf::from("data/sample_id_map.csv")
}

impl Default for SampleMapConfig {
    fn default() -> Self {
        Self {
            table: default_sample_map_table(),
            csv: default_sample_map_csv(),
        }
    }
}

/// accessions pipeline: remote source, destination table and re-encoding
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessionsConfig {
    #[serde(default = "default_accessions_table")]
    pub table: String,

    #[serde(default = "default_accessions_url")]
    pub url: String,

    #[serde(default)]
    pub codec: Codec,

    /// Target size of each Parquet chunk file when `codec = "parquet"`.
    #[serde(default = "default_target_chunk_bytes")]
    pub target_chunk_bytes: u64,
}

fn default_accessions_table() -> String {
    "sra_accessions".to_string()
}

fn default_accessions_url() -> String {
    "https://ftp.ncbi.nlm.nih.gov/sra/reports/Metadata/SRA_Accessions.tab".to_string()
}

fn default_target_chunk_bytes() -> u64 {
    1024 * 1024 * 1024
}

impl Default for AccessionsConfig {
    fn default() -> Self {
        Self {
            table: default_accessions_table(),
            url: default_accessions_url(),
            codec: Codec::Gzip,
            target_chunk_bytes: default_target_chunk_bytes(),
        }
    }
}

/// Re-encoding applied before staging
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Codec {
    #[default]
    Gzip,
    Parquet,
}

impl std::fmt::Display for Codec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Codec::Gzip => write!(f, "gzip"),
            Codec::Parquet => write!(f, "parquet"),
        }
    }
}

impl std::str::FromStr for Codec {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "gzip" | "gz" => Ok(Codec::Gzip),
            "parquet" | "columnar" => Ok(Codec::Parquet),
            _ => anyhow::bail!("Unsupported codec: {}. Supported: gzip, parquet", s),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default)]
    pub format: LogFormat,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::Text,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl RunConfig {
    /// Load configuration from all sources with priority
    pub fn load() -> Result<Self> {
        sources::load_config()
    }

    /// Load configuration from a specific file path (for the --config flag)
    pub fn load_from_path(path: impl AsRef<std::path::Path>) -> Result<Self> {
        sources::load_from_file_path(path)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        validation::validate_config(self)
    }
}
