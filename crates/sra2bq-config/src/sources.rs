// Configuration source loading.
//
// Priority order:
// 1. Environment variables (SRA2BQ_* prefix)
// 2. Config file path from SRA2BQ_CONFIG
// 3. Default config file (./sra2bq.toml)
// 4. Built-in defaults

use crate::*;
use anyhow::{anyhow, Context, Result};
use std::env;
use std::path::Path;

pub const ENV_PREFIX: &str = "SRA2BQ_";

/// Abstraction over environment-variable lookups so tests can supply their
/// own source of overrides.
pub trait EnvSource {
    fn get(&self, key: &str) -> Option<String>;
}

pub(crate) struct StdEnvSource;

impl EnvSource for StdEnvSource {
    fn get(&self, key: &str) -> Option<String> {
        env::var(format!("{}{}", ENV_PREFIX, key)).ok()
    }
}

/// Load configuration from defaults, default file locations and environment.
pub fn load_config() -> Result<RunConfig> {
    let mut config = match load_from_file()? {
        Some(file_config) => file_config,
        None => RunConfig::default(),
    };

    apply_env_overrides(&mut config, &StdEnvSource)?;
    config.validate()?;
    Ok(config)
}

/// Load configuration from a specific file path (for the --config flag).
/// Returns an error if the file doesn't exist or can't be parsed.
pub fn load_from_file_path(path: impl AsRef<Path>) -> Result<RunConfig> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    let mut config: RunConfig = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

    apply_env_overrides(&mut config, &StdEnvSource)?;
    config.validate()?;
    Ok(config)
}

fn load_from_file() -> Result<Option<RunConfig>> {
    if let Ok(path) = env::var(format!("{}CONFIG", ENV_PREFIX)) {
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {}", path))?;
        let config: RunConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path))?;
        return Ok(Some(config));
    }

    let default_path = "./sra2bq.toml";
    if Path::new(default_path).exists() {
        let content = std::fs::read_to_string(default_path)
            .with_context(|| format!("Failed to read config file: {}", default_path))?;
        let config: RunConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", default_path))?;
        return Ok(Some(config));
    }

    Ok(None)
}

/// Apply environment-variable overrides (highest priority).
pub fn apply_env_overrides<E: EnvSource>(config: &mut RunConfig, env: &E) -> Result<()> {
    // Warehouse coordinates
    if let Some(project) = env.get("PROJECT") {
        config.gcp.project = project;
    }
    if let Some(dataset) = env.get("DATASET") {
        config.gcp.dataset = dataset;
    }
    if let Some(credentials) = env.get("CREDENTIALS") {
        config.gcp.credentials = Some(credentials.into());
    }

    // Staging
    if let Some(bucket) = env.get("STAGING_BUCKET") {
        config.staging.bucket = bucket;
    }
    if let Some(prefix) = env.get("STAGING_PREFIX") {
        config.staging.prefix = prefix;
    }
    if let Some(val) = get_env_bool(env, "KEEP_STAGED")? {
        config.staging.keep_staged = val;
    }
    if let Some(uploader) = env.get("UPLOADER") {
        config.staging.uploader = uploader
            .parse::<Uploader>()
            .context("Invalid SRA2BQ_UPLOADER value")?;
    }
    if let Some(bin) = env.get("GCLOUD_BIN") {
        config.staging.gcloud_bin = bin;
    }

    // Transfer
    if let Some(val) = get_env_usize(env, "TRANSFER_CHUNK_BYTES")? {
        config.transfer.chunk_bytes = val;
    }
    if let Some(val) = get_env_u64(env, "PROGRESS_EVERY")? {
        config.transfer.progress_every = val;
    }

    // Load job
    if let Some(val) = get_env_u64(env, "LOAD_POLL_SECS")? {
        config.load.poll_secs = val;
    }
    if let Some(val) = get_env_u64(env, "LOAD_TIMEOUT_SECS")? {
        config.load.timeout_secs = val;
    }

    // sample-map pipeline
    if let Some(table) = env.get("SAMPLE_MAP_TABLE") {
        config.sample_map.table = table;
    }
    if let Some(csv) = env.get("SAMPLE_MAP_CSV") {
        config.sample_map.csv = csv.into();
    }

    // accessions pipeline
    if let Some(table) = env.get("ACCESSIONS_TABLE") {
        config.accessions.table = table;
    }
    if let Some(url) = env.get("ACCESSIONS_URL") {
        config.accessions.url = url;
    }
    if let Some(codec) = env.get("ACCESSIONS_CODEC") {
        config.accessions.codec = codec
            .parse::<Codec>()
            .context("Invalid SRA2BQ_ACCESSIONS_CODEC value")?;
    }
    if let Some(val) = get_env_u64(env, "ACCESSIONS_CHUNK_BYTES")? {
        config.accessions.target_chunk_bytes = val;
    }

    // Logging
    if let Some(level) = env.get("LOG_LEVEL") {
        config.log.level = level;
    }
    if let Some(format) = env.get("LOG_FORMAT") {
        config.log.format = match format.to_lowercase().as_str() {
            "json" => LogFormat::Json,
            _ => LogFormat::Text,
        };
    }

    Ok(())
}

fn get_env_usize<E: EnvSource>(env: &E, key: &str) -> Result<Option<usize>> {
    match env.get(key) {
        Some(val) => {
            let parsed = val
                .parse::<usize>()
                .map_err(|e| anyhow!("Failed to parse {}{}: {}", ENV_PREFIX, key, e))?;
            Ok(Some(parsed))
        }
        None => Ok(None),
    }
}

fn get_env_u64<E: EnvSource>(env: &E, key: &str) -> Result<Option<u64>> {
    match env.get(key) {
        Some(val) => {
            let parsed = val
                .parse::<u64>()
                .map_err(|e| anyhow!("Failed to parse {}{}: {}", ENV_PREFIX, key, e))?;
            Ok(Some(parsed))
        }
        None => Ok(None),
    }
}

fn get_env_bool<E: EnvSource>(env: &E, key: &str) -> Result<Option<bool>> {
    match env.get(key) {
        Some(val) => {
            let parsed = val.parse::<bool>().map_err(|e| {
                anyhow!(
                    "Failed to parse {}{} (expected bool): {}",
                    ENV_PREFIX,
                    key,
                    e
                )
            })?;
            Ok(Some(parsed))
        }
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    struct MapEnv(HashMap<&'static str, &'static str>);

    impl EnvSource for MapEnv {
        fn get(&self, key: &str) -> Option<String> {
            self.0.get(key).map(|v| v.to_string())
        }
    }

    #[test]
    fn env_overrides_take_priority() {
        let mut config = RunConfig::default();
        let env = MapEnv(HashMap::from([
            ("PROJECT", "override-project"),
            ("STAGING_BUCKET", "override-bucket"),
            ("KEEP_STAGED", "true"),
            ("ACCESSIONS_CODEC", "parquet"),
            ("LOAD_TIMEOUT_SECS", "60"),
        ]));

        apply_env_overrides(&mut config, &env).unwrap();

        assert_eq!(config.gcp.project, "override-project");
        assert_eq!(config.staging.bucket, "override-bucket");
        assert!(config.staging.keep_staged);
        assert_eq!(config.accessions.codec, Codec::Parquet);
        assert_eq!(config.load.timeout_secs, 60);
        // Untouched values keep defaults
        assert_eq!(config.gcp.dataset, "curatedmetagenomicsdata");
    }

    #[test]
    fn bad_numeric_env_is_an_error() {
        let mut config = RunConfig::default();
        let env = MapEnv(HashMap::from([("TRANSFER_CHUNK_BYTES", "ten")]));
        assert!(apply_env_overrides(&mut config, &env).is_err());
    }

    #[test]
    fn bad_enum_env_is_an_error() {
        let mut config = RunConfig::default();
        let env = MapEnv(HashMap::from([("UPLOADER", "scp")]));
        assert!(apply_env_overrides(&mut config, &env).is_err());
    }
}
