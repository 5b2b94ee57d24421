use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use sra2bq_config::RunConfig;
use std::path::PathBuf;

/// Reference-dataset loaders for BigQuery
#[derive(Parser)]
#[command(name = "sra2bq")]
#[command(version)]
#[command(about = "Load SRA reference datasets into BigQuery", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to configuration file
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Log level: trace, debug, info, warn, error
    #[arg(short = 'v', long, value_name = "LEVEL", global = true)]
    log_level: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Load the checked-in sample_id_map.csv into src_sample_id_map
    SampleMap,
    /// Download SRA_Accessions.tab from NCBI and load it into sra_accessions
    Accessions {
        /// Keep staged objects after the load
        #[arg(long)]
        keep_staged: bool,

        /// Re-encoding before staging: gzip or parquet
        #[arg(long, value_name = "CODEC")]
        codec: Option<String>,
    },
    /// Print the resolved configuration as TOML
    ShowConfig,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Build tokio runtime and run the async pipeline
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to build tokio runtime")?
        .block_on(async_main(cli))
}

async fn async_main(cli: Cli) -> Result<()> {
    // Step 1: Load base configuration
    let mut config = if let Some(config_path) = &cli.config {
        RunConfig::load_from_path(config_path)
            .with_context(|| format!("Failed to load config from {}", config_path.display()))?
    } else {
        RunConfig::load().context("Failed to load configuration")?
    };

    // Step 2: Apply CLI overrides (highest priority)
    if let Some(level) = &cli.log_level {
        config.log.level = level.clone();
    }
    if let Commands::Accessions { keep_staged, codec } = &cli.command {
        if *keep_staged {
            config.staging.keep_staged = true;
        }
        if let Some(codec) = codec {
            config.accessions.codec = codec.parse().context("Invalid --codec value")?;
        }
    }

    // Step 3: Initialize tracing before any pipeline work
    sra2bq::init::init_tracing(&config);

    // Step 4: Dispatch
    match cli.command {
        Commands::ShowConfig => {
            print!(
                "{}",
                toml::to_string_pretty(&config).context("Failed to render configuration")?
            );
            Ok(())
        }
        Commands::SampleMap => {
            let store = sra2bq::init::build_store(&config)?;
            let warehouse = sra2bq::init::build_warehouse(&config).await?;
            sra2bq::pipeline::sample_map::run(&config, &store, &warehouse).await
        }
        Commands::Accessions { .. } => {
            let store = sra2bq::init::build_store(&config)?;
            let warehouse = sra2bq::init::build_warehouse(&config).await?;
            sra2bq::pipeline::accessions::run(&config, &store, &warehouse).await
        }
    }
}
