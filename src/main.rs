// src/main.rs

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use conflux::properties::INFO_PREFIX;
use conflux::{ConfigurationSink, Identity, MemorySink, Pipeline, PipelineConfig, PropertySet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "conflux")]
#[command(
    author,
    version,
    about = "Adapt configuration files and apply them to a configuration store",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Feed configuration files through the pipeline and print the store
    Apply {
        /// Pipeline configuration (default: /etc/conflux/pipeline.toml if present)
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Bind every configuration to this location
        #[arg(short, long)]
        location: Option<String>,
        /// Seconds to wait for the pipeline to drain
        #[arg(short, long, default_value_t = 10)]
        timeout: u64,
        /// Configuration files (`pid.cfg` or `factoryPid-instance.cfg`)
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Print the effective pipeline configuration
    ShowConfig {
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

/// Derive an identity from a file name
///
/// `pid.cfg` names a plain pid, `factoryPid-instance.cfg` a factory
/// instance (split at the first `-`).
fn identity_for_path(path: &Path, location: Option<&str>) -> Result<Identity> {
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .with_context(|| format!("No usable file name in {}", path.display()))?;

    let identity = match stem.split_once('-') {
        Some((factory_pid, instance)) => {
            Identity::from_parts(None, Some(factory_pid), Some(instance), location)?
        }
        None => Identity::from_parts(Some(stem), None, None, location)?,
    };
    Ok(identity)
}

async fn cmd_apply(
    config: Option<PathBuf>,
    location: Option<String>,
    timeout: u64,
    files: Vec<PathBuf>,
) -> Result<()> {
    let config = PipelineConfig::load_or_default(config.as_deref())?;
    let pipeline = Pipeline::new(config);
    let sink = Arc::new(MemorySink::new());
    pipeline.set_sink(Some(sink.clone() as Arc<dyn ConfigurationSink>));
    pipeline.start()?;

    for file in files {
        let identity = identity_for_path(&file, location.as_deref())?;
        info!("Applying {} as {}", file.display(), identity);

        let metadata =
            PropertySet::new().with(format!("{}origin", INFO_PREFIX), file.display().to_string());
        pipeline.update(identity, Arc::new(file), metadata);
    }

    if !pipeline.wait_idle(Duration::from_secs(timeout)).await {
        warn!("Pipeline did not drain within {}s", timeout);
    }
    let parked = pipeline.transformations().failed_len();
    if parked > 0 {
        warn!("{} file(s) could not be adapted", parked);
    }
    pipeline.stop().await;

    println!("{}", serde_json::to_string_pretty(&sink.snapshot())?);
    Ok(())
}

fn cmd_show_config(config: Option<PathBuf>) -> Result<()> {
    let config = PipelineConfig::load_or_default(config.as_deref())?;
    print!("{}", toml::to_string_pretty(&config)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    conflux::logging::init("info");

    let cli = Cli::parse();
    match cli.command {
        Commands::Apply {
            config,
            location,
            timeout,
            files,
        } => cmd_apply(config, location, timeout, files).await,
        Commands::ShowConfig { config } => cmd_show_config(config),
    }
}
