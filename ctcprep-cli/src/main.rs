//! ctcprep - inspect CTC speech manifests
//!
//! `describe` summarizes a manifest, `check` fetches every entry once and
//! reports why entries fail, `batch` collates the first batch and prints
//! the tensor shapes a training step would receive.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use ctcprep_data::{BatchLoader, DataConfig, DataError, Manifest, SampleSource};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "ctcprep", version, about = "Inspect CTC speech manifests")]
struct Cli {
    /// Configuration file (defaults to the per-user config, or built-in defaults)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print manifest statistics
    Describe {
        /// Manifest file (JSON array or JSON Lines)
        manifest: PathBuf,
    },
    /// Fetch every entry once without fallback and report failures
    Check {
        manifest: PathBuf,
        /// Treat as training data (apply augmentation)
        #[arg(long)]
        train: bool,
    },
    /// Collate the first batch and print its shapes
    Batch {
        manifest: PathBuf,
        #[arg(long)]
        train: bool,
        /// Override the configured batch size
        #[arg(long)]
        size: Option<usize>,
        /// Seed for the epoch order
        #[arg(long, default_value_t = 0)]
        seed: u64,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let config_path = cli.config.clone().unwrap_or_else(DataConfig::default_path);
    let config = DataConfig::load_or_default(&config_path)
        .with_context(|| format!("Failed to load configuration from {}", config_path.display()))?;

    match cli.command {
        Command::Describe { manifest } => describe(&manifest),
        Command::Check { manifest, train } => check(&manifest, &config, train),
        Command::Batch {
            manifest,
            train,
            size,
            seed,
        } => batch(&manifest, &config, train, size, seed),
    }
}

fn describe(manifest: &Path) -> Result<()> {
    let manifest = Manifest::from_path(manifest).context("Failed to load manifest")?;
    println!("{}", manifest.describe());
    Ok(())
}

fn check(manifest: &Path, config: &DataConfig, train: bool) -> Result<()> {
    let config = DataConfig {
        log_failures: false,
        ..config.clone()
    };
    let source = SampleSource::from_manifest_path(manifest, &config, !train)
        .context("Failed to build dataset")?;

    let mut rng = rand::thread_rng();
    let mut accepted = 0usize;
    let mut failures: BTreeMap<String, usize> = BTreeMap::new();

    for index in 0..source.len() {
        match source.try_get(index, &mut rng) {
            Ok(_) => accepted += 1,
            Err(e) => {
                let key = source
                    .manifest()
                    .get(index)
                    .map(|u| u.key.display().to_string())
                    .unwrap_or_default();
                warn!("{} ({}): {}", index, key, e);
                *failures.entry(failure_kind(&e).to_string()).or_default() += 1;
            }
        }
    }

    println!("entries:   {}", source.len());
    println!("accepted:  {}", accepted);
    for (kind, count) in &failures {
        println!("{:<10} {}", format!("{}:", kind), count);
    }
    Ok(())
}

fn failure_kind(error: &DataError) -> &'static str {
    match error {
        DataError::Audio(_) | DataError::Io(_) => "load",
        DataError::Rejected { .. } => "rejected",
        DataError::UnknownCharacter { .. } => "alphabet",
        _ => "other",
    }
}

fn batch(
    manifest: &Path,
    config: &DataConfig,
    train: bool,
    size: Option<usize>,
    seed: u64,
) -> Result<()> {
    let config = DataConfig {
        batch_size: size.unwrap_or(config.batch_size),
        ..config.clone()
    };
    let source = SampleSource::from_manifest_path(manifest, &config, !train)
        .context("Failed to build dataset")?;
    let loader = BatchLoader::from_config(&source, &config);
    info!("{} batches of up to {}", loader.num_batches(), config.batch_size);

    let mut rng = StdRng::seed_from_u64(seed);
    let batch = loader
        .epoch(&mut rng)
        .next()
        .context("Manifest is empty")?
        .context("Failed to load first batch")?;

    println!("spectrograms:  {:?}", batch.spectrograms.shape());
    println!("labels:        {:?}", batch.labels.shape());
    println!("input_lengths: {:?}", batch.input_lengths);
    println!("label_lengths: {:?}", batch.label_lengths);
    Ok(())
}
