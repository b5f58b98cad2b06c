//! Phase evaluation example.
//!
//! Reads predicted and ground truth class ids from JSON files, shards them over
//! worker threads, and reports per-class and mean IoU for every epoch.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use segmetric::{sink::TracingSink, Phase};
use segmetric_demos::{load_batches, run_phase, EvalConfig};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// JSON file with one list of predicted class ids per batch
    #[arg(short, long)]
    predictions: PathBuf,

    /// JSON file with one list of ground truth class ids per batch
    #[arg(short, long)]
    targets: PathBuf,

    /// Override number of workers
    #[arg(long)]
    world_size: Option<usize>,

    /// Override number of epochs
    #[arg(long)]
    epochs: Option<usize>,

    /// Print the final report as JSON
    #[arg(long)]
    json: bool,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => EvalConfig::load_json(path)?,
        None => EvalConfig::new(),
    };
    if let Some(world_size) = args.world_size {
        config.world_size = world_size;
    }
    if let Some(epochs) = args.epochs {
        config.epochs = epochs;
    }

    let predictions = load_batches(&args.predictions)?;
    let targets = load_batches(&args.targets)?;

    let report = run_phase(&config, Phase::Test, &predictions, &targets, &mut TracingSink)?;

    if args.json {
        let json = serde_json::to_string_pretty(&report).context("failed to serialize report")?;
        println!("{json}");
    } else {
        println!("{report}");
    }
    Ok(())
}
