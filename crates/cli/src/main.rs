//! rgbd-detect - template-based object detection for RGB-D scenes
//!
//! Command-line interface over the training and detection pipelines.

use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand};
use rayon::ThreadPoolBuilder;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

mod commands;

use commands::detect::DetectCommand;
use commands::train::TrainCommand;

#[derive(Parser)]
#[command(
    name = "rgbd-detect",
    version,
    about = "Template-based 6-DoF object detection in RGB-D scenes",
    long_about = "Detect rigid, textureless objects in cluttered RGB-D scenes using a \n\
                  trained library of per-object templates. Detection runs a cascade of \n\
                  objectness filtering, triplet-hash candidate lookup and five-test \n\
                  template verification over a scale pyramid.",
    after_help = "EXAMPLES:\n  \
                  # Train objects 02 and 05 from a dataset root\n  \
                  rgbd-detect train --dataset ./data/objects --output ./trained 02 05\n\n  \
                  # Detect over all scenes of a scene folder\n  \
                  rgbd-detect detect --trained ./trained --scenes ./data/scene_01\n\n  \
                  # Detect a scene subset with a wider pyramid\n  \
                  rgbd-detect detect --trained ./trained --scenes ./data/scene_01 \\\n      \
                  --levels-down 3 --levels-up 2 --scale-factor 1.25 0 1 2"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Train templates and hash tables from per-object folders
    Train(TrainCommand),

    /// Detect trained objects in RGB-D scenes
    Detect(DetectCommand),
}

fn main() -> Result<()> {
    // Thread-count override, mainly so tests can bound parallelism
    if let Ok(threads_str) = std::env::var("RGBD_DETECT_THREADS") {
        if let Ok(num_threads) = threads_str.parse::<usize>() {
            ThreadPoolBuilder::new()
                .num_threads(num_threads)
                .build_global()
                .ok();
        }
    }

    let cli = Cli::parse();

    let log_level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")?;

    match cli.command {
        Commands::Train(cmd) => cmd.execute(),
        Commands::Detect(cmd) => cmd.execute(),
    }
}
