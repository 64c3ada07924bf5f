//! Beatgrid CLI - The `beatgrid` command.
//!
//! Runs the sequencer core headless against the wall clock and logs every
//! trigger, which is enough to audition patterns and chains without an
//! audio backend.

mod play;

use anyhow::{Context, Result};
use beatgrid_core::EngineConfig;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Beatgrid - 16-step drum sequencer core
#[derive(Parser, Debug)]
#[command(name = "beatgrid")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Headless driver for the beatgrid drum sequencer", long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Play the demo pattern and log triggers
    Play(play::PlayArgs),

    /// Print the default configuration as TOML
    Config {
        /// Load and print this file instead (after clamping)
        #[arg(value_name = "FILE")]
        file: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp(None)
        .init();

    match args.command {
        Commands::Play(play_args) => play::play(play_args),
        Commands::Config { file } => {
            let config = match file {
                Some(path) => EngineConfig::load(&path)
                    .with_context(|| format!("Failed to load config {}", path.display()))?,
                None => EngineConfig::default(),
            };
            let toml = config
                .to_toml_string()
                .context("Failed to serialize config")?;
            print!("{toml}");
            Ok(())
        }
    }
}
