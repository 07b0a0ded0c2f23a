//! Delphi command line interface
//!
//! Mines PE header features from a malware and a benign corpus, persists
//! them, trains a decision tree classifier and classifies new executables.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::{debug, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

mod commands;
mod settings;

use settings::Settings;

#[derive(Parser)]
#[command(name = "delphi")]
#[command(about = "PE header feature mining and malware classification", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file (defaults to config/config.yml when present)
    #[arg(short, long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Mine both corpora and save the features to a timestamped CSV file
    Mine,
    /// Append features from a mined CSV file to the configured store
    Upload {
        /// CSV file written by `mine`
        file: PathBuf,
    },
    /// Mine (or load) features, train a classifier and write the model
    Train,
    /// Classify executables with a trained model
    Predict {
        /// Model file (.json)
        model: PathBuf,
        /// Executables to classify
        #[arg(required = true)]
        executables: Vec<PathBuf>,
    },
}

fn init_logging(verbose: bool) -> Result<()> {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.as_str().to_lowercase()));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose)?;

    let settings = Settings::load(cli.config.as_deref())?;
    debug!("Settings: {:?}", settings);

    match cli.command {
        Commands::Mine => {
            let (path, report) = commands::mine_to_csv(&settings)?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            println!("Features saved to {}", path.display());
        }
        Commands::Upload { file } => {
            let rows = commands::upload(&settings, &file)?;
            println!("Uploaded {} rows from {}", rows, file.display());
        }
        Commands::Train => {
            let summary = commands::train(&settings)?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        Commands::Predict { model, executables } => {
            for prediction in commands::predict(&model, &executables)? {
                println!("{}", serde_json::to_string(&prediction)?);
            }
        }
    }

    Ok(())
}
