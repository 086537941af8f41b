//! Lumen CLI - train and run image pipelines from the terminal
//!
//! This CLI provides a `lumen` command that drives the same controller a
//! graphical front end would, printing the controller's feedback as it arrives.

mod commands;
mod session;

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use commands::{WeightsCommand, dashboard, infer, pipelines, train, weights};
use lumen_core::Config;

/// Lumen CLI - computer vision training and inference
#[derive(Parser, Debug)]
#[command(
    name = "lumen",
    author,
    version,
    about = "Lumen - train, manage and run computer vision pipelines",
    long_about = "Lumen trains image pipelines into a workspace of weights and logs,\nruns cached batch inference with trained weights, and writes experiment reports."
)]
struct Args {
    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info", global = true)]
    log_level: String,

    /// Workspace directory (overrides LUMEN_WORKSPACE and config files)
    #[arg(short = 'w', long, global = true)]
    workspace: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Train a new set of weights
    ///
    /// Runs a training job in the background and saves the best checkpoint
    /// under the run name once it finishes. Ctrl-C cancels the job.
    Train {
        /// Training data directory
        data: PathBuf,

        /// Pipeline id (defaults to the configured pipeline)
        #[arg(short, long)]
        pipeline: Option<String>,

        /// Name for the trained weights
        #[arg(short = 'n', long)]
        run_name: Option<String>,

        /// Model hyperparameters, e.g. "--lr 0.01 --batch_size 16"
        #[arg(long, default_value = "", allow_hyphen_values = true)]
        model_args: String,

        /// Trainer options, e.g. "--max_epochs 5"
        #[arg(long, default_value = "", allow_hyphen_values = true)]
        trainer_args: String,
    },

    /// Predict labels for every image in a directory
    Infer {
        /// Directory of images
        images: PathBuf,

        /// Name of the trained weights to use
        #[arg(long)]
        weights: String,

        /// Pipeline the weights belong to (defaults to the configured pipeline)
        #[arg(short, long)]
        pipeline: Option<String>,

        /// Also write an experiment report
        #[arg(long)]
        report: bool,

        /// Where reports are written (overrides config)
        #[arg(long)]
        reports_dir: Option<PathBuf>,

        /// Output predictions as JSON
        #[arg(long)]
        json: bool,
    },

    /// Manage trained weights
    #[command(subcommand)]
    Weights(WeightsCommand),

    /// Launch the training metrics dashboard
    Dashboard {
        /// Pipeline whose logs to show (defaults to the configured pipeline)
        #[arg(short, long)]
        pipeline: Option<String>,
    },

    /// List registered pipelines
    Pipelines {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize tracing
    let level = match args.log_level.as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .without_time()
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    // Load configuration; the CLI flag wins over files and environment
    let mut config = Config::discover_and_load().context("Failed to load configuration")?;
    if let Some(workspace) = args.workspace {
        config.workspace = workspace;
    }
    tracing::debug!(workspace = %config.workspace.display(), "using workspace");

    match args.command {
        Command::Train { data, pipeline, run_name, model_args, trainer_args } => {
            train::execute(config, train::TrainOptions { data, pipeline, run_name, model_args, trainer_args }).await?;
        }
        Command::Infer { images, weights, pipeline, report, reports_dir, json } => {
            if let Some(dir) = reports_dir {
                config.set_reports_dir(dir);
            }
            infer::execute(config, infer::InferOptions { images, weights, pipeline, report, json }).await?;
        }
        Command::Weights(cmd) => {
            weights::execute(config, cmd).await?;
        }
        Command::Dashboard { pipeline } => {
            dashboard::execute(config, pipeline).await?;
        }
        Command::Pipelines { json } => {
            pipelines::execute(json)?;
        }
    }

    Ok(())
}
