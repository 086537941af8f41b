//! Training command implementation.

use crate::session::Session;
use anyhow::Result;
use colored::Colorize;
use lumen_core::{Config, SignalValue, events};
use std::path::PathBuf;

#[derive(Debug)]
pub struct TrainOptions {
    pub data: PathBuf,
    pub pipeline: Option<String>,
    pub run_name: Option<String>,
    pub model_args: String,
    pub trainer_args: String,
}

pub async fn execute(config: Config, options: TrainOptions) -> Result<()> {
    let pipeline = options.pipeline.unwrap_or_else(|| config.default_pipeline.clone());
    let run_name = options.run_name.unwrap_or_else(|| config.default_run_name.clone());

    println!();
    println!("{}", format!("Training {pipeline}").bold().cyan());
    println!("  Data: {}", options.data.display().to_string().dimmed());
    println!();

    let mut session = Session::open(config, false)?;
    session.emit(events::TRAIN_PIPELINE, &[SignalValue::Text(pipeline)])?;
    session.emit(events::TRAIN_DIRPATH, &[SignalValue::Path(options.data)])?;
    session.emit(events::MODEL_HP, &[SignalValue::Text(options.model_args)])?;
    session.emit(events::TRAINER_HP, &[SignalValue::Text(options.trainer_args)])?;
    session.emit(events::RUN_NAME, &[SignalValue::Text(run_name)])?;
    session.emit(events::TRAIN_BUTTON, &[])?;
    session.settle().await?;

    println!();
    Ok(())
}
