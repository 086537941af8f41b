//! Metrics dashboard command implementation.

use crate::session::Session;
use anyhow::Result;
use colored::Colorize;
use lumen_core::{Config, SignalValue, events};
use lumen_training::TrainingLayout;

pub async fn execute(config: Config, pipeline: Option<String>) -> Result<()> {
    let pipeline = pipeline.unwrap_or_else(|| config.default_pipeline.clone());
    let logs = TrainingLayout::new(config.workspace.clone()).pipeline_logs(&pipeline);
    let program = config.dashboard.program.clone();

    let mut session = Session::open(config, false)?;
    session.emit(events::TRAIN_PIPELINE, &[SignalValue::Text(pipeline)])?;
    session.emit(events::DASH_BUTTON, &[])?;
    session.settle().await?;

    println!("{} {} on {}", "Launched".green(), program.cyan(), logs.display().to_string().dimmed());
    Ok(())
}
