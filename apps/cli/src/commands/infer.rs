//! Inference command implementation.

use crate::session::Session;
use anyhow::Result;
use colored::Colorize;
use lumen_core::{Config, SignalValue, events};
use serde_json::json;
use std::path::PathBuf;

#[derive(Debug)]
pub struct InferOptions {
    pub images: PathBuf,
    pub weights: String,
    pub pipeline: Option<String>,
    pub report: bool,
    pub json: bool,
}

pub async fn execute(config: Config, options: InferOptions) -> Result<()> {
    let pipeline = options.pipeline.unwrap_or_else(|| config.default_pipeline.clone());
    let mut session = Session::open(config, options.json)?;

    let selection = session.select(&pipeline, &options.weights)?;
    session.emit(events::WEIGHT_SELECTION, &[SignalValue::Weight(selection)])?;
    session.emit(events::INFERENCE_DIRPATH, &[SignalValue::Path(options.images)])?;
    session.emit(events::INFERENCE_BUTTON, &[])?;
    session.settle().await?;

    if options.report {
        session.emit(events::REPORT_BUTTON, &[])?;
    }

    let state = session.controller().inference();
    if options.json {
        let out: Vec<_> = state
            .image_list()
            .iter()
            .zip(state.predicted_labels())
            .map(|(image, label)| json!({ "image": image, "label": label }))
            .collect();
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    println!();
    println!("{}", format!("Predictions ({})", state.len()).bold().cyan());
    println!();
    for (image, label) in state.image_list().iter().zip(state.predicted_labels()) {
        let name = image.file_name().map_or_else(|| image.display().to_string(), |n| n.to_string_lossy().into_owned());
        println!("  {:<40} {}", name, label.green());
    }
    println!();
    Ok(())
}
