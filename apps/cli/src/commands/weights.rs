//! Weight management commands.

use crate::commands::types::WeightsCommand;
use crate::session::Session;
use anyhow::Result;
use colored::Colorize;
use lumen_core::{Config, NO_MODELS_FEEDBACK, SignalValue, events, list_all};
use serde_json::json;

pub async fn execute(config: Config, command: WeightsCommand) -> Result<()> {
    match command {
        WeightsCommand::List { json } => list(config, json),
        WeightsCommand::Rename { name, new_name, pipeline } => {
            let pipeline = pipeline.unwrap_or_else(|| config.default_pipeline.clone());
            let mut session = Session::open(config, false)?;
            let selection = session.select(&pipeline, &name)?;
            session.emit(
                events::WEIGHT_SELECTION_RENAME,
                &[SignalValue::Weight(selection), SignalValue::Text(new_name)],
            )?;
            session.settle().await
        }
        WeightsCommand::Delete { name, pipeline } => {
            let pipeline = pipeline.unwrap_or_else(|| config.default_pipeline.clone());
            let mut session = Session::open(config, false)?;
            let selection = session.select(&pipeline, &name)?;
            session.emit(events::WEIGHT_SELECTION_DELETION, &[SignalValue::Weight(selection)])?;
            session.settle().await
        }
    }
}

fn list(config: Config, json_output: bool) -> Result<()> {
    let session = Session::open(config, json_output)?;
    let all = list_all(session.controller().jobs().weights())?;

    if json_output {
        let out: serde_json::Map<_, _> =
            all.into_iter().map(|(pipeline, names)| (pipeline, json!(names))).collect();
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    let total: usize = all.iter().map(|(_, names)| names.len()).sum();
    println!();
    println!("{}", format!("Trained Weights ({total})").bold().cyan());
    println!();
    if total == 0 {
        println!("  {}", NO_MODELS_FEEDBACK.dimmed());
        println!();
        return Ok(());
    }

    for (pipeline, names) in all {
        println!("  {}", pipeline.bold());
        for (index, name) in names.iter().enumerate() {
            println!("    {:>3}  {}", index, name.cyan());
        }
    }
    println!();
    Ok(())
}
