//! Pipeline listing.

use anyhow::Result;
use colored::Colorize;
use lumen_training::PipelineRegistry;
use serde_json::json;

pub fn execute(json_output: bool) -> Result<()> {
    let registry = PipelineRegistry::with_defaults();
    let mut rows = Vec::new();
    for id in registry.ids() {
        let pipeline = registry.get(&id)?;
        rows.push((id, pipeline.description().to_string()));
    }

    if json_output {
        let out: Vec<_> = rows.iter().map(|(id, description)| json!({ "id": id, "description": description })).collect();
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    println!();
    println!("{}", format!("Pipelines ({})", rows.len()).bold().cyan());
    println!();
    for (id, description) in rows {
        println!("  {:<28} {}", id.cyan(), description.dimmed());
    }
    println!();
    Ok(())
}
