//! Plain-text experiment reports.

use crate::error::CoreResult;
use crate::state::InferenceState;
use lumen_training::HyperparamRecord;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

/// First free path among `<run_name>_Report.txt`, `<run_name>_Report (1).txt`, ...
#[must_use]
pub fn report_path(dir: &Path, run_name: &str) -> PathBuf {
    let first = dir.join(format!("{run_name}_Report.txt"));
    if !first.exists() {
        return first;
    }
    (1..)
        .map(|n| dir.join(format!("{run_name}_Report ({n}).txt")))
        .find(|p| !p.exists())
        .unwrap_or(first)
}

/// Render the report body for the weight entry currently named `name`.
#[must_use]
pub fn render_report(name: &str, record: &HyperparamRecord, log_dir: &Path, state: &InferenceState) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Experiment: {name}");
    let _ = writeln!(out, "Model: {}", record.pipeline);
    let _ = writeln!(out);
    let _ = writeln!(out, "Training Parameters:");
    for line in record.parameter_lines() {
        let _ = writeln!(out, "{line}");
    }
    let _ = writeln!(out);
    let _ = writeln!(out, "Training Metrics: {}", log_dir.display());
    let _ = writeln!(out);
    let _ = writeln!(out, "Inference Results:");
    for (image, label) in state.image_list().iter().zip(state.predicted_labels()) {
        let file = image.file_name().map_or_else(|| image.display().to_string(), |n| n.to_string_lossy().into_owned());
        let _ = writeln!(out, "{file} {label}");
    }
    out
}

/// Write a report into `dir` without overwriting earlier reports.
pub fn write_report(
    dir: &Path,
    name: &str,
    record: &HyperparamRecord,
    log_dir: &Path,
    state: &InferenceState,
) -> CoreResult<PathBuf> {
    std::fs::create_dir_all(dir)?;
    let path = report_path(dir, name);
    std::fs::write(&path, render_report(name, record, log_dir, state))?;
    tracing::info!(path = %path.display(), run_name = %name, "wrote report");
    Ok(path)
}
