use crate::error::{TrainingError, TrainingResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// File name of the label vocabulary shipped with classification data.
pub const CLASS_MAP_FILE: &str = "Class Map.txt";

pub type Flags = BTreeMap<String, serde_json::Value>;

/// Human-readable record of everything a run was trained with.
///
/// Written to the run's log directory when fitting starts and copied next to
/// the checkpoint on finalize, so a weight entry is self-describing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HyperparamRecord {
    pub pipeline: String,
    pub run_name: String,
    pub input_dirpath: PathBuf,
    #[serde(default)]
    pub model: Flags,
    #[serde(default)]
    pub trainer: Flags,
    pub created_at: DateTime<Utc>,
}

impl HyperparamRecord {
    pub fn read(path: &Path) -> TrainingResult<Self> {
        if !path.is_file() {
            return Err(TrainingError::MissingArtifact(path.to_path_buf()));
        }
        let text = std::fs::read_to_string(path)?;
        Ok(serde_yaml::from_str(&text)?)
    }

    pub fn write(&self, path: &Path) -> TrainingResult<()> {
        std::fs::write(path, serde_yaml::to_string(self)?)?;
        Ok(())
    }

    /// `key: value` lines, input path first, then model flags, then trainer flags.
    #[must_use]
    pub fn parameter_lines(&self) -> Vec<String> {
        let mut lines = vec![format!("input_dirpath: {}", self.input_dirpath.display())];
        for (key, value) in self.model.iter().chain(self.trainer.iter()) {
            lines.push(format!("{key}: {}", render_flag(value)));
        }
        lines
    }
}

fn render_flag(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Null => "None".to_string(),
        other => other.to_string(),
    }
}

/// Ordered label vocabulary parsed from `<class_name>: <integer_index>` lines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassMap {
    // indexed by class ordinal
    names: Vec<String>,
}

impl ClassMap {
    pub fn parse(text: &str) -> TrainingResult<Self> {
        let mut entries: BTreeMap<usize, String> = BTreeMap::new();
        for (lineno, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let (name, index) = line.rsplit_once(':').ok_or_else(|| {
                TrainingError::Dataset(format!("class map line {}: expected `<name>: <index>`", lineno + 1))
            })?;
            let index: usize = index.trim().parse().map_err(|e| {
                TrainingError::Dataset(format!("class map line {}: invalid index: {e}", lineno + 1))
            })?;
            let name = name.trim();
            if name.is_empty() {
                return Err(TrainingError::Dataset(format!("class map line {}: empty class name", lineno + 1)));
            }
            if entries.insert(index, name.to_string()).is_some() {
                return Err(TrainingError::Dataset(format!("class map index {index} is assigned twice")));
            }
        }

        if entries.is_empty() {
            return Err(TrainingError::Dataset("class map is empty".to_string()));
        }
        // Indices must be exactly 0..n so they can size an output layer.
        if entries.keys().enumerate().any(|(expected, &index)| expected != index) {
            return Err(TrainingError::Dataset("class map indices must be contiguous from 0".to_string()));
        }

        Ok(Self { names: entries.into_values().collect() })
    }

    pub fn read(path: &Path) -> TrainingResult<Self> {
        if !path.is_file() {
            return Err(TrainingError::MissingArtifact(path.to_path_buf()));
        }
        Self::parse(&std::fs::read_to_string(path)?)
    }

    /// Read `Class Map.txt` from a data root or weight directory.
    pub fn read_from_dir(dir: &Path) -> TrainingResult<Self> {
        Self::read(&dir.join(CLASS_MAP_FILE))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.names.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    #[must_use]
    pub fn name(&self, index: usize) -> Option<&str> {
        self.names.get(index).map(String::as_str)
    }

    #[must_use]
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }
}
