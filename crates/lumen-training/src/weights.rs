//! Directory-backed registry of trained checkpoints.
//!
//! Nothing is cached: every query re-lists `weights/<pipeline_id>/`.

use crate::artifacts::HyperparamRecord;
use crate::error::{TrainingError, TrainingResult};
use crate::layout::{CHECKPOINT_FILE, HPARAMS_FILE, TrainingLayout, validate_run_name};
use std::path::{Path, PathBuf};

/// A weight entry as the presentation layer addresses it: position in a
/// listing plus the name that was displayed at that position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WeightSelection {
    pub pipeline_id: String,
    pub index: usize,
    pub name: String,
}

impl WeightSelection {
    #[must_use]
    pub fn new(pipeline_id: impl Into<String>, index: usize, name: impl Into<String>) -> Self {
        Self { pipeline_id: pipeline_id.into(), index, name: name.into() }
    }
}

/// A weight entry that has both a checkpoint and a hyperparameter record.
#[derive(Debug, Clone)]
pub struct WeightEntry {
    pub pipeline_id: String,
    pub name: String,
    pub dir: PathBuf,
}

impl WeightEntry {
    #[must_use]
    pub fn checkpoint_path(&self) -> PathBuf {
        self.dir.join(CHECKPOINT_FILE)
    }

    pub fn hyperparams(&self) -> TrainingResult<HyperparamRecord> {
        HyperparamRecord::read(&self.dir.join(HPARAMS_FILE))
    }
}

#[derive(Debug, Clone)]
pub struct WeightDatabase {
    layout: TrainingLayout,
}

impl WeightDatabase {
    #[must_use]
    pub fn new(layout: TrainingLayout) -> Self {
        Self { layout }
    }

    #[must_use]
    pub fn layout(&self) -> &TrainingLayout {
        &self.layout
    }

    /// Pipelines that currently have a weight root, sorted.
    pub fn pipelines(&self) -> TrainingResult<Vec<String>> {
        let root = self.layout.weights_root();
        let mut out = Vec::new();
        let dir = match std::fs::read_dir(&root) {
            Ok(d) => d,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(out),
            Err(e) => return Err(e.into()),
        };
        for entry in dir {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                out.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        out.sort();
        Ok(out)
    }

    /// Entry names in filesystem order.
    pub fn list(&self, pipeline_id: &str) -> TrainingResult<Vec<String>> {
        let root = self.layout.pipeline_weights(pipeline_id);
        let dir = match std::fs::read_dir(&root) {
            Ok(d) => d,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(TrainingError::NotFound(pipeline_id.to_string()));
            }
            Err(e) => return Err(e.into()),
        };

        let mut names = Vec::new();
        for entry in dir {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        Ok(names)
    }

    /// Whether `run_name` is already taken within the pipeline's namespace.
    pub fn contains(&self, pipeline_id: &str, run_name: &str) -> TrainingResult<bool> {
        match self.list(pipeline_id) {
            Ok(names) => Ok(names.iter().any(|n| n == run_name)),
            Err(TrainingError::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    #[must_use]
    pub fn entry_dir(&self, pipeline_id: &str, name: &str) -> PathBuf {
        self.layout.run_weights(pipeline_id, name)
    }

    /// Look up an entry by name.
    pub fn entry(&self, pipeline_id: &str, name: &str) -> TrainingResult<WeightEntry> {
        let dir = self.entry_dir(pipeline_id, name);
        if !dir.is_dir() {
            return Err(TrainingError::MissingCheckpoint(format!("{pipeline_id}/{name}")));
        }
        Ok(WeightEntry { pipeline_id: pipeline_id.to_string(), name: name.to_string(), dir })
    }

    /// Resolve a selection against a fresh listing.
    ///
    /// Fails closed with `StaleIndex` when the listing no longer shows the
    /// selected name at the selected position.
    pub fn resolve(&self, selection: &WeightSelection) -> TrainingResult<PathBuf> {
        let names = self.list(&selection.pipeline_id)?;
        let found = names
            .get(selection.index)
            .ok_or(TrainingError::IndexOutOfRange { index: selection.index, len: names.len() })?;
        if *found != selection.name {
            return Err(TrainingError::StaleIndex {
                index: selection.index,
                expected: selection.name.clone(),
                found: found.clone(),
            });
        }
        Ok(self.entry_dir(&selection.pipeline_id, found))
    }

    /// Rename the selected entry; returns `(old_dir, new_dir)`.
    pub fn rename(&self, selection: &WeightSelection, new_name: &str) -> TrainingResult<(PathBuf, PathBuf)> {
        validate_run_name(new_name)?;
        let old_dir = self.resolve(selection)?;
        let new_dir = self.entry_dir(&selection.pipeline_id, new_name);
        if new_dir.exists() {
            return Err(TrainingError::NameTaken(new_name.to_string()));
        }
        std::fs::rename(&old_dir, &new_dir)?;
        tracing::info!(pipeline = %selection.pipeline_id, from = %selection.name, to = %new_name, "renamed weights");
        Ok((old_dir, new_dir))
    }

    /// Recursively remove the selected entry; returns the removed directory.
    pub fn delete(&self, selection: &WeightSelection) -> TrainingResult<PathBuf> {
        let dir = self.resolve(selection)?;
        std::fs::remove_dir_all(&dir)?;
        tracing::info!(pipeline = %selection.pipeline_id, name = %selection.name, "deleted weights");
        Ok(dir)
    }
}

/// True when `path` is the weight entry directory `dir` (or a file inside it).
#[must_use]
pub fn refers_to(path: &Path, dir: &Path) -> bool {
    path == dir || path.parent() == Some(dir)
}
