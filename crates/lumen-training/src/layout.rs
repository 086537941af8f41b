use crate::error::{TrainingError, TrainingResult};
use std::path::{Component, Path, PathBuf};

/// File name of the hyperparameter record written into every run's log directory.
pub const HPARAMS_FILE: &str = "hparams.yaml";

/// File name of the serialized model inside a weight entry.
pub const CHECKPOINT_FILE: &str = "model.ckpt";

/// Per-epoch metrics appended by trainers.
pub const METRICS_FILE: &str = "metrics.jsonl";

/// Filesystem layout for training artifacts inside a workspace.
///
/// ```text
/// <root>/weights/<pipeline_id>/<run_name>/{model.ckpt, hparams.yaml, ...}
/// <root>/logs/<pipeline_id>/<run_name>/{hparams.yaml, metrics.jsonl}
/// ```
#[derive(Debug, Clone)]
pub struct TrainingLayout {
    root: PathBuf,
}

impl TrainingLayout {
    #[must_use]
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[must_use]
    pub fn weights_root(&self) -> PathBuf {
        self.root.join("weights")
    }

    #[must_use]
    pub fn logs_root(&self) -> PathBuf {
        self.root.join("logs")
    }

    #[must_use]
    pub fn pipeline_weights(&self, pipeline_id: &str) -> PathBuf {
        self.weights_root().join(pipeline_id)
    }

    #[must_use]
    pub fn pipeline_logs(&self, pipeline_id: &str) -> PathBuf {
        self.logs_root().join(pipeline_id)
    }

    #[must_use]
    pub fn run_weights(&self, pipeline_id: &str, run_name: &str) -> PathBuf {
        self.pipeline_weights(pipeline_id).join(run_name)
    }

    #[must_use]
    pub fn run_logs(&self, pipeline_id: &str, run_name: &str) -> PathBuf {
        self.pipeline_logs(pipeline_id).join(run_name)
    }

    /// Create the log and weight directories for a new run.
    ///
    /// Both must be absent; neither is created if either already exists.
    pub fn allocate_run_dirs(&self, pipeline_id: &str, run_name: &str) -> TrainingResult<(PathBuf, PathBuf)> {
        validate_run_name(run_name)?;
        let log_dir = self.run_logs(pipeline_id, run_name);
        let weight_dir = self.run_weights(pipeline_id, run_name);

        for dir in [&log_dir, &weight_dir] {
            if dir.exists() {
                return Err(TrainingError::PathCollision(dir.clone()));
            }
        }

        std::fs::create_dir_all(self.pipeline_logs(pipeline_id))?;
        std::fs::create_dir_all(self.pipeline_weights(pipeline_id))?;
        std::fs::create_dir(&log_dir)?;
        if let Err(e) = std::fs::create_dir(&weight_dir) {
            let _ = std::fs::remove_dir(&log_dir);
            return Err(e.into());
        }
        Ok((log_dir, weight_dir))
    }
}

/// A run or weight name must be usable as exactly one directory name.
pub fn validate_run_name(name: &str) -> TrainingResult<()> {
    if name.trim().is_empty() {
        return Err(TrainingError::InvalidRunName(name.to_string()));
    }
    let mut components = Path::new(name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(c)), None) if c == name => Ok(()),
        _ => Err(TrainingError::InvalidRunName(name.to_string())),
    }
}
