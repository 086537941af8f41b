use std::path::PathBuf;
use thiserror::Error;

pub type TrainingResult<T> = std::result::Result<T, TrainingError>;

#[derive(Debug, Error)]
pub enum TrainingError {
    #[error("unknown pipeline: {0}")]
    UnknownPipeline(String),

    #[error("invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("run name `{run_name}` already exists for pipeline {pipeline}")]
    DuplicateRunName { pipeline: String, run_name: String },

    #[error("invalid run name `{0}`: must be a single non-empty path component")]
    InvalidRunName(String),

    #[error("path already exists: {}", .0.display())]
    PathCollision(PathBuf),

    #[error("a training job is already running: {0}")]
    JobAlreadyActive(String),

    #[error("job {job_id} cannot {action} while {phase}")]
    InvalidPhase { job_id: String, action: &'static str, phase: String },

    #[error("missing artifact: {}", .0.display())]
    MissingArtifact(PathBuf),

    #[error("no weight directory for pipeline {0}")]
    NotFound(String),

    #[error("index {index} out of range for {len} entries")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("stale weight selection: expected `{expected}` at index {index}, found {found}")]
    StaleIndex { index: usize, expected: String, found: String },

    #[error("weight entry `{0}` already exists")]
    NameTaken(String),

    #[error("missing checkpoint: {0}")]
    MissingCheckpoint(String),

    #[error("inference input error: {0}")]
    InferenceInput(String),

    #[error("dataset error: {0}")]
    Dataset(String),

    #[error("trainer error: {0}")]
    Trainer(String),

    #[error("training cancelled")]
    Cancelled,

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Image(#[from] image::ImageError),
}
