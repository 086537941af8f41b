//! Lumen Training
//!
//! Backend-agnostic training primitives for:
//! - Registering pipelines (argument schema, trainer and predictor constructors)
//! - Submitting and running a single background training job
//! - Writing hyperparameter records and class maps next to checkpoints
//! - Listing, renaming and deleting trained weights on disk

pub mod artifacts;
pub mod classification;
pub mod error;
pub mod executor;
pub mod job;
pub mod layout;
pub mod manager;
pub mod pipeline;
pub mod progress;
pub mod trainer;
pub mod weights;

pub use artifacts::{CLASS_MAP_FILE, ClassMap, Flags, HyperparamRecord};
pub use classification::{ClassifierBackend, ClassifierModel, ImageClassification, argmax, softmax};
pub use error::{TrainingError, TrainingResult};
pub use executor::{Executor, InlineExecutor, Task, TokioExecutor};
pub use job::{JobHandle, JobPhase, TrainingJobId};
pub use layout::{CHECKPOINT_FILE, HPARAMS_FILE, METRICS_FILE, TrainingLayout, validate_run_name};
pub use manager::{JobManager, JobRequest};
pub use pipeline::{ModelConfig, Pipeline, PipelineRegistry, Predictor, RunSetup};
pub use progress::{ProgressEvent, ProgressSink, RecordingProgressSink, TracingProgressSink};
pub use trainer::{CancelToken, FitContext, FitSummary, Trainer};
pub use weights::{WeightDatabase, WeightEntry, WeightSelection};
