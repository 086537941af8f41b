use crate::error::{TrainingError, TrainingResult};
use crate::job::TrainingJobId;
use crate::progress::ProgressSink;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Cooperative stop flag shared between a job handle and its trainer.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Trainers call this between epochs.
    pub fn check(&self) -> TrainingResult<()> {
        if self.is_cancelled() { Err(TrainingError::Cancelled) } else { Ok(()) }
    }
}

/// Everything a trainer may touch while fitting.
pub struct FitContext<'a> {
    pub job_id: &'a TrainingJobId,
    pub log_dir: &'a Path,
    pub weight_dir: &'a Path,
    pub progress: &'a dyn ProgressSink,
    pub cancel: &'a CancelToken,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FitSummary {
    pub epochs_run: u32,
    pub best_val_acc: Option<f32>,
    pub checkpoint: PathBuf,
}

/// A fully constructed (trainer, model, data source) bundle ready to fit.
///
/// Implementations are built by a pipeline and moved onto the job worker.
pub trait Trainer: Send {
    fn id(&self) -> &'static str;

    /// Human-readable description of the model and data source.
    fn describe(&self) -> String;

    fn fit(&mut self, ctx: &FitContext<'_>) -> TrainingResult<FitSummary>;
}
